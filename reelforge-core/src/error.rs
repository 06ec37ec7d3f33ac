//! Error taxonomy shared by the transcoding and scanning subsystems.
//!
//! Every variant here maps to a single HTTP status code at the API edge
//! (see `reelforge_api::http::error::AppError`). Repositories and services
//! should pick the variant that matches the *caller-facing* meaning of a
//! failure, not just the underlying cause.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The caller supplied a request that fails validation (bad container,
    /// malformed byte-range, unknown codec, ...). Maps to HTTP 400.
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced entity (media file, session, scan job, ...) does not
    /// exist. Maps to HTTP 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current state of the entity (e.g. a
    /// scan job already running for the library, or an optimistic-lock
    /// version mismatch). Maps to HTTP 409.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A capacity limit was reached (max concurrent transcode sessions,
    /// disk usage ceiling, ...). Maps to HTTP 503.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// The encoder provider reported a failure (ffmpeg exited non-zero,
    /// hardware accelerator unavailable, ...). Maps to HTTP 500.
    #[error("provider error: {0}")]
    Provider(String),

    /// The content store could not complete an operation that isn't a
    /// plain I/O error (hash mismatch, directory layout violation). Maps
    /// to HTTP 500.
    #[error("storage error: {0}")]
    Storage(String),

    /// An operation exceeded its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// An operation was cancelled by the caller or a supervising task.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Catch-all for invariant violations that should never surface from a
    /// well-formed request.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable label used in structured log fields and metrics so dashboards
    /// can group by error kind without parsing message strings.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Capacity(_) => "capacity",
            Self::Provider(_) => "provider",
            Self::Storage(_) => "storage",
            Self::Timeout(_) => "timeout",
            Self::Cancelled(_) => "cancelled",
            Self::Internal(_) => "internal",
            Self::Database(_) => "database",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Translates a `sqlx::Error` into the richer taxonomy by inspecting the
/// Postgres error code when present. Repositories call this explicitly at
/// the point where they know which constraint violations are meaningful
/// (e.g. a unique violation on `content_hash` means `Conflict`, not a
/// generic database error); the blanket `#[from] sqlx::Error` above stays
/// available for call sites that don't care about the distinction.
#[must_use]
pub fn map_sqlx_error(err: sqlx::Error) -> Error {
    if matches!(err, sqlx::Error::RowNotFound) {
        return Error::NotFound("row not found".to_string());
    }

    let Some(code) = err.as_database_error().and_then(|e| e.code().map(|c| c.into_owned())) else {
        return Error::Database(err);
    };

    let message = err
        .as_database_error()
        .map(|e| e.message().to_string())
        .unwrap_or_default();

    match code.as_str() {
        // unique_violation
        "23505" => Error::Conflict(message),
        // foreign_key_violation
        "23503" => Error::NotFound(message),
        // check_violation / not_null_violation
        "23514" | "23502" => Error::Validation(message),
        _ => Error::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_labels_are_stable() {
        assert_eq!(Error::Validation("x".into()).category(), "validation");
        assert_eq!(Error::NotFound("x".into()).category(), "not_found");
        assert_eq!(Error::Conflict("x".into()).category(), "conflict");
        assert_eq!(Error::Capacity("x".into()).category(), "capacity");
        assert_eq!(Error::Provider("x".into()).category(), "provider");
        assert_eq!(Error::Storage("x".into()).category(), "storage");
        assert_eq!(Error::Timeout("x".into()).category(), "timeout");
        assert_eq!(Error::Cancelled("x".into()).category(), "cancelled");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let mapped = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(mapped, Error::NotFound(_)));
    }
}
