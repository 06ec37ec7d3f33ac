//! Media metadata lookup, abstracted behind a trait the same way the
//! Scanner Job Coordinator (C10) abstracts `LibraryExistenceCheck`: the
//! actual probing of a file's container/codecs/resolution is metadata
//! extraction, which is out of scope here, but `GET /api/v1/playback/media-info`
//! still needs a collaborator to ask.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{MediaFile, MediaId};

/// Resolves a library-relative or absolute path to the `MediaFile` metadata
/// a playback decision is made against, and the reverse direction a direct
/// file stream needs: a `MediaId` back to the on-disk path it was scanned
/// from.
#[async_trait]
pub trait MediaInfoLookup: Send + Sync {
    async fn lookup(&self, path: &str) -> Result<Option<MediaFile>>;

    async fn resolve_path(&self, media_id: &MediaId) -> Result<Option<String>>;
}

/// Reports every path and id as unknown. Used when no metadata/library
/// subsystem is wired in; the HTTP layer turns `Ok(None)` into a 404.
pub struct NoopMediaInfoLookup;

#[async_trait]
impl MediaInfoLookup for NoopMediaInfoLookup {
    async fn lookup(&self, _path: &str) -> Result<Option<MediaFile>> {
        Ok(None)
    }

    async fn resolve_path(&self, _media_id: &MediaId) -> Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_lookup_reports_unknown() {
        let lookup = NoopMediaInfoLookup;
        assert!(lookup.lookup("/media/movie.mkv").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn noop_resolve_path_reports_unknown() {
        let lookup = NoopMediaInfoLookup;
        assert!(lookup.resolve_path(&MediaId::from_string("m1".to_string())).await.unwrap().is_none());
    }
}
