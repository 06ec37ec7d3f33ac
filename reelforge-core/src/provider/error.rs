//! Provider-specific errors, kept distinct from the top-level [`crate::Error`]
//! taxonomy since they originate from an external encoder process rather than
//! storage or validation.

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no provider supports container {0}")]
    UnsupportedFormat(String),

    #[error("provider instance not found: {0}")]
    InstanceNotFound(String),

    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("encoder process failed to launch: {0}")]
    SpawnFailed(String),

    #[error("encoder process exited with an error: {0}")]
    EncodeFailed(String),

    #[error("unknown transcode handle: {0}")]
    HandleNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

impl From<ProviderError> for crate::Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UnsupportedFormat(msg)
            | ProviderError::InstanceNotFound(msg)
            | ProviderError::InvalidConfig(msg) => crate::Error::Validation(msg),
            ProviderError::HandleNotFound(msg) => crate::Error::NotFound(msg),
            ProviderError::SpawnFailed(msg) | ProviderError::EncodeFailed(msg) => {
                crate::Error::Provider(msg)
            }
            ProviderError::Io(e) => crate::Error::Provider(e.to_string()),
        }
    }
}
