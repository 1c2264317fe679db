use thiserror::Error;
use orcd_domain::OrchError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("host not found: {0}")]
    HostNotFound(String),

    #[error("host already exists: {0}")]
    HostAlreadyExists(String),

    #[error("spec not found: {0}")]
    SpecNotFound(String),

    #[error("removal queue entry not found for osd.{0}")]
    RemovalNotFound(i64),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}

impl From<StoreError> for OrchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::HostNotFound(_) | StoreError::SpecNotFound(_) | StoreError::RemovalNotFound(_) => {
                OrchError::NotFound(e.to_string())
            }
            StoreError::HostAlreadyExists(_) => OrchError::InvalidArg(e.to_string()),
            StoreError::Serialization(_) | StoreError::Internal(_) => OrchError::Internal(e.to_string()),
        }
    }
}
