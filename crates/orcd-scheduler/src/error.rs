use thiserror::Error;
use orcd_domain::{OrchError, ServiceType};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{service_type} requires count >= 1, got {count}")]
    CountTooLow { service_type: ServiceType, count: i64 },

    #[error("service dependency graph has a cycle")]
    CycleDetected,
}

impl From<SchedulerError> for OrchError {
    fn from(e: SchedulerError) -> Self {
        OrchError::InvalidArg(e.to_string())
    }
}
