use thiserror::Error;
use orcd_domain::OrchError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("config error: {0}")]
    Config(#[from] orcd_config::ConfigError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] orcd_scheduler::SchedulerError),

    #[error("store error: {0}")]
    Store(#[from] orcd_store::StoreError),

    #[error("driver error: {0}")]
    Driver(#[from] orcd_driver::DriverError),

    #[error("domain error: {0}")]
    Domain(#[from] orcd_domain::DomainError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ReconcileError> for OrchError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Config(e) => OrchError::InvalidArg(e.to_string()),
            ReconcileError::Scheduler(e) => e.into(),
            ReconcileError::Store(e) => e.into(),
            ReconcileError::Driver(e) => e.into(),
            ReconcileError::Domain(e) => e.into(),
            ReconcileError::Internal(m) => OrchError::Internal(m),
        }
    }
}
