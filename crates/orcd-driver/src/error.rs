use thiserror::Error;
use orcd_domain::OrchError;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("host {0} is unreachable")]
    HostUnreachable(String),

    #[error("agent on {host} exited with code {code}: {stderr}")]
    AgentError { host: String, code: i32, stderr: String },

    #[error("not safe to stop {0:?}: {1}")]
    NotSafeToStop(Vec<String>, String),

    #[error("no driver registered for service type {0}")]
    NoDriver(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}

impl From<DriverError> for OrchError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::HostUnreachable(h) => OrchError::HostUnreachable(h),
            DriverError::AgentError { host, code, stderr } => {
                OrchError::AgentError { daemon: host, code, stderr }
            }
            DriverError::NotSafeToStop(ids, reason) => OrchError::NotSafeToStop(ids, reason),
            DriverError::NoDriver(_) | DriverError::Internal(_) => OrchError::Internal(e.to_string()),
        }
    }
}
