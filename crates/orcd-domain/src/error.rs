use thiserror::Error;

/// The error taxonomy surfaced to callers (CLI, reconciler, drivers).
///
/// Every downstream crate's error type converts into this one at the
/// crate boundary so the reconciler can match on `kind()` without caring
/// which crate raised it. See DESIGN.md for the propagation policy per kind.
#[derive(Debug, Error)]
pub enum OrchError {
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("host unreachable: {0}")]
    HostUnreachable(String),

    #[error("agent error on {daemon}: exit {code}: {stderr}")]
    AgentError {
        daemon: String,
        code: i32,
        stderr: String,
    },

    #[error("not safe to stop {0:?}: {1}")]
    NotSafeToStop(Vec<String>, String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchError {
    /// Stable tag for logging, matching the named kinds in the error taxonomy.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchError::InvalidArg(_) => "InvalidArg",
            OrchError::NotFound(_) => "NotFound",
            OrchError::HostUnreachable(_) => "HostUnreachable",
            OrchError::AgentError { .. } => "AgentError",
            OrchError::NotSafeToStop(..) => "NotSafeToStop",
            OrchError::Internal(_) => "Internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid hostname: {0}")]
    InvalidHostname(String),

    #[error("invalid service id '{0}': must match [A-Za-z0-9_.-]+")]
    InvalidServiceId(String),

    #[error("unknown service type: {0}")]
    UnknownServiceType(String),

    #[error("invalid placement: {0}")]
    InvalidPlacement(String),
}

impl From<DomainError> for OrchError {
    fn from(e: DomainError) -> Self {
        OrchError::InvalidArg(e.to_string())
    }
}
