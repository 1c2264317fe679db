use orcd_domain::ServiceName;
use serde::{Deserialize, Serialize};

/// One observable change made while reconciling a single spec (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Change {
    DaemonDeployed { service_name: ServiceName, daemon_id: String, hostname: String },
    DaemonRemoved { service_name: ServiceName, daemon_id: String },
    DaemonReconfigured { daemon_id: String },
}

/// Outcome of reconciling one spec via [`crate::apply::apply_one_service`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    pub changes: Vec<Change>,
    pub errors: Vec<String>,
}

impl ApplyReport {
    pub fn did_work(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Outcome of one full serve-loop iteration (§4.8): whether any stage did
/// work (in which case the loop restarts immediately with no sleep).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationReport {
    pub changes: Vec<Change>,
    pub errors: Vec<String>,
}

impl IterationReport {
    pub fn did_work(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn merge(&mut self, other: ApplyReport) {
        self.changes.extend(other.changes);
        self.errors.extend(other.errors);
    }
}
