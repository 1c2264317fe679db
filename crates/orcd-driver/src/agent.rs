use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One call to the remote agent (§6 "Wire agent protocol", §4.18). Each
/// variant knows how to render itself as argv; the stdin payload (if any)
/// is carried separately since it may be large (a deploy's config blob).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    CheckHost,
    PrepareHost,
    Ls,
    Deploy,
    RmDaemon { name: String },
    Unit { action: String, name: String },
    CephVolume { args: Vec<String> },
    Pull,
    RegistryLogin,
    ListNetworks,
}

impl AgentCommand {
    /// Render the argv the agent binary is invoked with, not counting the
    /// leading `--fsid`/`--format=json` flags `Executor` always prepends.
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            AgentCommand::CheckHost => vec!["check-host".into()],
            AgentCommand::PrepareHost => vec!["prepare-host".into()],
            AgentCommand::Ls => vec!["ls".into()],
            AgentCommand::Deploy => vec!["deploy".into()],
            AgentCommand::RmDaemon { name } => vec!["rm-daemon".into(), format!("--name={name}")],
            AgentCommand::Unit { action, name } => vec!["unit".into(), action.clone(), format!("--name={name}")],
            AgentCommand::CephVolume { args } => {
                let mut v = vec!["ceph-volume".into(), "--".into()];
                v.extend(args.iter().cloned());
                v
            }
            AgentCommand::Pull => vec!["pull".into()],
            AgentCommand::RegistryLogin => vec!["registry-login".into()],
            AgentCommand::ListNetworks => vec!["list-networks".into()],
        }
    }
}

/// Result of one [`AgentCommand`] invocation, decoded from the agent's
/// `--format=json` stdout when parseable, else carried as free text.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl AgentResponse {
    /// Parse stdout as a single JSON value. The agent always emits one
    /// top-level JSON document per `--format=json` call (§6).
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.stdout)
    }
}

/// Raw `ls` entry as emitted by the agent, decoded independently of
/// [`orcd_domain::DaemonDescription`] since the wire shape uses the
/// agent's own field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsEntry {
    pub name: String,
    pub hostname: String,
    pub systemd_unit: String,
    pub enabled: bool,
    pub state: String,
    pub container_id: Option<String>,
    pub container_image_id: Option<String>,
    pub container_image_name: Option<String>,
    pub version: Option<String>,
    pub started: Option<String>,
    pub created: Option<String>,
}

/// One entry of `ceph-volume inventory --format=json` output, as passed
/// through the agent's `ceph-volume -- <...>` command (§6 wire protocol).
/// `rotational` comes back as `"1"`/`"0"` the way `ceph-volume` itself
/// reports it, not as a JSON bool.
#[derive(Debug, Clone, Deserialize)]
pub struct CephVolumeInventoryEntry {
    pub path: String,
    #[serde(default)]
    pub available: bool,
    pub sys_api: Option<CephVolumeSysApi>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CephVolumeSysApi {
    pub size: Option<u64>,
    pub rotational: Option<String>,
}

/// Payload sent on stdin for a `deploy` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployPayload {
    pub name: String,
    pub image: String,
    pub config_blob: Value,
    pub deps: Vec<String>,
}
