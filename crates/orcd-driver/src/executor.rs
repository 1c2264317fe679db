use std::collections::HashSet;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::agent::{AgentCommand, AgentResponse};
use crate::error::DriverError;

/// Runs a single agent call on a host and returns raw process output (§4.6).
///
/// Maintains an `offline_hosts` set: a connection failure marks the host
/// offline and raises [`DriverError::HostUnreachable`], distinct from a
/// non-zero agent exit (`AgentError`). A host recovers the next time a
/// call to it succeeds.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn run(
        &self,
        host: &str,
        command: AgentCommand,
        stdin: Option<&[u8]>,
        allow_error: bool,
    ) -> Result<AgentResponse, DriverError>;

    async fn offline_hosts(&self) -> HashSet<String>;

    async fn mark_online(&self, host: &str);
}

/// Resolves a hostname to its address and the path of the agent binary on
/// that host. `orcd-store::Host` carries the address; this trait exists so
/// `Executor` doesn't need to depend on `orcd-store`.
pub trait HostAddressBook: Send + Sync + 'static {
    fn address_of(&self, host: &str) -> Option<String>;
}

/// SSH-based executor: uploads/executes the agent by shelling out to the
/// system `ssh` binary, the way a cephadm-style orchestrator drives its
/// remote host agent without a custom wire client (§4.6, §4.18).
pub struct SshExecutor {
    addresses: Arc<dyn HostAddressBook>,
    agent_path: String,
    ssh_user: String,
    offline: RwLock<HashSet<String>>,
}

impl SshExecutor {
    pub fn new(addresses: Arc<dyn HostAddressBook>, agent_path: impl Into<String>, ssh_user: impl Into<String>) -> Self {
        SshExecutor {
            addresses,
            agent_path: agent_path.into(),
            ssh_user: ssh_user.into(),
            offline: RwLock::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl Executor for SshExecutor {
    async fn run(
        &self,
        host: &str,
        command: AgentCommand,
        stdin: Option<&[u8]>,
        allow_error: bool,
    ) -> Result<AgentResponse, DriverError> {
        let address = self
            .addresses
            .address_of(host)
            .ok_or_else(|| DriverError::HostUnreachable(host.to_string()))?;

        let mut argv = vec![self.agent_path.clone(), "--format=json".to_string()];
        argv.extend(command.to_argv());

        let target = format!("{}@{}", self.ssh_user, address);
        debug!(host, %target, cmd = ?argv, "SshExecutor: dispatching agent call");

        let mut child = Command::new("ssh")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg(&target)
            .args(&argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                warn!(host, error = %e, "SshExecutor: failed to spawn ssh");
                DriverError::Internal(e.to_string())
            })?;

        if let Some(payload) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(payload).await.map_err(|e| DriverError::Internal(e.to_string()))?;
            }
        } else {
            drop(child.stdin.take());
        }

        let output = child.wait_with_output().await.map_err(|e| {
            DriverError::Internal(e.to_string())
        });

        let output = match output {
            Ok(o) => o,
            Err(e) => {
                self.offline.write().await.insert(host.to_string());
                return Err(e);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        // ssh exit 255 means the connection itself failed, not the remote command.
        if code == 255 {
            self.offline.write().await.insert(host.to_string());
            return Err(DriverError::HostUnreachable(host.to_string()));
        }
        self.offline.write().await.remove(host);

        if code != 0 && !allow_error {
            return Err(DriverError::AgentError { host: host.to_string(), code, stderr });
        }

        Ok(AgentResponse { code, stdout, stderr })
    }

    async fn offline_hosts(&self) -> HashSet<String> {
        self.offline.read().await.clone()
    }

    async fn mark_online(&self, host: &str) {
        self.offline.write().await.remove(host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticBook(HashMap<String, String>);
    impl HostAddressBook for StaticBook {
        fn address_of(&self, host: &str) -> Option<String> {
            self.0.get(host).cloned()
        }
    }

    #[tokio::test]
    async fn unknown_host_is_unreachable_without_spawning_ssh() {
        let book = Arc::new(StaticBook(HashMap::new()));
        let exec = SshExecutor::new(book, "/var/lib/orcd/agent", "root");
        let err = exec.run("ghost", AgentCommand::CheckHost, None, false).await.unwrap_err();
        assert!(matches!(err, DriverError::HostUnreachable(_)));
    }

    #[tokio::test]
    async fn mark_online_clears_offline_set() {
        let book = Arc::new(StaticBook(HashMap::new()));
        let exec = SshExecutor::new(book, "/var/lib/orcd/agent", "root");
        exec.offline.write().await.insert("h1".to_string());
        exec.mark_online("h1").await;
        assert!(!exec.offline_hosts().await.contains("h1"));
    }
}
