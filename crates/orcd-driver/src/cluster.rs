use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::DriverError;

/// Stand-in for the distributed-storage cluster client named in §1 as an
/// external collaborator (`ClusterClient` facade, §4.17). Real deployments
/// would back this with the cluster's own command/object API; this crate
/// only needs enough surface for service drivers and the OSD removal
/// engine's `pg_summary` polling.
#[async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    /// Issue a cluster admin command (e.g. `osd safe-to-destroy`, `fs new`).
    async fn mon_command(&self, cmd: &str, args: Value) -> Result<Value, DriverError>;

    /// Read a single cluster config/state key.
    async fn get(&self, key: &str) -> Result<Option<Value>, DriverError>;

    /// Publish a named health check, replacing any prior check of the same
    /// name (§4.15).
    async fn publish_health(&self, name: &str, severity: &str, summary: &str, detail: Vec<String>) -> Result<(), DriverError>;

    /// Read an object from a RADOS-like pool (used by the OSD removal
    /// engine's `pg_summary` polling, §4.13).
    async fn object_get(&self, pool: &str, key: &str) -> Result<Option<Vec<u8>>, DriverError>;

    async fn object_put(&self, pool: &str, key: &str, data: Vec<u8>) -> Result<(), DriverError>;
}

/// In-memory fake used by the test suite and by `orcd-cli`'s standalone
/// mode (no live cluster attached).
#[derive(Debug, Default)]
pub struct FakeClusterClient {
    keys: RwLock<HashMap<String, Value>>,
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
    health: RwLock<HashMap<String, (String, String, Vec<String>)>>,
}

impl FakeClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.keys.write().await.insert(key.into(), value);
    }

    pub async fn health_checks(&self) -> HashMap<String, (String, String, Vec<String>)> {
        self.health.read().await.clone()
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn mon_command(&self, _cmd: &str, _args: Value) -> Result<Value, DriverError> {
        Ok(Value::Null)
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, DriverError> {
        Ok(self.keys.read().await.get(key).cloned())
    }

    async fn publish_health(&self, name: &str, severity: &str, summary: &str, detail: Vec<String>) -> Result<(), DriverError> {
        self.health.write().await.insert(name.to_string(), (severity.to_string(), summary.to_string(), detail));
        Ok(())
    }

    async fn object_get(&self, pool: &str, key: &str) -> Result<Option<Vec<u8>>, DriverError> {
        Ok(self.objects.read().await.get(&(pool.to_string(), key.to_string())).cloned())
    }

    async fn object_put(&self, pool: &str, key: &str, data: Vec<u8>) -> Result<(), DriverError> {
        self.objects.write().await.insert((pool.to_string(), key.to_string()), data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_health_overwrites_same_name() {
        let client = FakeClusterClient::new();
        client.publish_health("STRAY_HOST", "warning", "first", vec![]).await.unwrap();
        client.publish_health("STRAY_HOST", "warning", "second", vec![]).await.unwrap();
        let checks = client.health_checks().await;
        assert_eq!(checks.get("STRAY_HOST").unwrap().1, "second");
    }

    #[tokio::test]
    async fn object_round_trips() {
        let client = FakeClusterClient::new();
        client.object_put("pg_summary", "osd.3", b"{}".to_vec()).await.unwrap();
        let got = client.object_get("pg_summary", "osd.3").await.unwrap();
        assert_eq!(got, Some(b"{}".to_vec()));
    }
}
