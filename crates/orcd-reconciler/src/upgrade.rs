use orcd_domain::ServiceType;
use orcd_driver::{AgentCommand, ClusterClient, DriverRegistry, Executor};
use orcd_store::{ConfigStore, UpgradeState};
use tracing::info;

use crate::apply::deploy_daemon;
use crate::error::ReconcileError;

/// Fixed type order for rolling upgrades (§4.14), lowest first. `ServiceType`
/// already carries this via `upgrade_order`; this list is just its
/// enumeration, grouping the four monitoring-stack types into one pass.
fn ordered_types() -> Vec<ServiceType> {
    let mut all = ServiceType::ALL.to_vec();
    all.sort_by_key(|t| t.upgrade_order());
    all
}

/// One step of the upgrade state machine (§4.14). Persists progress after
/// every step so a restart resumes from `current_type`/`current_daemon`
/// rather than starting over.
pub async fn continue_upgrade(
    store: &dyn ConfigStore,
    registry: &DriverRegistry,
    cluster: &dyn ClusterClient,
    executor: &dyn Executor,
) -> Result<bool, ReconcileError> {
    let mut state = store.get_upgrade_state().await?;
    if !state.in_progress || state.paused {
        return Ok(false);
    }

    let Some(target_image) = state.target_image.clone() else {
        state.in_progress = false;
        store.put_upgrade_state(state).await?;
        return Ok(false);
    };

    let types = ordered_types();
    let start_at = state
        .current_type
        .and_then(|t| types.iter().position(|&x| x == t))
        .unwrap_or(0);

    for service_type in types.into_iter().skip(start_at) {
        let daemons = daemons_of_type(store, service_type).await?;
        let total_count = daemons.len();
        let mut pending: Vec<_> = daemons
            .into_iter()
            .filter(|d| d.container_image_id.as_deref() != Some(target_image.as_str()))
            .collect();
        pending.sort_by(|a, b| a.hostname.cmp(&b.hostname));

        let Some(next) = pending.into_iter().next() else {
            continue;
        };

        state.current_type = Some(service_type);
        state.current_daemon = Some(next.name());
        store.put_upgrade_state(state.clone()).await?;

        let driver = registry.for_type(service_type)?;
        driver.ok_to_stop(&[next.daemon_id.clone()], total_count, cluster).await?;

        info!(daemon = %next.name(), target = %target_image, "upgrade: redeploying with target image");
        deploy_daemon(
            &spec_for_redeploy(&next),
            &next.daemon_id,
            &next.hostname,
            store,
            registry,
            executor,
            Some(target_image.as_str()),
        )
        .await?;

        return Ok(true);
    }

    state.in_progress = false;
    state.current_type = None;
    state.current_daemon = None;
    store.put_upgrade_state(state).await?;
    info!(target = %target_image, "upgrade complete");
    Ok(false)
}

async fn daemons_of_type(
    store: &dyn ConfigStore,
    service_type: ServiceType,
) -> Result<Vec<orcd_domain::DaemonDescription>, ReconcileError> {
    let mut out = Vec::new();
    for host in store.list_hosts().await? {
        let cache = store.get_cache(&host.hostname).await?;
        out.extend(cache.daemons.values().filter(|d| d.daemon_type == service_type).cloned());
    }
    Ok(out)
}

/// Builds a minimal spec carrying only what [`deploy_daemon`] needs to
/// regenerate a daemon's config during an upgrade redeploy; the target
/// image is passed to `deploy_daemon` directly rather than through the spec.
fn spec_for_redeploy(daemon: &orcd_domain::DaemonDescription) -> orcd_domain::Spec {
    orcd_domain::Spec {
        service_type: daemon.daemon_type,
        service_id: daemon.service_id.clone(),
        placement: Default::default(),
        unmanaged: false,
        preview_only: false,
        extra: Default::default(),
        created: None,
    }
}

/// Starts an upgrade to `target_image` (command surface `orcd upgrade start`, §6).
pub async fn start_upgrade(
    store: &dyn ConfigStore,
    target_image: impl Into<String>,
) -> Result<(), ReconcileError> {
    let mut state = store.get_upgrade_state().await?;
    if state.in_progress {
        return Err(ReconcileError::Internal("an upgrade is already in progress".to_string()));
    }
    state.target_image = Some(target_image.into());
    state.in_progress = true;
    state.paused = false;
    state.current_type = None;
    state.current_daemon = None;
    store.put_upgrade_state(state).await
        .map_err(ReconcileError::Store)
}

pub async fn pause_upgrade(store: &dyn ConfigStore) -> Result<(), ReconcileError> {
    let mut state = store.get_upgrade_state().await?;
    state.paused = true;
    store.put_upgrade_state(state).await.map_err(ReconcileError::Store)
}

pub async fn resume_upgrade(store: &dyn ConfigStore) -> Result<(), ReconcileError> {
    let mut state = store.get_upgrade_state().await?;
    state.paused = false;
    store.put_upgrade_state(state).await.map_err(ReconcileError::Store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcd_domain::{DaemonDescription, DaemonStatus, Host};
    use orcd_driver::FakeClusterClient;
    use orcd_store::InMemoryStore;

    struct FakeExecutor;
    #[async_trait::async_trait]
    impl Executor for FakeExecutor {
        async fn run(
            &self,
            _host: &str,
            _command: AgentCommand,
            _stdin: Option<&[u8]>,
            _allow_error: bool,
        ) -> Result<orcd_driver::AgentResponse, orcd_driver::DriverError> {
            Ok(orcd_driver::AgentResponse { code: 0, stdout: "{}".to_string(), stderr: String::new() })
        }
        async fn offline_hosts(&self) -> std::collections::HashSet<String> {
            Default::default()
        }
        async fn mark_online(&self, _host: &str) {}
    }

    fn mgr_daemon(hostname: &str) -> DaemonDescription {
        DaemonDescription {
            daemon_type: ServiceType::Mgr,
            daemon_id: hostname.to_string(),
            service_id: None,
            hostname: hostname.to_string(),
            container_image_id: Some("old".to_string()),
            container_image_name: None,
            version: None,
            status: DaemonStatus::Running,
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
    async fn not_in_progress_is_a_no_op() {
        let store = InMemoryStore::new();
        let registry = DriverRegistry::with_defaults();
        let cluster = FakeClusterClient::new();
        let executor = FakeExecutor;
        let did_work = continue_upgrade(&store, &registry, &cluster, &executor).await.unwrap();
        assert!(!did_work);
    }

    #[tokio::test]
    async fn upgrade_redeploys_pending_daemon() {
        let store = InMemoryStore::new();
        store.add_host(Host::new("h1", "10.0.0.1")).await.unwrap();
        let mut cache = store.get_cache("h1").await.unwrap();
        cache.add_daemon(mgr_daemon("h1"));
        store.put_cache("h1", cache).await.unwrap();

        start_upgrade(&store, "registry/ceph:v2").await.unwrap();
        let registry = DriverRegistry::with_defaults();
        let cluster = FakeClusterClient::new();
        let executor = FakeExecutor;
        let did_work = continue_upgrade(&store, &registry, &cluster, &executor).await.unwrap();
        assert!(did_work);
        let state = store.get_upgrade_state().await.unwrap();
        assert_eq!(state.current_type, Some(ServiceType::Mgr));
    }

    #[tokio::test]
    async fn paused_upgrade_does_nothing() {
        let store = InMemoryStore::new();
        start_upgrade(&store, "registry/ceph:v2").await.unwrap();
        pause_upgrade(&store).await.unwrap();
        let registry = DriverRegistry::with_defaults();
        let cluster = FakeClusterClient::new();
        let executor = FakeExecutor;
        let did_work = continue_upgrade(&store, &registry, &cluster, &executor).await.unwrap();
        assert!(!did_work);
    }
}
