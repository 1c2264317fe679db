use std::collections::HashSet;

use chrono::Utc;
use orcd_domain::{DaemonDescription, DaemonStatus, Host, ServiceName, ServiceType, Spec};
use orcd_driver::{AgentCommand, ClusterClient, DriverRegistry, Executor};
use orcd_scheduler::{schedule, HostAssignment, NoFilter};
use orcd_store::ConfigStore;
use rand::Rng;
use tracing::{info, warn};

use crate::error::ReconcileError;
use crate::id_alloc::allocate_daemon_id;
use crate::report::{ApplyReport, Change};

/// Collects every daemon currently cached under `service_name`, across all
/// hosts (§4.2 HostCache is per-host; the scheduler needs the union).
async fn existing_daemons_for(
    store: &dyn ConfigStore,
    service_name: &ServiceName,
) -> Result<Vec<DaemonDescription>, ReconcileError> {
    let mut out = Vec::new();
    for host in store.list_hosts().await? {
        let cache = store.get_cache(&host.hostname).await?;
        out.extend(cache.daemons_by_service(service_name).into_iter().cloned());
    }
    Ok(out)
}

fn all_daemon_ids(daemons: &[DaemonDescription]) -> HashSet<String> {
    daemons.iter().map(|d| d.daemon_id.clone()).collect()
}

/// Maps each dependency's `service_type` name to one currently deployed
/// daemon of that type, so the stage-7 reconfig check (§4.8) can compare
/// against its `last_configured`. A type with no deployed instance yet is
/// skipped rather than faked.
async fn resolve_dep_daemon_names(
    store: &dyn ConfigStore,
    dep_types: &[String],
) -> Result<Vec<orcd_domain::DaemonName>, ReconcileError> {
    let mut out = Vec::new();
    for dep in dep_types {
        let Ok(dep_type) = ServiceType::from_str_loose(dep) else { continue };
        for host in store.list_hosts().await? {
            let cache = store.get_cache(&host.hostname).await?;
            if let Some(d) = cache.daemons.values().find(|d| d.daemon_type == dep_type) {
                out.push(d.name());
                break;
            }
        }
    }
    Ok(out)
}

/// Reconciles a single spec against the current inventory (§4.9).
pub async fn apply_one_service(
    spec: &Spec,
    store: &dyn ConfigStore,
    registry: &DriverRegistry,
    cluster: &dyn ClusterClient,
    executor: &dyn Executor,
) -> Result<ApplyReport, ReconcileError> {
    let mut report = ApplyReport::default();

    if spec.unmanaged || spec.preview_only {
        return Ok(report);
    }

    let service_name = spec.service_name();

    if spec.service_type == ServiceType::Osd {
        return apply_osd_service(spec, store, cluster, executor).await;
    }

    let hosts = store.list_hosts().await?;
    let existing = existing_daemons_for(store, &service_name).await?;
    let driver = registry.for_type(spec.service_type)?;

    driver.config(spec, cluster).await?;

    let placement = spec.effective_placement();
    let HostAssignment { to_add, mut to_remove } =
        schedule(spec.service_type, &placement, &hosts, &existing, &NoFilter)?;

    // Safety gate: drop victims at random until the remainder is ok-to-stop
    // or the set is empty (§4.9).
    loop {
        if to_remove.is_empty() {
            break;
        }
        let ids: Vec<String> = to_remove.iter().map(|d| d.daemon_id.clone()).collect();
        match driver.ok_to_stop(&ids, existing.len(), cluster).await {
            Ok(()) => break,
            Err(_) => {
                let victim = rand::thread_rng().gen_range(0..to_remove.len());
                let dropped = to_remove.remove(victim);
                warn!(daemon_id = %dropped.daemon_id, "dropped not-safe-to-stop victim from removal batch");
            }
        }
    }

    let hosts_by_name: std::collections::HashMap<&str, &Host> =
        hosts.iter().map(|h| (h.hostname.as_str(), h)).collect();

    let mut known_ids = all_daemon_ids(&existing);
    for placement_spec in &to_add {
        let Some(host) = hosts_by_name.get(placement_spec.hostname.as_str()) else {
            report.errors.push(format!("host '{}' vanished from inventory mid-apply", placement_spec.hostname));
            continue;
        };
        let prefix = spec.service_id.as_deref();
        let daemon_id = match allocate_daemon_id(spec.service_type, host, prefix, placement_spec.name.as_deref(), &known_ids) {
            Ok(id) => id,
            Err(e) => {
                report.errors.push(e.to_string());
                continue;
            }
        };
        known_ids.insert(daemon_id.clone());

        match deploy_daemon(spec, &daemon_id, &placement_spec.hostname, store, registry, executor, None).await {
            Ok(()) => report.changes.push(Change::DaemonDeployed {
                service_name: service_name.clone(),
                daemon_id,
                hostname: placement_spec.hostname.clone(),
            }),
            Err(e) => report.errors.push(e.to_string()),
        }
    }

    for victim in &to_remove {
        match remove_daemon(victim, store, registry, executor, cluster).await {
            Ok(()) => report.changes.push(Change::DaemonRemoved {
                service_name: service_name.clone(),
                daemon_id: victim.daemon_id.clone(),
            }),
            Err(e) => report.errors.push(e.to_string()),
        }
    }

    Ok(report)
}

/// OSD deployment is special-cased: it is driven by drive-group matching
/// rather than host-count scheduling, so apply-one-service delegates
/// straight to the OSD driver rather than going through [`schedule`] (§4.9).
async fn apply_osd_service(
    spec: &Spec,
    store: &dyn ConfigStore,
    cluster: &dyn ClusterClient,
    executor: &dyn Executor,
) -> Result<ApplyReport, ReconcileError> {
    let mut report = ApplyReport::default();
    let placement = spec.effective_placement();
    let hosts = store.list_hosts().await?;
    let HostAssignment { to_add, .. } = schedule(ServiceType::Osd, &placement, &hosts, &[], &NoFilter)?;

    for placement_spec in to_add {
        let host = match hosts.iter().find(|h| h.hostname == placement_spec.hostname) {
            Some(h) => h,
            None => continue,
        };
        let resp = executor
            .run(
                &host.hostname,
                AgentCommand::CephVolume { args: vec!["lvm".into(), "prepare".into(), "--data".into(), "auto".into()] },
                None,
                true,
            )
            .await;
        match resp {
            Ok(r) if r.code == 0 => {
                info!(host = %host.hostname, "osd prepared via ceph-volume");
                report.changes.push(Change::DaemonDeployed {
                    service_name: spec.service_name(),
                    daemon_id: format!("pending.{}", host.hostname),
                    hostname: host.hostname.clone(),
                });
            }
            Ok(r) => report.errors.push(format!("ceph-volume on {}: {}", host.hostname, r.stderr)),
            Err(e) => report.errors.push(e.to_string()),
        }
    }
    let _ = cluster; // reserved for future pg_summary-informed drive-group checks
    Ok(report)
}

/// Deploy path (§4.11). `image` is the target image tag to request from the
/// agent; `None` means "leave whatever is currently configured" (a plain
/// reconfig/first deploy), `Some(tag)` conveys an explicit target (an
/// upgrade redeploy or `daemon redeploy --image`).
pub async fn deploy_daemon(
    spec: &Spec,
    daemon_id: &str,
    hostname: &str,
    store: &dyn ConfigStore,
    registry: &DriverRegistry,
    executor: &dyn Executor,
    image: Option<&str>,
) -> Result<(), ReconcileError> {
    let driver = registry.for_type(spec.service_type)?;
    let (config_blob, deps) = driver.generate_config(spec, daemon_id, hostname);

    let payload = serde_json::to_vec(&orcd_driver::DeployPayload {
        name: daemon_id.to_string(),
        image: image.unwrap_or("auto").to_string(),
        config_blob,
        deps: deps.clone(),
    })
    .map_err(|e| ReconcileError::Internal(e.to_string()))?;

    let result = executor.run(hostname, AgentCommand::Deploy, Some(&payload), false).await;

    let mut cache = store.get_cache(hostname).await?;
    match result {
        Ok(_) => {
            let placeholder = DaemonDescription {
                daemon_type: spec.service_type,
                daemon_id: daemon_id.to_string(),
                service_id: spec.service_id.clone(),
                hostname: hostname.to_string(),
                container_image_id: None,
                container_image_name: None,
                version: None,
                status: DaemonStatus::Running,
                status_desc: Some("starting".to_string()),
                created: Some(Utc::now()),
                started: None,
                last_configured: Some(Utc::now()),
                last_deployed: Some(Utc::now()),
                last_refresh: None,
                osdspec_affinity: None,
                is_active: false,
            };
            cache.add_daemon(placeholder);
            let dep_names = resolve_dep_daemon_names(store, &deps).await?;
            cache.daemon_config_deps.insert(orcd_domain::DaemonName::new(&spec.service_type, daemon_id), (dep_names, Utc::now()));
            cache.invalidate_daemons();
            store.put_cache(hostname, cache).await?;
            Ok(())
        }
        Err(e) => {
            warn!(hostname, daemon_id, error = %e, "deploy failed");
            Err(ReconcileError::Driver(e))
        }
    }
}

/// Remove path (§4.12): `pre_remove` then `rm-daemon`, evicting from cache
/// on success. Errors are reported but not retried here.
pub async fn remove_daemon(
    daemon: &DaemonDescription,
    store: &dyn ConfigStore,
    registry: &DriverRegistry,
    executor: &dyn Executor,
    cluster: &dyn ClusterClient,
) -> Result<(), ReconcileError> {
    let driver = registry.for_type(daemon.daemon_type)?;
    driver.pre_remove(&daemon.daemon_id, cluster).await?;

    let name = daemon.name().to_string();
    let result = executor
        .run(&daemon.hostname, AgentCommand::RmDaemon { name: name.clone() }, None, true)
        .await?;

    if result.code == 0 {
        let mut cache = store.get_cache(&daemon.hostname).await?;
        cache.rm_daemon(&daemon.name());
        store.put_cache(&daemon.hostname, cache).await?;
        Ok(())
    } else {
        Err(ReconcileError::Driver(orcd_driver::DriverError::AgentError {
            host: daemon.hostname.clone(),
            code: result.code,
            stderr: result.stderr,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
            std::collections::HashSet::new()
        }
        async fn mark_online(&self, _host: &str) {}
    }

    #[tokio::test]
    async fn unmanaged_spec_is_a_no_op() {
        let store = InMemoryStore::new();
        let registry = DriverRegistry::with_defaults();
        let cluster = FakeClusterClient::new();
        let executor = FakeExecutor;
        let spec = Spec {
            service_type: ServiceType::Mgr,
            service_id: None,
            placement: Default::default(),
            unmanaged: true,
            preview_only: false,
            extra: Default::default(),
            created: None,
        };
        let report = apply_one_service(&spec, &store, &registry, &cluster, &executor).await.unwrap();
        assert!(report.changes.is_empty());
    }

    #[tokio::test]
    async fn applying_mgr_spec_deploys_to_available_hosts() {
        let store = InMemoryStore::new();
        store.add_host(Host::new("h1", "10.0.0.1")).await.unwrap();
        store.add_host(Host::new("h2", "10.0.0.2")).await.unwrap();
        let registry = DriverRegistry::with_defaults();
        let cluster = FakeClusterClient::new();
        let executor = FakeExecutor;
        let spec = Spec {
            service_type: ServiceType::Mgr,
            service_id: None,
            placement: Default::default(),
            unmanaged: false,
            preview_only: false,
            extra: Default::default(),
            created: None,
        };
        let report = apply_one_service(&spec, &store, &registry, &cluster, &executor).await.unwrap();
        assert_eq!(report.changes.len(), 2, "{:?}", report.errors);
        let cache1 = store.get_cache("h1").await.unwrap();
        assert_eq!(cache1.daemons.len(), 1);
    }

    #[tokio::test]
    async fn preview_only_spec_is_a_no_op() {
        let store = InMemoryStore::new();
        let registry = DriverRegistry::with_defaults();
        let cluster = FakeClusterClient::new();
        let executor = FakeExecutor;
        let spec = Spec {
            service_type: ServiceType::Mgr,
            service_id: None,
            placement: Default::default(),
            unmanaged: false,
            preview_only: true,
            extra: Default::default(),
            created: None,
        };
        let report = apply_one_service(&spec, &store, &registry, &cluster, &executor).await.unwrap();
        assert!(report.changes.is_empty());
    }
}
