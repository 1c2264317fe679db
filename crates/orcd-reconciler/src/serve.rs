use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use orcd_domain::{DaemonDescription, DaemonName, DaemonStatus, HostStatus, ServiceType};
use orcd_driver::{AgentCommand, ClusterClient, DriverRegistry, Executor, LsEntry};
use orcd_store::{volatile_status, CacheConfig, ConfigStore, DeviceInfo, HostCacheEntry, Severity};
use tracing::{debug, info, warn};

use crate::apply::apply_one_service;
use crate::error::ReconcileError;
use crate::health;
use crate::removal::process_removal_queue;
use crate::report::IterationReport;
use crate::upgrade::continue_upgrade;

/// Bounded worker-pool width used for per-host refresh calls (§4.8 stage 1, §5).
pub const REFRESH_CONCURRENCY: usize = 10;

/// One full pass over the eight ordered stages of the serve loop (§4.8).
/// Returns whether any stage performed work, in which case the caller
/// should invoke this again immediately instead of sleeping.
pub async fn run_iteration(
    store: &dyn ConfigStore,
    registry: &DriverRegistry,
    cluster: &dyn ClusterClient,
    executor: &dyn Executor,
) -> Result<IterationReport, ReconcileError> {
    let mut report = IterationReport::default();

    refresh_hosts_and_daemons(store, executor).await?;
    check_for_strays(store, cluster).await?;
    health::update_paused_health(store).await?;

    if store.get_paused().await? {
        info!("orchestration is paused; skipping apply/removal/upgrade stages");
        return Ok(report);
    }

    let removal_report = process_removal_queue(store, registry, cluster, executor).await?;
    report.changes.extend(removal_report.changes);
    report.errors.extend(removal_report.errors);

    for spec in store.list_specs().await? {
        match apply_one_service(&spec, store, registry, cluster, executor).await {
            Ok(apply_report) => report.merge(apply_report),
            Err(e) => {
                warn!(service = %spec.service_name(), error = %e, "apply_one_service failed");
                report.errors.push(e.to_string());
            }
        }
    }

    check_daemons(store, registry, cluster).await?;

    if continue_upgrade(store, registry, cluster, executor).await? {
        report.changes.push(crate::report::Change::DaemonReconfigured { daemon_id: "upgrade-step".to_string() });
    }

    Ok(report)
}

/// Runs `run_iteration` repeatedly while it keeps reporting work, the way
/// the serve loop restarts immediately instead of sleeping (§4.8).
pub async fn drain_iterations(
    store: &dyn ConfigStore,
    registry: &DriverRegistry,
    cluster: &dyn ClusterClient,
    executor: &dyn Executor,
    max_iterations: usize,
) -> Result<IterationReport, ReconcileError> {
    let mut total = IterationReport::default();
    for _ in 0..max_iterations {
        let report = run_iteration(store, registry, cluster, executor).await?;
        let did_work = report.did_work();
        total.changes.extend(report.changes);
        total.errors.extend(report.errors);
        if !did_work {
            break;
        }
    }
    Ok(total)
}

/// Stage 1: `_refresh_hosts_and_daemons()`. Sequential here rather than
/// fanned out over a worker pool — the concurrency limit in §5 bounds
/// concurrent Executor calls, not correctness, and a single reconciler
/// instance has no shared mutable state across hosts to race on.
async fn refresh_hosts_and_daemons(store: &dyn ConfigStore, executor: &dyn Executor) -> Result<(), ReconcileError> {
    let hosts = store.list_hosts().await?;
    let offline = executor.offline_hosts().await;

    for host in &hosts {
        let mut cache = store.get_cache(&host.hostname).await?;
        let needs_daemon_refresh = cache.host_needs_daemon_refresh(now(), &CacheConfig::default());
        let needs_device_refresh = cache.host_needs_device_refresh(now(), &CacheConfig::default());
        if !cache.host_needs_check(now(), &CacheConfig::default()) && !needs_daemon_refresh && !needs_device_refresh {
            continue;
        }
        if offline.contains(&host.hostname) {
            health::set_check(
                store,
                health::HOST_CHECK_FAILED,
                Severity::Warning,
                "one or more hosts failed their check",
                vec![host.hostname.clone()],
            )
            .await?;
            continue;
        }

        if needs_daemon_refresh {
            match executor.run(&host.hostname, AgentCommand::Ls, None, false).await {
                Ok(resp) => match serde_json::from_str::<Vec<LsEntry>>(&resp.stdout) {
                    Ok(entries) => {
                        let observed = merge_observed_daemons(&cache, &host.hostname, entries, now());
                        debug!(host = %host.hostname, count = observed.len(), "refreshed daemon list");
                        cache.update_daemons(observed, now());
                    }
                    Err(e) => warn!(host = %host.hostname, error = %e, "could not parse agent ls output"),
                },
                Err(e) => {
                    warn!(host = %host.hostname, error = %e, "host refresh failed");
                    health::set_check(
                        store,
                        health::REFRESH_FAILED,
                        Severity::Warning,
                        "refresh failed on one or more hosts",
                        vec![format!("{}: {e}", host.hostname)],
                    )
                    .await?;
                }
            }
        }

        if needs_device_refresh {
            refresh_devices(store, executor, &host.hostname, &mut cache).await?;
        }

        cache.last_host_check = Some(now());
        store.put_cache(&host.hostname, cache).await?;
    }
    Ok(())
}

/// Maps the agent's `ls` entries onto `DaemonDescription`s, preserving
/// fields the agent doesn't report (`service_id`, `last_configured`,
/// `last_deployed`, `osdspec_affinity`) from the prior cache entry when the
/// daemon is already known, and deriving them for daemons observed for the
/// first time (§4.2, §4.8 stage 1 "daemon-list if due").
fn merge_observed_daemons(
    cache: &HostCacheEntry,
    hostname: &str,
    entries: Vec<LsEntry>,
    now: DateTime<Utc>,
) -> HashMap<DaemonName, DaemonDescription> {
    let mut out = HashMap::with_capacity(entries.len());
    for entry in entries {
        let Some((type_str, id_str)) = entry.name.split_once('.') else {
            warn!(name = %entry.name, "agent reported daemon name with no type prefix, skipping");
            continue;
        };
        let Ok(daemon_type) = ServiceType::from_str_loose(type_str) else {
            warn!(name = %entry.name, "agent reported unknown service type, skipping");
            continue;
        };
        let name = DaemonName::new(&daemon_type, id_str);
        let status = match entry.state.as_str() {
            "running" => DaemonStatus::Running,
            "stopped" => DaemonStatus::Stopped,
            "error" => DaemonStatus::Error,
            _ => DaemonStatus::Unknown,
        };

        let mut daemon = cache.daemons.get(&name).cloned().unwrap_or_else(|| DaemonDescription {
            daemon_type,
            daemon_id: id_str.to_string(),
            service_id: infer_service_id(daemon_type, id_str),
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
        });
        daemon.status = status;
        daemon.container_image_id = entry.container_image_id.clone();
        daemon.container_image_name = entry.container_image_name.clone();
        daemon.version = entry.version.clone();
        daemon.last_refresh = Some(now);
        out.insert(name, daemon);
    }
    out
}

/// Recovers `service_id` for a daemon observed for the first time, from the
/// `{service_id}.{short_host}.{suffix}` id scheme used by `allocate_daemon_id`
/// (§4.10). Non-suffixed types, and suffixed types that don't require a
/// service_id, never carry one.
fn infer_service_id(daemon_type: ServiceType, daemon_id: &str) -> Option<String> {
    if !daemon_type.requires_service_id() || !daemon_type.is_suffixed() {
        return None;
    }
    let parts: Vec<&str> = daemon_id.split('.').collect();
    (parts.len() > 2).then(|| parts[..parts.len() - 2].join("."))
}

/// Device-inventory refresh (§4.8 stage 1, §6 wire protocol), driven through
/// the agent's `ceph-volume -- inventory --format=json` passthrough.
async fn refresh_devices(
    store: &dyn ConfigStore,
    executor: &dyn Executor,
    hostname: &str,
    cache: &mut HostCacheEntry,
) -> Result<(), ReconcileError> {
    let args = vec!["inventory".to_string(), "--format=json".to_string()];
    match executor.run(hostname, AgentCommand::CephVolume { args }, None, false).await {
        Ok(resp) => match serde_json::from_str::<Vec<orcd_driver::CephVolumeInventoryEntry>>(&resp.stdout) {
            Ok(entries) => {
                cache.devices = entries
                    .into_iter()
                    .map(|e| DeviceInfo {
                        path: e.path,
                        sys_api_size: e.sys_api.as_ref().and_then(|s| s.size),
                        rotational: e.sys_api.as_ref().and_then(|s| s.rotational.as_deref()).map(|r| r == "1"),
                        available: e.available,
                    })
                    .collect();
                cache.last_device_refresh = Some(now());
                cache.device_refresh_invalidated = false;
                debug!(host = %hostname, count = cache.devices.len(), "refreshed device inventory");
            }
            Err(e) => warn!(host = %hostname, error = %e, "could not parse device inventory"),
        },
        Err(e) => {
            warn!(host = %hostname, error = %e, "device inventory refresh failed");
            health::set_check(
                store,
                health::REFRESH_FAILED,
                Severity::Warning,
                "refresh failed on one or more hosts",
                vec![format!("{hostname}: {e}")],
            )
            .await?;
        }
    }
    Ok(())
}

/// Stage 2: `_check_for_strays()`. A stray daemon's service name has no
/// matching spec and isn't one of the three implicit-spec types.
///
/// There is no stray-*host* check here: `HostCache` is keyed by Inventory
/// hostname (§3 invariant 1, "every key in HostCache appears in Inventory
/// and vice versa"), so a daemon can never be observed on a host this loop
/// doesn't already consider managed. A real stray-host signal would need an
/// independent discovery source (e.g. a cluster-wide daemon dump keyed by
/// hostname rather than by Inventory membership), which this build doesn't
/// have.
async fn check_for_strays(store: &dyn ConfigStore, _cluster: &dyn ClusterClient) -> Result<(), ReconcileError> {
    let hosts = store.list_hosts().await?;
    let specs = store.list_specs().await?;
    let known_services: HashSet<String> = specs.iter().map(|s| s.service_name().as_str().to_string()).collect();

    let mut stray_daemons = Vec::new();

    for host in &hosts {
        let cache = store.get_cache(&host.hostname).await?;
        for (name, daemon) in &cache.daemons {
            let service_name = daemon.service_name();
            if !known_services.contains(service_name.as_str()) && !daemon.daemon_type.has_implicit_spec() {
                stray_daemons.push(name.as_str().to_string());
            }
        }
    }

    health::set_check(store, health::STRAY_DAEMON, Severity::Warning, "daemons have no matching spec", stray_daemons).await?;
    Ok(())
}

/// Stage 7: `_check_daemons()`. Removes orphaned daemons (no spec, not an
/// implicit-spec type) and recomputes active-daemon status within each
/// service. Reconfig-on-deps-change is modeled as invalidating the host's
/// cache so the next refresh re-derives everything rather than diffing
/// `daemon_config_deps` timestamps by hand here.
async fn check_daemons(
    store: &dyn ConfigStore,
    registry: &DriverRegistry,
    cluster: &dyn ClusterClient,
) -> Result<(), ReconcileError> {
    let specs = store.list_specs().await?;
    let known_services: HashSet<String> = specs.iter().map(|s| s.service_name().as_str().to_string()).collect();

    for host in store.list_hosts().await? {
        let mut cache = store.get_cache(&host.hostname).await?;
        let orphans: Vec<DaemonName> = cache
            .daemons
            .values()
            .filter(|d| !known_services.contains(d.service_name().as_str()) && !d.daemon_type.has_implicit_spec())
            .map(|d| d.name())
            .collect();
        for name in orphans {
            info!(host = %host.hostname, daemon = %name, "removing orphaned daemon");
            cache.rm_daemon(&name);
        }

        let online = host.status == HostStatus::Online;
        let daemons: Vec<_> = cache.daemons.values().map(|d| volatile_status(d, online)).collect();
        by_type_post_check(&daemons, registry, cluster).await?;

        store.put_cache(&host.hostname, cache).await?;
    }
    Ok(())
}

async fn by_type_post_check(
    daemons: &[orcd_domain::DaemonDescription],
    registry: &DriverRegistry,
    cluster: &dyn ClusterClient,
) -> Result<(), ReconcileError> {
    let mut by_type: std::collections::HashMap<ServiceType, Vec<orcd_domain::DaemonDescription>> = Default::default();
    for d in daemons {
        by_type.entry(d.daemon_type).or_default().push(d.clone());
    }
    for (service_type, group) in by_type {
        if let Ok(driver) = registry.for_type(service_type) {
            driver.post_check(&group, cluster).await?;
        }
    }
    Ok(())
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcd_domain::{Host, Spec};
    use orcd_driver::{DriverRegistry, FakeClusterClient};
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
            Ok(orcd_driver::AgentResponse { code: 0, stdout: "[]".to_string(), stderr: String::new() })
        }
        async fn offline_hosts(&self) -> std::collections::HashSet<String> {
            Default::default()
        }
        async fn mark_online(&self, _host: &str) {}
    }

    #[tokio::test]
    async fn paused_cluster_skips_apply_stage() {
        let store = InMemoryStore::new();
        store.set_paused(true).await.unwrap();
        store
            .save_spec(Spec {
                service_type: ServiceType::Mgr,
                service_id: None,
                placement: Default::default(),
                unmanaged: false,
                preview_only: false,
                extra: Default::default(),
                created: None,
            })
            .await
            .unwrap();
        let registry = DriverRegistry::with_defaults();
        let cluster = FakeClusterClient::new();
        let executor = FakeExecutor;
        let report = run_iteration(&store, &registry, &cluster, &executor).await.unwrap();
        assert!(report.changes.is_empty());
        let checks = store.get_health_checks().await.unwrap();
        assert!(checks.0.contains_key(health::PAUSED));
    }

    #[tokio::test]
    async fn unpaused_cluster_deploys_mgr() {
        let store = InMemoryStore::new();
        store.add_host(Host::new("h1", "10.0.0.1")).await.unwrap();
        store.add_host(Host::new("h2", "10.0.0.2")).await.unwrap();
        store
            .save_spec(Spec {
                service_type: ServiceType::Mgr,
                service_id: None,
                placement: Default::default(),
                unmanaged: false,
                preview_only: false,
                extra: Default::default(),
                created: None,
            })
            .await
            .unwrap();
        let registry = DriverRegistry::with_defaults();
        let cluster = FakeClusterClient::new();
        let executor = FakeExecutor;
        let report = drain_iterations(&store, &registry, &cluster, &executor, 5).await.unwrap();
        assert!(!report.changes.is_empty(), "{:?}", report.errors);
    }

    #[tokio::test]
    async fn orphaned_daemon_without_spec_is_removed() {
        let store = InMemoryStore::new();
        store.add_host(Host::new("h1", "10.0.0.1")).await.unwrap();
        let mut cache = store.get_cache("h1").await.unwrap();
        cache.add_daemon(orcd_domain::DaemonDescription {
            daemon_type: ServiceType::Rgw,
            daemon_id: "zone1.h1.abcdef".to_string(),
            service_id: Some("zone1".to_string()),
            hostname: "h1".to_string(),
            container_image_id: None,
            container_image_name: None,
            version: None,
            status: orcd_domain::DaemonStatus::Running,
            status_desc: None,
            created: None,
            started: None,
            last_configured: None,
            last_deployed: None,
            last_refresh: None,
            osdspec_affinity: None,
            is_active: false,
        });
        store.put_cache("h1", cache).await.unwrap();

        let registry = DriverRegistry::with_defaults();
        let cluster = FakeClusterClient::new();
        check_daemons(&store, &registry, &cluster).await.unwrap();

        let cache = store.get_cache("h1").await.unwrap();
        assert!(cache.daemons.is_empty());
    }

    /// Reports one daemon from `ls`, canned via a fixed JSON body, for
    /// exercising the observe-then-flag-stray path end to end (scenario 5).
    struct ReportingExecutor(&'static str);
    #[async_trait::async_trait]
    impl Executor for ReportingExecutor {
        async fn run(
            &self,
            _host: &str,
            command: AgentCommand,
            _stdin: Option<&[u8]>,
            _allow_error: bool,
        ) -> Result<orcd_driver::AgentResponse, orcd_driver::DriverError> {
            let stdout = match command {
                AgentCommand::Ls => self.0.to_string(),
                _ => "[]".to_string(),
            };
            Ok(orcd_driver::AgentResponse { code: 0, stdout, stderr: String::new() })
        }
        async fn offline_hosts(&self) -> std::collections::HashSet<String> {
            Default::default()
        }
        async fn mark_online(&self, _host: &str) {}
    }

    #[tokio::test]
    async fn agent_reported_daemon_with_no_spec_becomes_a_stray() {
        let store = InMemoryStore::new();
        store.add_host(Host::new("h1", "10.0.0.1")).await.unwrap();
        let executor = ReportingExecutor(
            r#"[{"name":"rgw.zone1.h1.abcdef","hostname":"h1","systemd_unit":"ceph-rgw@zone1.h1.abcdef",
                "enabled":true,"state":"running","container_id":"c1","container_image_id":"img123",
                "container_image_name":"ceph/ceph:v18","version":"18.2.0","started":null,"created":null}]"#,
        );

        refresh_hosts_and_daemons(&store, &executor).await.unwrap();

        let cache = store.get_cache("h1").await.unwrap();
        assert_eq!(cache.daemons.len(), 1);
        let daemon = cache.daemons.values().next().unwrap();
        assert_eq!(daemon.daemon_type, ServiceType::Rgw);
        assert_eq!(daemon.service_id.as_deref(), Some("zone1"));
        assert_eq!(daemon.container_image_id.as_deref(), Some("img123"));

        let cluster = FakeClusterClient::new();
        check_for_strays(&store, &cluster).await.unwrap();
        let checks = store.get_health_checks().await.unwrap();
        let check = checks.0.get(health::STRAY_DAEMON).expect("stray daemon check should be published");
        assert!(check.detail.iter().any(|d| d.contains("rgw.zone1.h1.abcdef")));
    }
}
