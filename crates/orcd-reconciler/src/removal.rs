use orcd_driver::{AgentCommand, ClusterClient, DriverRegistry, Executor};
use orcd_domain::ServiceType;
use orcd_store::{ConfigStore, RemovalQueueEntry, RemovalState};
use tracing::{info, warn};

use crate::error::ReconcileError;
use crate::report::{Change, IterationReport};

/// Advances every queued OSD through its state machine by one step
/// (§4.13). Runs once per serve-loop iteration (stage 4, §4.8); each OSD
/// progresses independently so a stuck removal never blocks the rest of
/// the queue.
pub async fn process_removal_queue(
    store: &dyn ConfigStore,
    registry: &DriverRegistry,
    cluster: &dyn ClusterClient,
    executor: &dyn Executor,
) -> Result<IterationReport, ReconcileError> {
    let mut report = IterationReport::default();

    for mut entry in store.list_removals().await? {
        let before = entry.state;
        if let Err(e) = advance(&mut entry, store, registry, cluster, executor).await {
            entry.state = RemovalState::Failed;
            entry.failure_reason = Some(e.to_string());
            report.errors.push(format!("osd.{} removal failed: {e}", entry.osd_id));
        }
        if entry.state != RemovalState::Done {
            store.put_removal(entry.clone()).await?;
        } else {
            store.remove_removal(entry.osd_id).await?;
        }
        if entry.state != before {
            report.changes.push(Change::DaemonRemoved {
                service_name: orcd_domain::ServiceName::new(&ServiceType::Osd, None),
                daemon_id: entry.osd_id.to_string(),
            });
        }
    }

    Ok(report)
}

async fn advance(
    entry: &mut RemovalQueueEntry,
    store: &dyn ConfigStore,
    registry: &DriverRegistry,
    cluster: &dyn ClusterClient,
    executor: &dyn Executor,
) -> Result<(), ReconcileError> {
    match entry.state {
        RemovalState::Queued => {
            if !entry.force {
                let driver = registry.for_type(ServiceType::Osd)?;
                // OsdDriver vets per-id via `osd safe-to-destroy`, not total_count.
                driver.ok_to_stop(&[entry.osd_id.to_string()], 0, cluster).await?;
            }
            cluster
                .mon_command("osd reweight", serde_json::json!({ "id": entry.osd_id, "weight": 0.0 }))
                .await?;
            entry.state = RemovalState::Draining;
            info!(osd_id = entry.osd_id, "osd removal: queued -> draining");
        }
        RemovalState::Draining => {
            let summary = cluster.object_get("pg_summary", &format!("osd.{}", entry.osd_id)).await?;
            let num_pgs = summary
                .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
                .and_then(|v| v.get("num_pgs").and_then(|n| n.as_i64()))
                .unwrap_or(-1);
            if num_pgs == 0 {
                entry.observed_empty = true;
                entry.state = RemovalState::Drained;
                info!(osd_id = entry.osd_id, "osd removal: draining -> drained");
            }
        }
        RemovalState::Drained => {
            let driver = registry.for_type(ServiceType::Osd)?;
            driver.pre_remove(&entry.osd_id.to_string(), cluster).await?;
            cluster.mon_command("osd out", serde_json::json!({ "id": entry.osd_id })).await?;
            entry.state = RemovalState::Purging;
            info!(osd_id = entry.osd_id, "osd removal: drained -> purging");
        }
        RemovalState::Purging => {
            let cmd = if entry.replace { "osd destroy" } else { "osd purge" };
            match cluster.mon_command(cmd, serde_json::json!({ "id": entry.osd_id })).await {
                Ok(_) => {
                    let cache = store.get_cache(&entry.hostname).await;
                    if let Ok(mut cache) = cache {
                        cache.rm_daemon(&entry.fullname);
                        let _ = store.put_cache(&entry.hostname, cache).await;
                    }
                    let _ = executor
                        .run(&entry.hostname, AgentCommand::RmDaemon { name: entry.fullname.as_str().to_string() }, None, true)
                        .await;
                    entry.state = RemovalState::Done;
                    info!(osd_id = entry.osd_id, "osd removal: purging -> done");
                }
                Err(e) => {
                    warn!(osd_id = entry.osd_id, error = %e, "osd removal: purge failed");
                    entry.state = RemovalState::Failed;
                    entry.failure_reason = Some(e.to_string());
                }
            }
        }
        RemovalState::Done | RemovalState::Failed => {}
    }
    Ok(())
}

/// `stop_remove_osds` (§4.13): restores weight and removes the queue entry
/// while still queued/draining; rejects once drained or further along.
pub async fn stop_removal(
    store: &dyn ConfigStore,
    cluster: &dyn ClusterClient,
    osd_id: i64,
) -> Result<(), ReconcileError> {
    let Some(entry) = store.get_removal(osd_id).await? else {
        return Err(ReconcileError::Internal(format!("osd.{osd_id} is not queued for removal")));
    };
    if !entry.can_stop() {
        return Err(ReconcileError::Internal(format!(
            "osd.{osd_id} removal has progressed past {:?}; cannot stop",
            entry.state
        )));
    }
    cluster
        .mon_command("osd reweight", serde_json::json!({ "id": osd_id, "weight": 1.0 }))
        .await?;
    store.remove_removal(osd_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
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

    #[tokio::test]
    async fn queued_osd_advances_to_draining() {
        let store = InMemoryStore::new();
        store.put_removal(RemovalQueueEntry::new(3, "h1", false, false, Utc::now())).await.unwrap();
        let registry = DriverRegistry::with_defaults();
        let cluster = FakeClusterClient::new();
        let executor = FakeExecutor;
        process_removal_queue(&store, &registry, &cluster, &executor).await.unwrap();
        let entry = store.get_removal(3).await.unwrap().unwrap();
        assert_eq!(entry.state, RemovalState::Draining);
    }

    #[tokio::test]
    async fn draining_osd_with_empty_pg_summary_advances_to_drained() {
        let store = InMemoryStore::new();
        let mut entry = RemovalQueueEntry::new(4, "h1", false, false, Utc::now());
        entry.state = RemovalState::Draining;
        store.put_removal(entry).await.unwrap();
        let cluster = FakeClusterClient::new();
        cluster.object_put("pg_summary", "osd.4", serde_json::json!({ "num_pgs": 0 }).to_string().into_bytes()).await.unwrap();
        let registry = DriverRegistry::with_defaults();
        let executor = FakeExecutor;
        process_removal_queue(&store, &registry, &cluster, &executor).await.unwrap();
        let entry = store.get_removal(4).await.unwrap().unwrap();
        assert_eq!(entry.state, RemovalState::Drained);
    }

    #[tokio::test]
    async fn purging_success_removes_entry_entirely() {
        let store = InMemoryStore::new();
        let mut entry = RemovalQueueEntry::new(5, "h1", false, false, Utc::now());
        entry.state = RemovalState::Purging;
        store.put_removal(entry).await.unwrap();
        let registry = DriverRegistry::with_defaults();
        let cluster = FakeClusterClient::new();
        let executor = FakeExecutor;
        process_removal_queue(&store, &registry, &cluster, &executor).await.unwrap();
        assert!(store.get_removal(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_removal_rejected_once_drained() {
        let store = InMemoryStore::new();
        let mut entry = RemovalQueueEntry::new(6, "h1", false, false, Utc::now());
        entry.state = RemovalState::Drained;
        store.put_removal(entry).await.unwrap();
        let cluster = FakeClusterClient::new();
        let err = stop_removal(&store, &cluster, 6).await.unwrap_err();
        assert!(err.to_string().contains("cannot stop"));
    }

    #[tokio::test]
    async fn stop_removal_ok_while_queued() {
        let store = InMemoryStore::new();
        store.put_removal(RemovalQueueEntry::new(7, "h1", false, false, Utc::now())).await.unwrap();
        let cluster = FakeClusterClient::new();
        stop_removal(&store, &cluster, 7).await.unwrap();
        assert!(store.get_removal(7).await.unwrap().is_none());
    }
}
