use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use orcd_domain::{Host, ServiceName, Spec};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::state::{HealthChecks, HostCacheEntry, RemovalQueueEntry, UpgradeState};
use crate::store::ConfigStore;

#[derive(Debug, Default)]
struct Inner {
    hosts: HashMap<String, Host>,
    specs: HashMap<ServiceName, Spec>,
    cache: HashMap<String, HostCacheEntry>,
    removals: HashMap<i64, RemovalQueueEntry>,
    upgrade: UpgradeState,
    paused: bool,
    health: HealthChecks,
}

/// In-memory implementation of [`ConfigStore`].
///
/// All data is lost on process exit. Used by the test suite and by
/// `orcd-cli` when run without a `--state-dir`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for InMemoryStore {
    async fn get_host(&self, hostname: &str) -> Result<Option<Host>, StoreError> {
        Ok(self.inner.read().await.hosts.get(hostname).cloned())
    }

    async fn list_hosts(&self) -> Result<Vec<Host>, StoreError> {
        Ok(self.inner.read().await.hosts.values().cloned().collect())
    }

    async fn add_host(&self, host: Host) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.hosts.contains_key(&host.hostname) {
            return Err(StoreError::HostAlreadyExists(host.hostname));
        }
        guard.cache.insert(host.hostname.clone(), HostCacheEntry::default());
        guard.hosts.insert(host.hostname.clone(), host);
        Ok(())
    }

    async fn put_host(&self, host: Host) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.cache.entry(host.hostname.clone()).or_default();
        guard.hosts.insert(host.hostname.clone(), host);
        Ok(())
    }

    async fn remove_host(&self, hostname: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.hosts.remove(hostname).is_none() {
            return Err(StoreError::HostNotFound(hostname.to_string()));
        }
        guard.cache.remove(hostname);
        Ok(())
    }

    async fn get_spec(&self, name: &ServiceName) -> Result<Option<Spec>, StoreError> {
        Ok(self.inner.read().await.specs.get(name).cloned())
    }

    async fn list_specs(&self) -> Result<Vec<Spec>, StoreError> {
        Ok(self.inner.read().await.specs.values().cloned().collect())
    }

    async fn save_spec(&self, mut spec: Spec) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let name = spec.service_name();
        if spec.created.is_none() {
            spec.created = guard.specs.get(&name).and_then(|s| s.created).or(Some(Utc::now()));
        }
        guard.specs.insert(name, spec);
        Ok(())
    }

    async fn remove_spec(&self, name: &ServiceName) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.specs.remove(name).is_some())
    }

    async fn get_cache(&self, hostname: &str) -> Result<HostCacheEntry, StoreError> {
        Ok(self.inner.read().await.cache.get(hostname).cloned().unwrap_or_default())
    }

    async fn put_cache(&self, hostname: &str, entry: HostCacheEntry) -> Result<(), StoreError> {
        self.inner.write().await.cache.insert(hostname.to_string(), entry);
        Ok(())
    }

    async fn list_removals(&self) -> Result<Vec<RemovalQueueEntry>, StoreError> {
        Ok(self.inner.read().await.removals.values().cloned().collect())
    }

    async fn get_removal(&self, osd_id: i64) -> Result<Option<RemovalQueueEntry>, StoreError> {
        Ok(self.inner.read().await.removals.get(&osd_id).cloned())
    }

    async fn put_removal(&self, entry: RemovalQueueEntry) -> Result<(), StoreError> {
        self.inner.write().await.removals.insert(entry.osd_id, entry);
        Ok(())
    }

    async fn remove_removal(&self, osd_id: i64) -> Result<(), StoreError> {
        self.inner.write().await.removals.remove(&osd_id);
        Ok(())
    }

    async fn get_upgrade_state(&self) -> Result<UpgradeState, StoreError> {
        Ok(self.inner.read().await.upgrade.clone())
    }

    async fn put_upgrade_state(&self, state: UpgradeState) -> Result<(), StoreError> {
        self.inner.write().await.upgrade = state;
        Ok(())
    }

    async fn get_paused(&self) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.paused)
    }

    async fn set_paused(&self, paused: bool) -> Result<(), StoreError> {
        self.inner.write().await.paused = paused;
        Ok(())
    }

    async fn get_health_checks(&self) -> Result<HealthChecks, StoreError> {
        Ok(self.inner.read().await.health.clone())
    }

    async fn put_health_checks(&self, checks: HealthChecks) -> Result<(), StoreError> {
        self.inner.write().await.health = checks;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcd_domain::ServiceType;

    #[tokio::test]
    async fn add_host_then_remove_leaves_empty_cache_on_readd() {
        let store = InMemoryStore::new();
        store.add_host(Host::new("h1", "1.2.3.4")).await.unwrap();
        store.put_cache("h1", {
            let mut e = HostCacheEntry::default();
            e.invalidate_daemons();
            e
        }).await.unwrap();

        store.remove_host("h1").await.unwrap();
        store.add_host(Host::new("h1", "1.2.3.4")).await.unwrap();

        let cache = store.get_cache("h1").await.unwrap();
        assert!(cache.daemons.is_empty(), "P4: no ghost daemons after remove+add");
    }

    #[tokio::test]
    async fn duplicate_add_host_fails() {
        let store = InMemoryStore::new();
        store.add_host(Host::new("h1", "1.2.3.4")).await.unwrap();
        let err = store.add_host(Host::new("h1", "1.2.3.5")).await.unwrap_err();
        assert!(matches!(err, StoreError::HostAlreadyExists(_)));
    }

    #[tokio::test]
    async fn remove_missing_host_fails() {
        let store = InMemoryStore::new();
        let err = store.remove_host("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::HostNotFound(_)));
    }

    #[tokio::test]
    async fn remove_missing_spec_is_idempotent() {
        let store = InMemoryStore::new();
        let existed = store.remove_spec(&ServiceName::new(&ServiceType::Mds, Some("fs1"))).await.unwrap();
        assert!(!existed);
    }

    #[tokio::test]
    async fn save_spec_stamps_created_once() {
        let store = InMemoryStore::new();
        let spec = Spec {
            service_type: ServiceType::Mds,
            service_id: Some("fs1".into()),
            placement: Default::default(),
            unmanaged: false,
            preview_only: false,
            extra: Default::default(),
            created: None,
        };
        store.save_spec(spec.clone()).await.unwrap();
        let first = store.get_spec(&spec.service_name()).await.unwrap().unwrap();
        assert!(first.created.is_some());

        store.save_spec(spec.clone()).await.unwrap();
        let second = store.get_spec(&spec.service_name()).await.unwrap().unwrap();
        assert_eq!(first.created, second.created, "created timestamp must not move on re-save");
    }
}
