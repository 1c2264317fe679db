use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use orcd_domain::{Host, ServiceName, Spec};
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::state::{HealthChecks, HostCacheEntry, RemovalQueueEntry, UpgradeState};
use crate::store::ConfigStore;

const HOSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("hosts");
const SPECS: TableDefinition<&str, &[u8]> = TableDefinition::new("specs");
const CACHE: TableDefinition<&str, &[u8]> = TableDefinition::new("host_cache");
const REMOVALS: TableDefinition<i64, &[u8]> = TableDefinition::new("removal_queue");
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const META_UPGRADE: &str = "upgrade_state";
const META_PAUSED: &str = "pause";
const META_HEALTH: &str = "health_checks";

fn internal<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Internal(e.to_string())
}

/// Persistent state store backed by a `redb` database file (§6 "Persisted
/// state"). Survives process restarts, as required for the removal queue
/// and upgrade state (§3 Lifecycle).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a redb database at `path`. Parent directories are
    /// created automatically.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(internal)?;
        }
        let db = Database::create(path).map_err(internal)?;
        {
            let wtxn = db.begin_write().map_err(internal)?;
            wtxn.open_table(HOSTS).map_err(internal)?;
            wtxn.open_table(SPECS).map_err(internal)?;
            wtxn.open_table(CACHE).map_err(internal)?;
            wtxn.open_table(REMOVALS).map_err(internal)?;
            wtxn.open_table(META).map_err(internal)?;
            wtxn.commit().map_err(internal)?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    fn get_json<K>(&self, table: TableDefinition<K, &[u8]>, key: K) -> Result<Option<Vec<u8>>, StoreError>
    where
        K: redb::Key + for<'a> redb::Value<SelfType<'a> = K>,
    {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let t = rtxn.open_table(table).map_err(internal)?;
        Ok(t.get(key).map_err(internal)?.map(|g| g.value().to_vec()))
    }

    fn put_json<K>(&self, table: TableDefinition<K, &[u8]>, key: K, bytes: &[u8]) -> Result<(), StoreError>
    where
        K: redb::Key + for<'a> redb::Value<SelfType<'a> = K>,
    {
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut t = wtxn.open_table(table).map_err(internal)?;
            t.insert(key, bytes).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for RedbStore {
    async fn get_host(&self, hostname: &str) -> Result<Option<Host>, StoreError> {
        match self.get_json(HOSTS, hostname)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_hosts(&self) -> Result<Vec<Host>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let t = rtxn.open_table(HOSTS).map_err(internal)?;
        let mut out = Vec::new();
        for entry in t.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    async fn add_host(&self, host: Host) -> Result<(), StoreError> {
        if self.get_host(&host.hostname).await?.is_some() {
            return Err(StoreError::HostAlreadyExists(host.hostname));
        }
        self.put_cache(&host.hostname, HostCacheEntry::default()).await?;
        self.put_host(host).await
    }

    async fn put_host(&self, host: Host) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&host)?;
        self.put_json(HOSTS, host.hostname.as_str(), &bytes)
    }

    async fn remove_host(&self, hostname: &str) -> Result<(), StoreError> {
        if self.get_host(hostname).await?.is_none() {
            return Err(StoreError::HostNotFound(hostname.to_string()));
        }
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut hosts = wtxn.open_table(HOSTS).map_err(internal)?;
            hosts.remove(hostname).map_err(internal)?;
            let mut cache = wtxn.open_table(CACHE).map_err(internal)?;
            cache.remove(hostname).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    async fn get_spec(&self, name: &ServiceName) -> Result<Option<Spec>, StoreError> {
        match self.get_json(SPECS, name.as_str())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_specs(&self) -> Result<Vec<Spec>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let t = rtxn.open_table(SPECS).map_err(internal)?;
        let mut out = Vec::new();
        for entry in t.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    async fn save_spec(&self, mut spec: Spec) -> Result<(), StoreError> {
        let name = spec.service_name();
        if spec.created.is_none() {
            spec.created = self.get_spec(&name).await?.and_then(|s| s.created).or(Some(chrono::Utc::now()));
        }
        let bytes = serde_json::to_vec(&spec)?;
        self.put_json(SPECS, name.as_str(), &bytes)
    }

    async fn remove_spec(&self, name: &ServiceName) -> Result<bool, StoreError> {
        let existed = self.get_spec(name).await?.is_some();
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut t = wtxn.open_table(SPECS).map_err(internal)?;
            t.remove(name.as_str()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(existed)
    }

    async fn get_cache(&self, hostname: &str) -> Result<HostCacheEntry, StoreError> {
        match self.get_json(CACHE, hostname)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(HostCacheEntry::default()),
        }
    }

    async fn put_cache(&self, hostname: &str, entry: HostCacheEntry) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&entry)?;
        self.put_json(CACHE, hostname, &bytes)
    }

    async fn list_removals(&self) -> Result<Vec<RemovalQueueEntry>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let t = rtxn.open_table(REMOVALS).map_err(internal)?;
        let mut out = Vec::new();
        for entry in t.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    async fn get_removal(&self, osd_id: i64) -> Result<Option<RemovalQueueEntry>, StoreError> {
        match self.get_json(REMOVALS, osd_id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put_removal(&self, entry: RemovalQueueEntry) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&entry)?;
        self.put_json(REMOVALS, entry.osd_id, &bytes)
    }

    async fn remove_removal(&self, osd_id: i64) -> Result<(), StoreError> {
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut t = wtxn.open_table(REMOVALS).map_err(internal)?;
            t.remove(osd_id).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    async fn get_upgrade_state(&self) -> Result<UpgradeState, StoreError> {
        match self.get_json(META, META_UPGRADE)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(UpgradeState::default()),
        }
    }

    async fn put_upgrade_state(&self, state: UpgradeState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&state)?;
        self.put_json(META, META_UPGRADE, &bytes)
    }

    async fn get_paused(&self) -> Result<bool, StoreError> {
        match self.get_json(META, META_PAUSED)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(false),
        }
    }

    async fn set_paused(&self, paused: bool) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&paused)?;
        self.put_json(META, META_PAUSED, &bytes)
    }

    async fn get_health_checks(&self) -> Result<HealthChecks, StoreError> {
        match self.get_json(META, META_HEALTH)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(HealthChecks::default()),
        }
    }

    async fn put_health_checks(&self, checks: HealthChecks) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&checks)?;
        self.put_json(META, META_HEALTH, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcd_domain::ServiceType;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> RedbStore {
        RedbStore::open(&dir.path().join("state.redb")).unwrap()
    }

    #[tokio::test]
    async fn persistence_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store.add_host(Host::new("h1", "1.2.3.4")).await.unwrap();
        }
        {
            let store = RedbStore::open(&path).unwrap();
            let got = store.get_host("h1").await.unwrap();
            assert!(got.is_some(), "host should survive store reopen");
        }
    }

    #[tokio::test]
    async fn removal_queue_entry_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let entry = RemovalQueueEntry::new(7, "h1", false, false, chrono::Utc::now());
        store.put_removal(entry.clone()).await.unwrap();
        let got = store.get_removal(7).await.unwrap().unwrap();
        assert_eq!(got.osd_id, 7);
        assert_eq!(got.hostname, "h1");
    }

    #[tokio::test]
    async fn spec_round_trips_through_json() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
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
        let got = store.get_spec(&spec.service_name()).await.unwrap().unwrap();
        assert_eq!(got.service_id, spec.service_id);
    }
}
