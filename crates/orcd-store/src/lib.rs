pub mod error;
pub mod state;
pub mod store;
pub mod memory;
pub mod redb_store;

pub use error::StoreError;
pub use state::{
    CacheConfig, DeviceInfo, Event, EventLevel, EventStore, HealthCheck, HealthChecks,
    HostCacheEntry, RemovalQueueEntry, RemovalState, Severity, UpgradeState, volatile_status,
};
pub use store::ConfigStore;
pub use memory::InMemoryStore;
pub use redb_store::RedbStore;
