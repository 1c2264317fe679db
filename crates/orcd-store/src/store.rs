use async_trait::async_trait;
use orcd_domain::{Host, ServiceName, Spec};

use crate::error::StoreError;
use crate::state::{HealthChecks, HostCacheEntry, RemovalQueueEntry, UpgradeState};

/// Persisted state: Inventory (C1), SpecStore (C3), HostCache (C2), the OSD
/// removal queue (C9), upgrade state (C10), and the pause flag — everything
/// named in §6 "Persisted state" except the in-memory EventStore (C4), which
/// is deliberately not behind this trait (see [`crate::state::EventStore`]).
///
/// §3 invariant 5: the reconciler is the sole writer of `HostCache`; external
/// command handlers only touch Inventory/SpecStore/removal-queue/pause.
#[async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    // ── Inventory (C1) ────────────────────────────────────────────────────
    async fn get_host(&self, hostname: &str) -> Result<Option<Host>, StoreError>;
    async fn list_hosts(&self) -> Result<Vec<Host>, StoreError>;
    /// Fails with `HostAlreadyExists` on duplicate add (§4.1).
    async fn add_host(&self, host: Host) -> Result<(), StoreError>;
    async fn put_host(&self, host: Host) -> Result<(), StoreError>;
    /// Fails with `HostNotFound` on missing host (§4.1). Also discards the
    /// host's cache entry (§3 invariant 1, §8 P4).
    async fn remove_host(&self, hostname: &str) -> Result<(), StoreError>;

    // ── SpecStore (C3) ────────────────────────────────────────────────────
    async fn get_spec(&self, name: &ServiceName) -> Result<Option<Spec>, StoreError>;
    async fn list_specs(&self) -> Result<Vec<Spec>, StoreError>;
    /// Stamps `created` on first save (§4.3).
    async fn save_spec(&self, spec: Spec) -> Result<(), StoreError>;
    /// Returns whether an entry existed (§4.3, idempotent removal per §7).
    async fn remove_spec(&self, name: &ServiceName) -> Result<bool, StoreError>;

    // ── HostCache (C2) ────────────────────────────────────────────────────
    async fn get_cache(&self, hostname: &str) -> Result<HostCacheEntry, StoreError>;
    async fn put_cache(&self, hostname: &str, entry: HostCacheEntry) -> Result<(), StoreError>;

    // ── OSD removal queue (C9) ─────────────────────────────────────────────
    async fn list_removals(&self) -> Result<Vec<RemovalQueueEntry>, StoreError>;
    async fn get_removal(&self, osd_id: i64) -> Result<Option<RemovalQueueEntry>, StoreError>;
    async fn put_removal(&self, entry: RemovalQueueEntry) -> Result<(), StoreError>;
    async fn remove_removal(&self, osd_id: i64) -> Result<(), StoreError>;

    // ── Upgrade state (C10) ────────────────────────────────────────────────
    async fn get_upgrade_state(&self) -> Result<UpgradeState, StoreError>;
    async fn put_upgrade_state(&self, state: UpgradeState) -> Result<(), StoreError>;

    // ── Pause flag ──────────────────────────────────────────────────────────
    async fn get_paused(&self) -> Result<bool, StoreError>;
    async fn set_paused(&self, paused: bool) -> Result<(), StoreError>;

    // ── Health publisher (C11) ───────────────────────────────────────────────
    async fn get_health_checks(&self) -> Result<HealthChecks, StoreError>;
    async fn put_health_checks(&self, checks: HealthChecks) -> Result<(), StoreError>;
}
