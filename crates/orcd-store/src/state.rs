use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use orcd_domain::{DaemonDescription, DaemonName, ServiceType};
use serde::{Deserialize, Serialize};

// ── Refresh cadence (§4.2 defaults) ───────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub host_check_interval: Duration,
    pub daemon_cache_timeout: Duration,
    pub device_cache_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            host_check_interval: Duration::seconds(600),
            daemon_cache_timeout: Duration::seconds(600),
            device_cache_timeout: Duration::seconds(1800),
        }
    }
}

// ── Device / network inventory ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub path: String,
    pub sys_api_size: Option<u64>,
    pub rotational: Option<bool>,
    pub available: bool,
}

// ── HostCacheEntry (§4.2) ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostCacheEntry {
    pub daemons: HashMap<DaemonName, DaemonDescription>,
    pub devices: Vec<DeviceInfo>,
    pub networks: HashMap<String, Vec<String>>,
    pub last_host_check: Option<DateTime<Utc>>,
    pub last_daemon_refresh: Option<DateTime<Utc>>,
    pub last_device_refresh: Option<DateTime<Utc>>,
    pub last_etc_conf_write: Option<DateTime<Utc>>,
    /// Per-daemon `(deps, last_config_time)`, compared on every `_check_daemons`
    /// pass (§4.8 stage 7) to decide whether a reconfig is due.
    pub daemon_config_deps: HashMap<DaemonName, (Vec<DaemonName>, DateTime<Utc>)>,
    pub needs_registry_login: bool,
    /// Forces the next refresh regardless of cadence (`invalidate_host_daemons`).
    pub daemon_refresh_invalidated: bool,
    pub device_refresh_invalidated: bool,
    /// Monmap generation last observed; compared against `last_etc_conf_write`
    /// to decide `host_needs_new_etc_conf`.
    pub monmap_epoch_seen: u64,
}

impl HostCacheEntry {
    pub fn host_needs_check(&self, now: DateTime<Utc>, cfg: &CacheConfig) -> bool {
        match self.last_host_check {
            None => true,
            Some(t) => now - t >= cfg.host_check_interval,
        }
    }

    pub fn host_needs_daemon_refresh(&self, now: DateTime<Utc>, cfg: &CacheConfig) -> bool {
        if self.daemon_refresh_invalidated {
            return true;
        }
        match self.last_daemon_refresh {
            None => true,
            Some(t) => now - t >= cfg.daemon_cache_timeout,
        }
    }

    pub fn host_needs_device_refresh(&self, now: DateTime<Utc>, cfg: &CacheConfig) -> bool {
        if self.device_refresh_invalidated {
            return true;
        }
        match self.last_device_refresh {
            None => true,
            Some(t) => now - t >= cfg.device_cache_timeout,
        }
    }

    pub fn host_needs_new_etc_conf(&self, monmap_epoch: u64) -> bool {
        monmap_epoch > self.monmap_epoch_seen
    }

    pub fn update_daemons(&mut self, daemons: HashMap<DaemonName, DaemonDescription>, now: DateTime<Utc>) {
        self.daemons = daemons;
        self.last_daemon_refresh = Some(now);
        self.daemon_refresh_invalidated = false;
    }

    pub fn add_daemon(&mut self, daemon: DaemonDescription) {
        self.daemons.insert(daemon.name(), daemon);
    }

    pub fn rm_daemon(&mut self, name: &DaemonName) -> Option<DaemonDescription> {
        self.daemon_config_deps.remove(name);
        self.daemons.remove(name)
    }

    pub fn invalidate_daemons(&mut self) {
        self.daemon_refresh_invalidated = true;
    }

    pub fn invalidate_devices(&mut self) {
        self.device_refresh_invalidated = true;
    }

    pub fn daemons_by_service(&self, service_name: &orcd_domain::ServiceName) -> Vec<&DaemonDescription> {
        self.daemons
            .values()
            .filter(|d| &d.service_name() == service_name)
            .collect()
    }
}

/// Pure, read-only transform: overlay "unknown" status onto daemons whose
/// host is offline, without mutating the cache (§4.2, §9 design note).
pub fn volatile_status(daemon: &DaemonDescription, host_online: bool) -> DaemonDescription {
    let mut d = daemon.clone();
    if !host_online {
        d.status = orcd_domain::DaemonStatus::Unknown;
        d.status_desc = Some("host is offline".to_string());
    }
    d
}

// ── RemovalQueueEntry (§3, §4.13) ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalState {
    Queued,
    Draining,
    Drained,
    Purging,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalQueueEntry {
    pub osd_id: i64,
    pub replace: bool,
    pub force: bool,
    pub hostname: String,
    pub fullname: DaemonName,
    pub started_at: DateTime<Utc>,
    pub state: RemovalState,
    /// Set once `pg_summary` has reported zero PGs at least once (§8 P6).
    pub observed_empty: bool,
    pub failure_reason: Option<String>,
}

impl RemovalQueueEntry {
    pub fn new(osd_id: i64, hostname: impl Into<String>, replace: bool, force: bool, now: DateTime<Utc>) -> Self {
        RemovalQueueEntry {
            osd_id,
            replace,
            force,
            hostname: hostname.into(),
            fullname: DaemonName::new(&ServiceType::Osd, &osd_id.to_string()),
            started_at: now,
            state: RemovalState::Queued,
            observed_empty: false,
            failure_reason: None,
        }
    }

    /// `stop_remove_osds` (§4.13): allowed only while still queued/draining.
    pub fn can_stop(&self) -> bool {
        matches!(self.state, RemovalState::Queued | RemovalState::Draining)
    }
}

// ── UpgradeState (§4.14) ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeState {
    pub target_image: Option<String>,
    pub target_id: Option<String>,
    pub target_version: Option<String>,
    pub in_progress: bool,
    pub paused: bool,
    pub current_type: Option<ServiceType>,
    pub current_daemon: Option<DaemonName>,
}

// ── Health publisher (§4.15) ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub severity: Severity,
    pub summary: String,
    pub count: usize,
    pub detail: Vec<String>,
}

/// Named health checks, keyed by check name (`STRAY_HOST`, `PAUSED`, ...).
/// Publishing is idempotent; clearing a name that is absent is a no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthChecks(pub HashMap<String, HealthCheck>);

impl HealthChecks {
    pub fn publish(&mut self, name: impl Into<String>, check: HealthCheck) {
        self.0.insert(name.into(), check);
    }

    pub fn clear(&mut self, name: &str) {
        self.0.remove(name);
    }
}

// ── EventStore (§2 C4) — in-memory ring, never persisted ─────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub at: DateTime<Utc>,
    pub service_name: Option<String>,
    pub daemon_name: Option<String>,
    pub level: EventLevel,
    pub message: String,
}

/// Bounded ring buffer of recent events, one per service/daemon stream.
/// Deliberately in-memory only (§2 C4): event history does not need to
/// survive a restart, unlike the rest of the cache.
#[derive(Debug, Clone)]
pub struct EventStore {
    capacity: usize,
    events: std::collections::VecDeque<Event>,
}

impl EventStore {
    pub fn new(capacity: usize) -> Self {
        EventStore { capacity, events: std::collections::VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, event: Event) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn for_service(&self, service_name: &str) -> Vec<&Event> {
        self.events.iter().filter(|e| e.service_name.as_deref() == Some(service_name)).collect()
    }

    pub fn for_daemon(&self, daemon_name: &str) -> Vec<&Event> {
        self.events.iter().filter(|e| e.daemon_name.as_deref() == Some(daemon_name)).collect()
    }

    pub fn recent(&self, limit: usize) -> Vec<&Event> {
        let start = self.events.len().saturating_sub(limit);
        self.events.iter().skip(start).collect()
    }
}

impl Default for EventStore {
    fn default() -> Self {
        EventStore::new(1000)
    }
}
