use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::DomainError;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// `{type}` or `{type}.{id}` — the key under which a [`crate::types::Spec`]
/// and its daemons are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceName(pub String);

impl ServiceName {
    pub fn new(service_type: &ServiceType, service_id: Option<&str>) -> Self {
        match service_id {
            Some(id) if !id.is_empty() => ServiceName(format!("{}.{}", service_type.as_str(), id)),
            _ => ServiceName(service_type.as_str().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `{type}.{id}` for a single running daemon instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DaemonName(pub String);

impl DaemonName {
    pub fn new(daemon_type: &ServiceType, daemon_id: &str) -> Self {
        DaemonName(format!("{}.{}", daemon_type.as_str(), daemon_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DaemonName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Characters permitted in a service id or forced daemon name (§6 Validation).
fn is_valid_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'
}

pub fn validate_id(s: &str) -> Result<(), DomainError> {
    if s.is_empty() || !s.chars().all(is_valid_id_char) {
        return Err(DomainError::InvalidServiceId(s.to_string()));
    }
    Ok(())
}

// ── ServiceType ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    Mon,
    Mgr,
    Osd,
    Mds,
    Rgw,
    RbdMirror,
    Nfs,
    Iscsi,
    Grafana,
    Alertmanager,
    Prometheus,
    NodeExporter,
    Crash,
}

impl ServiceType {
    pub const ALL: &'static [ServiceType] = &[
        ServiceType::Mon,
        ServiceType::Mgr,
        ServiceType::Osd,
        ServiceType::Mds,
        ServiceType::Rgw,
        ServiceType::RbdMirror,
        ServiceType::Nfs,
        ServiceType::Iscsi,
        ServiceType::Grafana,
        ServiceType::Alertmanager,
        ServiceType::Prometheus,
        ServiceType::NodeExporter,
        ServiceType::Crash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Mon => "mon",
            ServiceType::Mgr => "mgr",
            ServiceType::Osd => "osd",
            ServiceType::Mds => "mds",
            ServiceType::Rgw => "rgw",
            ServiceType::RbdMirror => "rbd-mirror",
            ServiceType::Nfs => "nfs",
            ServiceType::Iscsi => "iscsi",
            ServiceType::Grafana => "grafana",
            ServiceType::Alertmanager => "alertmanager",
            ServiceType::Prometheus => "prometheus",
            ServiceType::NodeExporter => "node-exporter",
            ServiceType::Crash => "crash",
        }
    }

    pub fn from_str_loose(s: &str) -> Result<Self, DomainError> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::UnknownServiceType(s.to_string()))
    }

    /// mon/mgr never carry a service_id (§3 Spec).
    pub fn allows_service_id(&self) -> bool {
        !matches!(self, ServiceType::Mon | ServiceType::Mgr)
    }

    /// mds/rgw/nfs/iscsi/osd require a service_id (§6 spec YAML schema).
    pub fn requires_service_id(&self) -> bool {
        matches!(
            self,
            ServiceType::Mds | ServiceType::Rgw | ServiceType::Nfs | ServiceType::Iscsi | ServiceType::Osd
        )
    }

    /// Daemon-id allocation scheme (§4.10). mon, crash, nfs, and the monitoring
    /// stack are non-suffixed: the host's short name is the whole id.
    pub fn is_suffixed(&self) -> bool {
        !matches!(
            self,
            ServiceType::Mon
                | ServiceType::Crash
                | ServiceType::Nfs
                | ServiceType::Grafana
                | ServiceType::Alertmanager
                | ServiceType::Prometheus
                | ServiceType::NodeExporter
        )
    }

    /// One of the three types with an implicit spec (§3 invariant 3): daemons
    /// of these types may exist with no entry in SpecStore and are not strays.
    pub fn has_implicit_spec(&self) -> bool {
        matches!(self, ServiceType::Mon | ServiceType::Mgr | ServiceType::Osd)
    }

    /// Fixed upgrade order (§4.14), lowest first.
    pub fn upgrade_order(&self) -> u8 {
        match self {
            ServiceType::Mgr => 0,
            ServiceType::Mon => 1,
            ServiceType::Crash => 2,
            ServiceType::Osd => 3,
            ServiceType::Mds => 4,
            ServiceType::Rgw => 5,
            ServiceType::RbdMirror => 6,
            ServiceType::Iscsi => 7,
            ServiceType::Nfs => 8,
            ServiceType::Grafana | ServiceType::Alertmanager | ServiceType::Prometheus | ServiceType::NodeExporter => 9,
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Host ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub hostname: String,
    pub address: String,
    pub labels: BTreeSet<String>,
    pub status: HostStatus,
}

impl Host {
    pub fn new(hostname: impl Into<String>, address: impl Into<String>) -> Self {
        Host {
            hostname: hostname.into(),
            address: address.into(),
            labels: BTreeSet::new(),
            status: HostStatus::Online,
        }
    }

    /// The "shortHost" used in daemon id allocation (§4.10): the hostname up
    /// to its first dot.
    pub fn short_name(&self) -> &str {
        self.hostname.split('.').next().unwrap_or(&self.hostname)
    }
}

// ── Placement ────────────────────────────────────────────────────────────────

/// `hostname[:network][=name]` — one entry of `placement.hosts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPlacementSpec {
    pub hostname: String,
    pub network: Option<String>,
    pub name: Option<String>,
}

impl HostPlacementSpec {
    pub fn parse(s: &str) -> Self {
        let (rest, name) = match s.split_once('=') {
            Some((a, b)) => (a, Some(b.to_string())),
            None => (s, None),
        };
        let (hostname, network) = match rest.split_once(':') {
            Some((a, b)) => (a.to_string(), Some(b.to_string())),
            None => (rest.to_string(), None),
        };
        HostPlacementSpec { hostname, network, name }
    }

    pub fn simple(hostname: impl Into<String>) -> Self {
        HostPlacementSpec { hostname: hostname.into(), network: None, name: None }
    }
}

impl std::fmt::Display for HostPlacementSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hostname)?;
        if let Some(n) = &self.network {
            write!(f, ":{}", n)?;
        }
        if let Some(n) = &self.name {
            write!(f, "={}", n)?;
        }
        Ok(())
    }
}

/// Exactly one or zero of `{hosts, label, host_pattern}`, plus an optional count.
/// Empty means "use the per-type default" (§4.5).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementSpec {
    #[serde(default)]
    pub hosts: Vec<HostPlacementSpec>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub host_pattern: Option<String>,
    #[serde(default)]
    pub count: Option<i64>,
}

impl PlacementSpec {
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.label.is_none() && self.host_pattern.is_none()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let modes = [!self.hosts.is_empty(), self.label.is_some(), self.host_pattern.is_some()];
        if modes.iter().filter(|m| **m).count() > 1 {
            return Err(DomainError::InvalidPlacement(
                "at most one of hosts/label/host_pattern may be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-type defaults when `placement` is empty (§4.5).
    pub fn default_for(service_type: ServiceType) -> Self {
        match service_type {
            ServiceType::Mon => PlacementSpec { count: Some(5), ..Default::default() },
            ServiceType::Mgr | ServiceType::Mds | ServiceType::Rgw | ServiceType::RbdMirror => {
                PlacementSpec { count: Some(2), ..Default::default() }
            }
            ServiceType::Iscsi
            | ServiceType::Nfs
            | ServiceType::Grafana
            | ServiceType::Alertmanager
            | ServiceType::Prometheus => PlacementSpec { count: Some(1), ..Default::default() },
            ServiceType::NodeExporter | ServiceType::Crash => {
                PlacementSpec { host_pattern: Some("*".to_string()), ..Default::default() }
            }
            ServiceType::Osd => PlacementSpec::default(),
        }
    }
}

// ── Service-specific attributes ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveGroupFilter {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub rotational: Option<bool>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecExtra {
    Nfs { pool: String, namespace: Option<String> },
    Rgw { realm: Option<String>, zone: Option<String> },
    Osd { data_devices: Option<DriveGroupFilter>, db_devices: Option<DriveGroupFilter> },
    None,
}

impl Default for SpecExtra {
    fn default() -> Self {
        SpecExtra::None
    }
}

// ── Spec ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spec {
    pub service_type: ServiceType,
    pub service_id: Option<String>,
    #[serde(default)]
    pub placement: PlacementSpec,
    #[serde(default)]
    pub unmanaged: bool,
    #[serde(default)]
    pub preview_only: bool,
    #[serde(default)]
    pub extra: SpecExtra,
    /// When this spec was first saved (§4.3 SpecStore::save).
    #[serde(default)]
    pub created: Option<chrono::DateTime<chrono::Utc>>,
}

impl Spec {
    pub fn validate(&self) -> Result<(), DomainError> {
        self.placement.validate()?;
        if let Some(id) = &self.service_id {
            validate_id(id)?;
            if !self.service_type.allows_service_id() {
                return Err(DomainError::InvalidPlacement(format!(
                    "{} may not carry a service_id",
                    self.service_type
                )));
            }
        } else if self.service_type.requires_service_id() {
            return Err(DomainError::InvalidPlacement(format!(
                "{} requires a service_id",
                self.service_type
            )));
        }
        if matches!(self.service_type, ServiceType::Mon | ServiceType::Mgr) {
            if let Some(count) = self.placement.count {
                if count < 1 {
                    return Err(DomainError::InvalidPlacement(format!(
                        "{} requires count >= 1",
                        self.service_type
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn service_name(&self) -> ServiceName {
        ServiceName::new(&self.service_type, self.service_id.as_deref())
    }

    /// The placement to use for scheduling: explicit if set, else the
    /// per-type default (§4.5).
    pub fn effective_placement(&self) -> PlacementSpec {
        if self.placement.is_empty() {
            PlacementSpec::default_for(self.service_type)
        } else {
            self.placement.clone()
        }
    }
}

// ── DaemonDescription ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaemonStatus {
    Running,
    Stopped,
    Error,
    Unknown,
}

impl DaemonStatus {
    pub fn as_i32(&self) -> i32 {
        match self {
            DaemonStatus::Running => 1,
            DaemonStatus::Stopped => 0,
            DaemonStatus::Error => -1,
            DaemonStatus::Unknown => -1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonDescription {
    pub daemon_type: ServiceType,
    pub daemon_id: String,
    /// The `service_id` of the spec this daemon belongs to (None for mon/mgr
    /// and any non-suffixed type deployed without one). Stored directly
    /// rather than parsed back out of `daemon_id`.
    pub service_id: Option<String>,
    pub hostname: String,
    pub container_image_id: Option<String>,
    pub container_image_name: Option<String>,
    pub version: Option<String>,
    pub status: DaemonStatus,
    pub status_desc: Option<String>,
    pub created: Option<chrono::DateTime<chrono::Utc>>,
    pub started: Option<chrono::DateTime<chrono::Utc>>,
    pub last_configured: Option<chrono::DateTime<chrono::Utc>>,
    pub last_deployed: Option<chrono::DateTime<chrono::Utc>>,
    pub last_refresh: Option<chrono::DateTime<chrono::Utc>>,
    pub osdspec_affinity: Option<String>,
    pub is_active: bool,
}

impl DaemonDescription {
    pub fn name(&self) -> DaemonName {
        DaemonName::new(&self.daemon_type, &self.daemon_id)
    }

    pub fn service_name(&self) -> ServiceName {
        ServiceName::new(&self.daemon_type, self.service_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_omits_id_for_mon() {
        let name = ServiceName::new(&ServiceType::Mon, None);
        assert_eq!(name.as_str(), "mon");
    }

    #[test]
    fn service_name_includes_id_for_mds() {
        let name = ServiceName::new(&ServiceType::Mds, Some("fs1"));
        assert_eq!(name.as_str(), "mds.fs1");
    }

    #[test]
    fn host_placement_parses_all_parts() {
        let hp = HostPlacementSpec::parse("h1:1.0.0.0/24=forced-id");
        assert_eq!(hp.hostname, "h1");
        assert_eq!(hp.network.as_deref(), Some("1.0.0.0/24"));
        assert_eq!(hp.name.as_deref(), Some("forced-id"));
    }

    #[test]
    fn host_placement_parses_bare_hostname() {
        let hp = HostPlacementSpec::parse("h1");
        assert_eq!(hp.hostname, "h1");
        assert!(hp.network.is_none());
        assert!(hp.name.is_none());
    }

    #[test]
    fn mon_count_below_one_rejected() {
        let spec = Spec {
            service_type: ServiceType::Mon,
            service_id: None,
            placement: PlacementSpec { count: Some(0), ..Default::default() },
            unmanaged: false,
            preview_only: false,
            extra: SpecExtra::None,
            created: None,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn mon_rejects_service_id() {
        let spec = Spec {
            service_type: ServiceType::Mon,
            service_id: Some("x".into()),
            placement: PlacementSpec::default(),
            unmanaged: false,
            preview_only: false,
            extra: SpecExtra::None,
            created: None,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn nfs_requires_service_id() {
        let spec = Spec {
            service_type: ServiceType::Nfs,
            service_id: None,
            placement: PlacementSpec::default(),
            unmanaged: false,
            preview_only: false,
            extra: SpecExtra::Nfs { pool: "p".into(), namespace: None },
            created: None,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn invalid_chars_in_service_id_rejected() {
        assert!(validate_id("bad id!").is_err());
        assert!(validate_id("good-id_1.2").is_ok());
    }

    #[test]
    fn default_placement_matches_table() {
        assert_eq!(PlacementSpec::default_for(ServiceType::Mon).count, Some(5));
        assert_eq!(PlacementSpec::default_for(ServiceType::Mgr).count, Some(2));
        assert_eq!(PlacementSpec::default_for(ServiceType::Nfs).count, Some(1));
        assert_eq!(
            PlacementSpec::default_for(ServiceType::Crash).host_pattern.as_deref(),
            Some("*")
        );
    }

    #[test]
    fn short_name_strips_domain() {
        let h = Host::new("h1.example.com", "1.2.3.4");
        assert_eq!(h.short_name(), "h1");
    }
}
