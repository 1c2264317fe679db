use std::collections::HashSet;

use glob::Pattern;
use orcd_domain::{DaemonDescription, Host, HostPlacementSpec, PlacementSpec, ServiceType};

use crate::error::SchedulerError;

/// Output of [`schedule`]: which hosts to deploy new daemons on, and which
/// existing daemons to tear down (§4.4).
#[derive(Debug, Clone, Default)]
pub struct HostAssignment {
    pub to_add: Vec<HostPlacementSpec>,
    pub to_remove: Vec<DaemonDescription>,
}

/// Optional extra predicate a caller can apply to candidate hosts, e.g. "mon
/// requires an IP on the configured public_network" (§4.4 step 2).
pub trait HostFilter {
    fn accepts(&self, host: &Host) -> bool;
}

impl<F: Fn(&Host) -> bool> HostFilter for F {
    fn accepts(&self, host: &Host) -> bool {
        self(host)
    }
}

/// No-op filter: every online host is a valid candidate.
pub struct NoFilter;
impl HostFilter for NoFilter {
    fn accepts(&self, _host: &Host) -> bool {
        true
    }
}

/// Pure scheduling function (§4.4). `existing_daemons` must already be
/// filtered down to the daemons belonging to this service's name.
///
/// Stateless and referentially transparent: same inputs always produce the
/// same `(to_add, to_remove)` (§8 P2 fixed-point property).
pub fn schedule(
    service_type: ServiceType,
    placement: &PlacementSpec,
    hosts: &[Host],
    existing_daemons: &[DaemonDescription],
    filter: &dyn HostFilter,
) -> Result<HostAssignment, SchedulerError> {
    if matches!(service_type, ServiceType::Mon | ServiceType::Mgr) {
        if let Some(count) = placement.count {
            if count < 1 {
                return Err(SchedulerError::CountTooLow { service_type, count });
            }
        }
    }

    // 1. Candidate selection, in Inventory order (tie-break rule, §4.4 step 8).
    let candidates: Vec<&Host> = if !placement.hosts.is_empty() {
        let wanted: HashSet<&str> = placement.hosts.iter().map(|h| h.hostname.as_str()).collect();
        hosts.iter().filter(|h| wanted.contains(h.hostname.as_str())).collect()
    } else if let Some(label) = &placement.label {
        hosts.iter().filter(|h| h.labels.contains(label)).collect()
    } else if let Some(pattern) = &placement.host_pattern {
        let glob = Pattern::new(pattern).unwrap_or_else(|_| Pattern::new("*").unwrap());
        hosts.iter().filter(|h| glob.matches(&h.hostname)).collect()
    } else {
        hosts.iter().collect()
    };

    // 2. Filter offline hosts and the caller's predicate.
    let candidates: Vec<&Host> = candidates
        .into_iter()
        .filter(|h| h.status == orcd_domain::HostStatus::Online)
        .filter(|h| filter.accepts(h))
        .collect();

    // Explicit forced names from placement.hosts (hostname -> name), if any.
    let forced_names: std::collections::HashMap<&str, Option<&str>> = placement
        .hosts
        .iter()
        .map(|h| (h.hostname.as_str(), h.name.as_deref()))
        .collect();

    let candidate_names: HashSet<&str> = candidates.iter().map(|h| h.hostname.as_str()).collect();

    // 3. Target count.
    let target = placement.count.map(|c| c.max(0) as usize).unwrap_or(candidates.len());

    // 4. Keep: existing daemons whose host is still a candidate, and whose
    // forced name (if any) still matches.
    let mut kept: Vec<&DaemonDescription> = Vec::new();
    let mut kept_hosts: HashSet<&str> = HashSet::new();
    for d in existing_daemons {
        if !candidate_names.contains(d.hostname.as_str()) {
            continue;
        }
        if let Some(Some(forced)) = forced_names.get(d.hostname.as_str()) {
            if d.daemon_id != *forced && d.daemon_id.split('.').next() != Some(*forced) {
                continue;
            }
        }
        kept.push(d);
        kept_hosts.insert(d.hostname.as_str());
    }

    // Validation: mon/mgr must end up with >= 1 if target demands it.
    if matches!(service_type, ServiceType::Mon | ServiceType::Mgr) && target < 1 {
        return Err(SchedulerError::CountTooLow { service_type, count: target as i64 });
    }

    // 5. Add: candidates not already hosting a kept daemon, in candidate
    // (Inventory) order, until |kept| + |add| == target.
    let mut to_add = Vec::new();
    if kept.len() < target {
        for host in &candidates {
            if kept.len() + to_add.len() >= target {
                break;
            }
            if kept_hosts.contains(host.hostname.as_str()) {
                continue;
            }
            let name = forced_names.get(host.hostname.as_str()).copied().flatten().map(String::from);
            to_add.push(HostPlacementSpec { hostname: host.hostname.clone(), network: None, name });
        }
    }

    // 6. Remove: existing \ kept, plus any kept-but-over-target (newest
    // first, per the tie-break rule).
    let kept_ids: HashSet<(&ServiceType, &str)> =
        kept.iter().map(|d| (&d.daemon_type, d.daemon_id.as_str())).collect();
    let mut to_remove: Vec<DaemonDescription> = existing_daemons
        .iter()
        .filter(|d| !kept_ids.contains(&(&d.daemon_type, d.daemon_id.as_str())))
        .cloned()
        .collect();

    if kept.len() > target {
        let mut overflow = kept.clone();
        overflow.sort_by_key(|d| std::cmp::Reverse(d.created));
        let excess = kept.len() - target;
        to_remove.extend(overflow.into_iter().take(excess).cloned());
    }

    Ok(HostAssignment { to_add, to_remove })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use orcd_domain::{DaemonStatus, HostStatus};

    fn host(name: &str) -> Host {
        Host::new(name, "10.0.0.1")
    }

    fn daemon(service_type: ServiceType, id: &str, hostname: &str, age_secs: i64) -> DaemonDescription {
        DaemonDescription {
            daemon_type: service_type,
            daemon_id: id.to_string(),
            service_id: None,
            hostname: hostname.to_string(),
            container_image_id: None,
            container_image_name: None,
            version: None,
            status: DaemonStatus::Running,
            status_desc: None,
            created: Some(Utc::now() - Duration::seconds(age_secs)),
            started: None,
            last_configured: None,
            last_deployed: None,
            last_refresh: None,
            osdspec_affinity: None,
            is_active: false,
        }
    }

    #[test]
    fn empty_state_adds_up_to_target() {
        let hosts = vec![host("h1"), host("h2"), host("h3")];
        let placement = PlacementSpec { count: Some(2), ..Default::default() };
        let result = schedule(ServiceType::Mgr, &placement, &hosts, &[], &NoFilter).unwrap();
        assert_eq!(result.to_add.len(), 2);
        assert_eq!(result.to_add[0].hostname, "h1");
        assert_eq!(result.to_add[1].hostname, "h2");
        assert!(result.to_remove.is_empty());
    }

    #[test]
    fn fixed_point_idempotence() {
        let hosts = vec![host("h1"), host("h2")];
        let placement = PlacementSpec { count: Some(2), ..Default::default() };
        let first = schedule(ServiceType::Mgr, &placement, &hosts, &[], &NoFilter).unwrap();
        let existing: Vec<DaemonDescription> = first
            .to_add
            .iter()
            .map(|a| daemon(ServiceType::Mgr, &a.hostname, &a.hostname, 0))
            .collect();
        let second = schedule(ServiceType::Mgr, &placement, &hosts, &existing, &NoFilter).unwrap();
        assert!(second.to_add.is_empty());
        assert!(second.to_remove.is_empty());
    }

    #[test]
    fn offline_hosts_excluded_from_candidates() {
        let mut h2 = host("h2");
        h2.status = HostStatus::Offline;
        let hosts = vec![host("h1"), h2, host("h3")];
        let placement = PlacementSpec { count: Some(2), ..Default::default() };
        let result = schedule(ServiceType::Mgr, &placement, &hosts, &[], &NoFilter).unwrap();
        assert_eq!(result.to_add.iter().map(|a| a.hostname.clone()).collect::<Vec<_>>(), vec!["h1", "h3"]);
    }

    #[test]
    fn over_target_removes_newest_first() {
        let hosts = vec![host("h1"), host("h2"), host("h3")];
        let existing = vec![
            daemon(ServiceType::Mgr, "h1", "h1", 100),
            daemon(ServiceType::Mgr, "h2", "h2", 50),
            daemon(ServiceType::Mgr, "h3", "h3", 10),
        ];
        let placement = PlacementSpec { count: Some(1), ..Default::default() };
        let result = schedule(ServiceType::Mgr, &placement, &hosts, &existing, &NoFilter).unwrap();
        assert_eq!(result.to_remove.len(), 2);
        let removed: HashSet<_> = result.to_remove.iter().map(|d| d.hostname.clone()).collect();
        assert!(removed.contains("h2"));
        assert!(removed.contains("h3"));
    }

    #[test]
    fn mgr_count_zero_rejected() {
        let hosts = vec![host("h1")];
        let placement = PlacementSpec { count: Some(0), ..Default::default() };
        let err = schedule(ServiceType::Mgr, &placement, &hosts, &[], &NoFilter).unwrap_err();
        assert!(matches!(err, SchedulerError::CountTooLow { .. }));
    }

    #[test]
    fn host_pattern_selects_via_glob() {
        let hosts = vec![host("osd1"), host("osd2"), host("mon1")];
        let placement = PlacementSpec { host_pattern: Some("osd*".to_string()), ..Default::default() };
        let result = schedule(ServiceType::Crash, &placement, &hosts, &[], &NoFilter).unwrap();
        assert_eq!(result.to_add.len(), 2);
        assert!(result.to_add.iter().all(|a| a.hostname.starts_with("osd")));
    }

    #[test]
    fn label_selects_matching_hosts_only() {
        let mut h1 = host("h1");
        h1.labels.insert("mon".to_string());
        let hosts = vec![h1, host("h2")];
        let placement = PlacementSpec { label: Some("mon".to_string()), count: Some(1), ..Default::default() };
        let result = schedule(ServiceType::Mon, &placement, &hosts, &[], &NoFilter).unwrap();
        assert_eq!(result.to_add.len(), 1);
        assert_eq!(result.to_add[0].hostname, "h1");
    }
}
