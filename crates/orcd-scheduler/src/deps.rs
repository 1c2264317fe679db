use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use orcd_domain::ServiceType;

use crate::error::SchedulerError;

/// Cross-type dependency table for the monitoring stack (§4.7): a dependency
/// changing is one of the triggers for a daemon reconfig (§4.8 stage 7).
pub fn deps_for(service_type: ServiceType) -> &'static [ServiceType] {
    match service_type {
        ServiceType::Prometheus => &[ServiceType::Mgr, ServiceType::Alertmanager, ServiceType::NodeExporter],
        ServiceType::Grafana => &[ServiceType::Prometheus],
        ServiceType::Alertmanager => &[ServiceType::Mgr, ServiceType::Alertmanager],
        _ => &[],
    }
}

/// Topologically orders a set of service types by their declared deps, so
/// that dependencies are always deployed before their dependents. Used when
/// `_apply_all_services` (§4.8 stage 6) decides in which order to reconcile
/// specs.
pub fn topo_order(service_types: &[ServiceType]) -> Result<Vec<ServiceType>, SchedulerError> {
    let mut graph: DiGraph<ServiceType, ()> = DiGraph::new();
    let mut index_of: HashMap<ServiceType, NodeIndex> = HashMap::new();
    for &st in service_types {
        index_of.entry(st).or_insert_with(|| graph.add_node(st));
    }

    for &st in service_types {
        for &dep in deps_for(st) {
            if dep == st {
                continue; // self-dependency declared in the table carries no ordering weight
            }
            if let Some(&dep_idx) = index_of.get(&dep) {
                graph.add_edge(dep_idx, index_of[&st], ());
            }
        }
    }

    if is_cyclic_directed(&graph) {
        return Err(SchedulerError::CycleDetected);
    }

    let order = toposort(&graph, None).map_err(|_| SchedulerError::CycleDetected)?;
    Ok(order.into_iter().map(|idx| graph[idx]).collect())
}
