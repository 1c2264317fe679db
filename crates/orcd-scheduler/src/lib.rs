mod error;
mod schedule;
mod deps;

pub use error::SchedulerError;
pub use schedule::{schedule, HostAssignment, HostFilter, NoFilter};
pub use deps::{deps_for, topo_order};
