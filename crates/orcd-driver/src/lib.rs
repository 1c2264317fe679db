pub mod agent;
pub mod cluster;
pub mod driver;
pub mod error;
pub mod executor;
pub mod registry;

pub use agent::{AgentCommand, AgentResponse, CephVolumeInventoryEntry, CephVolumeSysApi, DeployPayload, LsEntry};
pub use cluster::{ClusterClient, FakeClusterClient};
pub use driver::{GenericDriver, IscsiDriver, MdsDriver, MonitoringDriver, NfsDriver, OsdDriver, RgwDriver, ServiceDriver};
pub use error::DriverError;
pub use executor::{Executor, HostAddressBook, SshExecutor};
pub use registry::DriverRegistry;
