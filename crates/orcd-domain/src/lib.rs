pub mod error;
pub mod types;

pub use error::{DomainError, OrchError};
pub use types::{
    DaemonDescription, DaemonName, DaemonStatus, DriveGroupFilter, Host, HostPlacementSpec,
    HostStatus, PlacementSpec, ServiceName, ServiceType, Spec, SpecExtra, validate_id,
};
