use serde::{Deserialize, Serialize};

/// Raw YAML representation of one spec document (§6 spec YAML schema).
/// `hosts` carries `hostname[:network][=name]` strings as written by hand,
/// unlike the domain's already-parsed [`orcd_domain::HostPlacementSpec`].
#[derive(Debug, Deserialize, Serialize)]
pub struct RawSpec {
    pub service_type: String,
    pub service_id: Option<String>,
    #[serde(default)]
    pub unmanaged: bool,
    #[serde(default)]
    pub preview_only: bool,
    #[serde(default)]
    pub placement: RawPlacement,
    /// Type-specific object, shape depends on `service_type` (nfs/rgw/osd).
    pub spec: Option<serde_yaml::Value>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawPlacement {
    pub count: Option<i64>,
    #[serde(default)]
    pub hosts: Vec<String>,
    pub label: Option<String>,
    pub host_pattern: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawNfsSpec {
    pub pool: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawRgwSpec {
    pub realm: Option<String>,
    pub zone: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawDriveGroupFilter {
    pub model: Option<String>,
    pub rotational: Option<bool>,
    pub size: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawOsdSpec {
    pub data_devices: Option<RawDriveGroupFilter>,
    pub db_devices: Option<RawDriveGroupFilter>,
}
