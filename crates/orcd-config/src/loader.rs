use std::path::Path;

use orcd_domain::{HostPlacementSpec, PlacementSpec, ServiceType, Spec, SpecExtra};
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::{RawDriveGroupFilter, RawNfsSpec, RawOsdSpec, RawRgwSpec, RawSpec};

/// Loads every spec document from a YAML file given to `apply -i <yaml>`
/// (§6). The file may hold one document or several separated by `---`, the
/// way a bulk `ceph orch apply -i` dump does.
pub fn load_specs(path: &Path) -> Result<Vec<Spec>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_specs_str(&content, &path.display().to_string())
}

pub fn load_specs_str(content: &str, source_name: &str) -> Result<Vec<Spec>, ConfigError> {
    let mut specs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let raw = RawSpec::deserialize(document).map_err(|e| ConfigError::YamlParse {
            path: source_name.to_string(),
            source: e,
        })?;
        debug!(service_type = %raw.service_type, "parsed spec document from {source_name}");
        specs.push(convert_spec(raw, source_name)?);
    }
    Ok(specs)
}

fn convert_spec(raw: RawSpec, path: &str) -> Result<Spec, ConfigError> {
    let service_type = ServiceType::from_str_loose(&raw.service_type)?;

    let placement = PlacementSpec {
        hosts: raw.placement.hosts.iter().map(|s| HostPlacementSpec::parse(s)).collect(),
        label: raw.placement.label,
        host_pattern: raw.placement.host_pattern,
        count: raw.placement.count,
    };

    let extra = convert_extra(service_type, raw.spec, path)?;

    let spec = Spec {
        service_type,
        service_id: raw.service_id,
        placement,
        unmanaged: raw.unmanaged,
        preview_only: raw.preview_only,
        extra,
        created: None,
    };
    spec.validate().map_err(ConfigError::Domain)?;
    Ok(spec)
}

fn convert_extra(
    service_type: ServiceType,
    raw: Option<serde_yaml::Value>,
    path: &str,
) -> Result<SpecExtra, ConfigError> {
    let value = raw.unwrap_or(serde_yaml::Value::Null);
    match service_type {
        ServiceType::Nfs => {
            let raw: RawNfsSpec = serde_yaml::from_value(value).map_err(|e| ConfigError::Conversion {
                path: path.to_string(),
                message: format!("nfs spec: {e}"),
            })?;
            Ok(SpecExtra::Nfs { pool: raw.pool, namespace: raw.namespace })
        }
        ServiceType::Rgw => {
            let raw: RawRgwSpec = serde_yaml::from_value(value).unwrap_or(RawRgwSpec { realm: None, zone: None });
            Ok(SpecExtra::Rgw { realm: raw.realm, zone: raw.zone })
        }
        ServiceType::Osd => {
            let raw: RawOsdSpec = serde_yaml::from_value(value).unwrap_or_default();
            Ok(SpecExtra::Osd {
                data_devices: raw.data_devices.map(convert_filter),
                db_devices: raw.db_devices.map(convert_filter),
            })
        }
        _ => Ok(SpecExtra::None),
    }
}

fn convert_filter(raw: RawDriveGroupFilter) -> orcd_domain::DriveGroupFilter {
    orcd_domain::DriveGroupFilter {
        model: raw.model,
        rotational: raw.rotational,
        size: raw.size,
        paths: raw.paths,
    }
}
