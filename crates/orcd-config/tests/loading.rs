use orcd_config::load_specs_str;
use orcd_domain::{ServiceType, SpecExtra};

#[test]
fn loads_a_single_mgr_spec() {
    let yaml = r#"
service_type: mgr
placement:
  count: 3
"#;
    let specs = load_specs_str(yaml, "inline").expect("should parse");
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].service_type, ServiceType::Mgr);
    assert_eq!(specs[0].placement.count, Some(3));
}

#[test]
fn loads_multiple_documents_separated_by_dashes() {
    let yaml = r#"
service_type: mon
placement:
  count: 5
---
service_type: mgr
placement:
  count: 2
"#;
    let specs = load_specs_str(yaml, "inline").expect("should parse");
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].service_type, ServiceType::Mon);
    assert_eq!(specs[1].service_type, ServiceType::Mgr);
}

#[test]
fn parses_host_placement_with_network_and_name() {
    let yaml = r#"
service_type: mon
service_id: ~
placement:
  hosts:
    - "host1:10.0.0.0/24=mon-a"
    - "host2"
"#;
    let specs = load_specs_str(yaml, "inline").expect("should parse");
    let hosts = &specs[0].placement.hosts;
    assert_eq!(hosts.len(), 2);
    assert_eq!(hosts[0].hostname, "host1");
    assert_eq!(hosts[0].network.as_deref(), Some("10.0.0.0/24"));
    assert_eq!(hosts[0].name.as_deref(), Some("mon-a"));
    assert_eq!(hosts[1].hostname, "host2");
}

#[test]
fn nfs_spec_requires_service_id_and_pool() {
    let yaml = r#"
service_type: nfs
service_id: mynfs
spec:
  pool: .nfs
  namespace: mynfs
"#;
    let specs = load_specs_str(yaml, "inline").expect("should parse");
    match &specs[0].extra {
        SpecExtra::Nfs { pool, namespace } => {
            assert_eq!(pool, ".nfs");
            assert_eq!(namespace.as_deref(), Some("mynfs"));
        }
        other => panic!("expected Nfs extra, got {other:?}"),
    }
}

#[test]
fn nfs_without_service_id_is_rejected() {
    let yaml = r#"
service_type: nfs
spec:
  pool: .nfs
"#;
    assert!(load_specs_str(yaml, "inline").is_err());
}

#[test]
fn osd_spec_carries_drive_group_filters() {
    let yaml = r#"
service_type: osd
service_id: default_drive_group
spec:
  data_devices:
    rotational: true
  db_devices:
    model: "Micron"
"#;
    let specs = load_specs_str(yaml, "inline").expect("should parse");
    match &specs[0].extra {
        SpecExtra::Osd { data_devices, db_devices } => {
            assert_eq!(data_devices.as_ref().unwrap().rotational, Some(true));
            assert_eq!(db_devices.as_ref().unwrap().model.as_deref(), Some("Micron"));
        }
        other => panic!("expected Osd extra, got {other:?}"),
    }
}

#[test]
fn unknown_service_type_is_a_conversion_error() {
    let yaml = "service_type: not-a-real-type\n";
    let err = load_specs_str(yaml, "inline").unwrap_err();
    assert!(err.to_string().contains("domain error") || err.to_string().contains("UnknownServiceType"));
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let yaml = "service_type: [this is not a scalar\n";
    assert!(load_specs_str(yaml, "inline").is_err());
}
