use orcd_domain::{DaemonDescription, Host, Spec};
use orcd_store::DeviceInfo;

pub fn render_hosts(hosts: &[Host]) -> String {
    if hosts.is_empty() {
        return "No hosts in inventory.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!("{:<24} {:<16} {:<10} LABELS\n", "HOST", "ADDR", "STATUS"));
    for host in hosts {
        let labels: Vec<&str> = host.labels.iter().map(|s| s.as_str()).collect();
        out.push_str(&format!(
            "{:<24} {:<16} {:<10} {}\n",
            host.hostname,
            host.address,
            format!("{:?}", host.status).to_lowercase(),
            labels.join(",")
        ));
    }
    out
}

pub fn render_specs(specs: &[Spec]) -> String {
    if specs.is_empty() {
        return "No specs.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!("{:<28} {:<10} PLACEMENT\n", "SERVICE", "MANAGED"));
    for spec in specs {
        let placement = &spec.placement;
        let placement_desc = if let Some(count) = placement.count {
            format!("count:{count}")
        } else if let Some(pattern) = &placement.host_pattern {
            format!("host_pattern:{pattern}")
        } else if let Some(label) = &placement.label {
            format!("label:{label}")
        } else if !placement.hosts.is_empty() {
            format!("hosts:{}", placement.hosts.len())
        } else {
            "default".to_string()
        };
        out.push_str(&format!(
            "{:<28} {:<10} {}\n",
            spec.service_name(),
            if spec.unmanaged { "no" } else { "yes" },
            placement_desc
        ));
    }
    out
}

pub fn render_devices(devices: &[(String, DeviceInfo)]) -> String {
    if devices.is_empty() {
        return "No devices.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!("{:<20} {:<24} {:<10} {:<12} SIZE\n", "HOST", "PATH", "AVAILABLE", "ROTATIONAL"));
    for (hostname, device) in devices {
        out.push_str(&format!(
            "{:<20} {:<24} {:<10} {:<12} {}\n",
            hostname,
            device.path,
            device.available,
            device.rotational.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
            device.sys_api_size.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
        ));
    }
    out
}

pub fn render_daemons(daemons: &[(String, DaemonDescription)]) -> String {
    if daemons.is_empty() {
        return "No daemons.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!("{:<28} {:<20} {:<10} IMAGE\n", "NAME", "HOST", "STATUS"));
    for (hostname, daemon) in daemons {
        out.push_str(&format!(
            "{:<28} {:<20} {:<10} {}\n",
            daemon.name(),
            hostname,
            format!("{:?}", daemon.status).to_lowercase(),
            daemon.container_image_name.as_deref().unwrap_or("-"),
        ));
    }
    out
}
