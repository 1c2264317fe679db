use std::collections::HashSet;

use orcd_domain::{DomainError, Host, ServiceType};
use rand::Rng;

/// Allocates a unique daemon id for a new instance of `service_type` on
/// `host` (§4.10). `existing_ids` is the set of daemon ids already in use
/// cluster-wide for this `service_type` (collisions are regenerated for
/// suffixed types, rejected for non-suffixed ones).
pub fn allocate_daemon_id(
    service_type: ServiceType,
    host: &Host,
    prefix: Option<&str>,
    forcename: Option<&str>,
    existing_ids: &HashSet<String>,
) -> Result<String, DomainError> {
    if let Some(name) = forcename {
        if existing_ids.contains(name) {
            return Err(DomainError::InvalidServiceId(format!("forced name '{name}' is already in use")));
        }
        return Ok(name.to_string());
    }

    let short_host = host.short_name();

    if !service_type.is_suffixed() {
        if existing_ids.contains(short_host) {
            return Err(DomainError::InvalidServiceId(format!(
                "non-suffixed daemon id '{short_host}' collides with an existing daemon"
            )));
        }
        return Ok(short_host.to_string());
    }

    for _ in 0..32 {
        let suffix = random_lowercase_suffix();
        let candidate = match prefix {
            Some(p) => format!("{p}.{short_host}.{suffix}"),
            None => format!("{short_host}.{suffix}"),
        };
        if !existing_ids.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(DomainError::InvalidServiceId("exhausted id allocation retries".to_string()))
}

fn random_lowercase_suffix() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..6).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}
