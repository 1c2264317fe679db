use std::collections::HashMap;
use std::sync::Arc;

use orcd_domain::ServiceType;

use crate::driver::{GenericDriver, IscsiDriver, MdsDriver, MonitoringDriver, NfsDriver, OsdDriver, RgwDriver, ServiceDriver};
use crate::error::DriverError;

/// Dispatches to the right [`ServiceDriver`] by `service_type` (§4.16).
pub struct DriverRegistry {
    drivers: HashMap<ServiceType, Arc<dyn ServiceDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        DriverRegistry { drivers: HashMap::new() }
    }

    pub fn register(&mut self, driver: Arc<dyn ServiceDriver>) -> &mut Self {
        self.drivers.insert(driver.service_type(), driver);
        self
    }

    pub fn for_type(&self, service_type: ServiceType) -> Result<Arc<dyn ServiceDriver>, DriverError> {
        self.drivers
            .get(&service_type)
            .cloned()
            .ok_or_else(|| DriverError::NoDriver(service_type.to_string()))
    }

    /// Build a registry with the standard roster for all thirteen types
    /// (§4.16): generic defaults for the types that need nothing special,
    /// specialized drivers for the rest.
    pub fn with_defaults() -> Self {
        let mut registry = DriverRegistry::new();
        for simple in [ServiceType::Mon, ServiceType::Mgr, ServiceType::Crash, ServiceType::RbdMirror] {
            registry.register(Arc::new(GenericDriver { service_type: simple }));
        }
        registry.register(Arc::new(MdsDriver));
        registry.register(Arc::new(RgwDriver));
        registry.register(Arc::new(NfsDriver));
        registry.register(Arc::new(IscsiDriver));
        registry.register(Arc::new(OsdDriver));
        for monitored in [
            ServiceType::Grafana,
            ServiceType::Prometheus,
            ServiceType::Alertmanager,
            ServiceType::NodeExporter,
        ] {
            registry.register(Arc::new(MonitoringDriver { service_type: monitored }));
        }
        registry
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        DriverRegistry::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_defaults_covers_all_thirteen_types() {
        let registry = DriverRegistry::with_defaults();
        for &t in ServiceType::ALL {
            assert!(registry.for_type(t).is_ok(), "missing driver for {t}");
        }
    }
}
