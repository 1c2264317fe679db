use orcd_store::{ConfigStore, HealthCheck, Severity};

use crate::error::ReconcileError;

pub const PAUSED: &str = "PAUSED";
pub const STRAY_HOST: &str = "STRAY_HOST";
pub const STRAY_DAEMON: &str = "STRAY_DAEMON";
pub const HOST_CHECK_FAILED: &str = "HOST_CHECK_FAILED";
pub const REFRESH_FAILED: &str = "REFRESH_FAILED";

pub fn upgrade_check_name(suffix: &str) -> String {
    format!("UPGRADE_{suffix}")
}

/// Publishes or clears a named health check depending on whether `detail`
/// is empty, keeping callers from having to branch themselves (§4.15:
/// publishing is idempotent, absence removes the check).
pub async fn set_check(
    store: &dyn ConfigStore,
    name: &str,
    severity: Severity,
    summary: impl Into<String>,
    detail: Vec<String>,
) -> Result<(), ReconcileError> {
    let mut checks = store.get_health_checks().await?;
    if detail.is_empty() {
        checks.clear(name);
    } else {
        checks.publish(
            name,
            HealthCheck { severity, summary: summary.into(), count: detail.len(), detail },
        );
    }
    store.put_health_checks(checks).await?;
    Ok(())
}

pub async fn clear(store: &dyn ConfigStore, name: &str) -> Result<(), ReconcileError> {
    let mut checks = store.get_health_checks().await?;
    checks.clear(name);
    store.put_health_checks(checks).await?;
    Ok(())
}

/// `_update_paused_health()` (§4.8 stage 3).
pub async fn update_paused_health(store: &dyn ConfigStore) -> Result<(), ReconcileError> {
    if store.get_paused().await? {
        set_check(store, PAUSED, Severity::Warning, "cluster orchestration is paused", vec!["orcd resume to continue".to_string()]).await
    } else {
        clear(store, PAUSED).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcd_store::InMemoryStore;

    #[tokio::test]
    async fn set_check_with_empty_detail_clears_it() {
        let store = InMemoryStore::new();
        set_check(&store, STRAY_HOST, Severity::Warning, "stray", vec!["h1".to_string()]).await.unwrap();
        let checks = store.get_health_checks().await.unwrap();
        assert!(checks.0.contains_key(STRAY_HOST));

        set_check(&store, STRAY_HOST, Severity::Warning, "stray", vec![]).await.unwrap();
        let checks = store.get_health_checks().await.unwrap();
        assert!(!checks.0.contains_key(STRAY_HOST));
    }

    #[tokio::test]
    async fn paused_flag_publishes_and_clears() {
        let store = InMemoryStore::new();
        store.set_paused(true).await.unwrap();
        update_paused_health(&store).await.unwrap();
        assert!(store.get_health_checks().await.unwrap().0.contains_key(PAUSED));

        store.set_paused(false).await.unwrap();
        update_paused_health(&store).await.unwrap();
        assert!(!store.get_health_checks().await.unwrap().0.contains_key(PAUSED));
    }
}
