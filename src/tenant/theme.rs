//! Hand-off point between the session layer and the theming collaborator.

use crate::models::TenantConfig;

pub trait ThemeApplier: Send + Sync {
    /// Called at login with the tenant's branding.
    fn apply(&self, config: &TenantConfig);
    /// Called at logout.
    fn clear(&self);
}

/// Default applier for headless use: records the hand-off in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTheme;

impl ThemeApplier for LoggingTheme {
    fn apply(&self, config: &TenantConfig) {
        tracing::info!(
            tenant_id = %config.id,
            tenant = %config.name,
            primary_color = ?config.theme.primary_color,
            "Applied tenant theme"
        );
    }

    fn clear(&self) {
        tracing::debug!("Cleared tenant theme");
    }
}
