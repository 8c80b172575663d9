//! Plugins shipped with the labeler.

pub mod buckets;
pub mod cloudsql;

use std::sync::Arc;

use labeler_cloud::gcp::{CloudSqlInstances, GcpClient, StorageBuckets};
use labeler_cloud::ResourceProvider;
use tracing::{info, warn};

use crate::config::LabelerConfig;
use crate::error::LabelerResult;
use crate::plugin::Plugin;
use crate::registry::PluginRegistry;

/// Build the registry of built-in plugins against Google Cloud.
///
/// # Errors
/// Returns an error if a plugin fails registration.
pub fn builtin(client: &GcpClient, config: &LabelerConfig) -> LabelerResult<PluginRegistry> {
    let storage: Arc<dyn ResourceProvider> = Arc::new(StorageBuckets::new(client.clone()));
    let sql: Arc<dyn ResourceProvider> = Arc::new(CloudSqlInstances::new(client.clone()));
    let prefix = config.label_prefix();

    registry_from(
        [buckets::plugin(storage, prefix), cloudsql::plugin(sql, prefix)],
        config,
    )
}

/// Register every plugin the configuration's allow-list admits.
///
/// # Errors
/// Returns an error if a plugin fails registration.
pub fn registry_from(
    plugins: impl IntoIterator<Item = Plugin>,
    config: &LabelerConfig,
) -> LabelerResult<PluginRegistry> {
    let mut registry = PluginRegistry::new();

    for plugin in plugins {
        if config.plugin_enabled(plugin.name()) {
            registry.register(plugin)?;
        } else {
            info!(plugin = %plugin.name(), "Plugin disabled by configuration");
        }
    }

    for name in &config.plugins {
        if registry.lookup_by_name(name).is_err() {
            warn!(plugin = %name, "Configured plugin is unknown");
        }
    }

    Ok(registry)
}
