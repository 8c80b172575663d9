//! Plugin registry.
//!
//! Built once during startup and then shared read-only (behind an `Arc`)
//! with every handler. Enumeration order is registration order.

use tracing::info;

use crate::error::{LabelerError, LabelerResult};
use crate::plugin::{Plugin, PluginDescriptor};

/// Table of every known plugin.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
}

impl PluginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin.
    ///
    /// # Errors
    /// Returns [`LabelerError::DuplicatePlugin`] if the name or resource kind
    /// is already registered, or [`LabelerError::InvalidPlugin`] if the
    /// descriptor is invalid. Either should abort startup.
    pub fn register(&mut self, plugin: Plugin) -> LabelerResult<()> {
        let descriptor = plugin.descriptor();
        descriptor.validate()?;

        if self.plugins.iter().any(|p| p.name() == descriptor.name) {
            return Err(LabelerError::DuplicatePlugin(format!(
                "name '{}' already registered",
                descriptor.name
            )));
        }
        if let Some(existing) = self
            .plugins
            .iter()
            .find(|p| p.descriptor().resource_kind == descriptor.resource_kind)
        {
            return Err(LabelerError::DuplicatePlugin(format!(
                "resource kind '{}' already handled by '{}'",
                descriptor.resource_kind,
                existing.name()
            )));
        }

        info!(
            plugin = %descriptor.name,
            kind = %descriptor.resource_kind,
            on_demand = descriptor.on_demand,
            "Registered plugin"
        );
        self.plugins.push(plugin);
        Ok(())
    }

    /// Every plugin, in registration order.
    #[must_use]
    pub fn all(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Every descriptor, in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.plugins.iter().map(Plugin::descriptor)
    }

    /// Plugins that events may invoke.
    pub fn on_demand(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter().filter(|p| p.is_on_demand())
    }

    /// Find a plugin by name.
    ///
    /// # Errors
    /// Returns [`LabelerError::PluginNotFound`] for unknown names. Callers
    /// should treat this as a bad request, not a transient failure.
    pub fn lookup_by_name(&self, name: &str) -> LabelerResult<&Plugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| LabelerError::PluginNotFound(name.to_string()))
    }

    /// Number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugin is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
