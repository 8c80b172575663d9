//! Plugin contract.
//!
//! A plugin binds one resource kind to the provider that reaches it, the
//! label extractors that apply to it, the API methods whose events should
//! label it immediately, and whether it takes part in on-demand labeling at
//! all.

use std::sync::Arc;

use labeler_cloud::{Resource, ResourceProvider};
use serde::Serialize;
use tracing::warn;

use crate::batch::BatchExecutor;
use crate::error::{LabelerError, LabelerResult};
use crate::events::EventNotification;
use crate::labels::{LabelGenerator, LabelSet};

/// Pulls the provider key of the affected resource out of an event.
pub type KeyExtractor = fn(&EventNotification) -> Option<String>;

/// Identity and trigger conditions of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    /// Unique plugin name, carried in reconciliation requests.
    pub name: String,
    /// API identifier of the resource kind.
    pub resource_kind: String,
    /// Substrings of API method names that trigger on-demand labeling.
    pub method_names: Vec<String>,
    /// Whether events label this kind immediately. Scheduled-only plugins
    /// are reached by the sweep alone.
    pub on_demand: bool,
}

impl PluginDescriptor {
    /// Create an on-demand descriptor with no trigger methods yet.
    pub fn new(name: impl Into<String>, resource_kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_kind: resource_kind.into(),
            method_names: Vec::new(),
            on_demand: true,
        }
    }

    /// Add trigger method names.
    #[must_use]
    pub fn triggered_by<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.method_names.extend(methods.into_iter().map(Into::into));
        self
    }

    /// Mark the plugin as reachable only through the scheduled sweep.
    #[must_use]
    pub fn scheduled_only(mut self) -> Self {
        self.on_demand = false;
        self
    }

    /// Case-insensitive substring match of any trigger against `api_method`.
    #[must_use]
    pub fn matches_method(&self, api_method: &str) -> bool {
        let api_method = api_method.to_lowercase();
        self.method_names
            .iter()
            .any(|m| !m.is_empty() && api_method.contains(&m.to_lowercase()))
    }

    /// Check the descriptor's own invariants.
    ///
    /// # Errors
    /// Returns [`LabelerError::InvalidPlugin`] for an empty name or kind, or
    /// an on-demand plugin without trigger methods.
    pub fn validate(&self) -> LabelerResult<()> {
        let invalid = |reason: &str| LabelerError::InvalidPlugin {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("plugin name is empty"));
        }
        if self.resource_kind.trim().is_empty() {
            return Err(invalid("resource kind is empty"));
        }
        if self.on_demand && self.method_names.iter().all(|m| m.trim().is_empty()) {
            return Err(invalid("on-demand plugin needs at least one trigger method"));
        }
        Ok(())
    }
}

/// A registered resource-kind handler.
#[derive(Clone)]
pub struct Plugin {
    descriptor: PluginDescriptor,
    provider: Arc<dyn ResourceProvider>,
    labels: LabelGenerator,
    resource_key: KeyExtractor,
}

impl Plugin {
    /// Bind a descriptor to its provider, label table and event key extractor.
    pub fn new(
        descriptor: PluginDescriptor,
        provider: Arc<dyn ResourceProvider>,
        labels: LabelGenerator,
        resource_key: KeyExtractor,
    ) -> Self {
        Self {
            descriptor,
            provider,
            labels,
            resource_key,
        }
    }

    /// Descriptor of this plugin.
    #[must_use]
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Unique plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Whether events may invoke this plugin.
    #[must_use]
    pub fn is_on_demand(&self) -> bool {
        self.descriptor.on_demand
    }

    /// Provider for this plugin's resource kind.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ResourceProvider> {
        &self.provider
    }

    /// Provider key of the resource an event refers to.
    #[must_use]
    pub fn resource_key(&self, event: &EventNotification) -> Option<String> {
        (self.resource_key)(event)
    }

    /// Labels this plugin derives for `resource`.
    #[must_use]
    pub fn labels_for(&self, resource: &Resource) -> LabelSet {
        self.labels.generate(resource)
    }

    /// A new executor bound to this plugin's provider.
    #[must_use]
    pub fn batch_executor(&self, threshold: usize) -> BatchExecutor {
        BatchExecutor::with_threshold(Arc::clone(&self.provider), threshold)
    }

    /// Generate labels for `resource` and enqueue the patch on `batch`.
    ///
    /// Returns `false` when nothing was enqueued: no label could be derived
    /// or the provider could not prepare the patch. Both cases are logged.
    pub async fn label_resource(
        &self,
        batch: &mut BatchExecutor,
        project_id: &str,
        resource: &Resource,
    ) -> bool {
        let labels = self.labels_for(resource);
        if labels.is_empty() {
            warn!(
                plugin = %self.name(),
                project_id = %project_id,
                resource = resource.name().unwrap_or("<unnamed>"),
                "No labels derived, skipping resource"
            );
            return false;
        }

        match self.provider.patch_request(project_id, resource, &labels) {
            Ok(operation) => {
                batch.add_operation(operation).await;
                true
            }
            Err(e) => {
                warn!(
                    plugin = %self.name(),
                    project_id = %project_id,
                    error = %e,
                    "Failed to enqueue label patch"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("descriptor", &self.descriptor)
            .field("labels", &self.labels.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_method_case_insensitive_substring() {
        let descriptor =
            PluginDescriptor::new("Buckets", "storage/Bucket").triggered_by(["storage.buckets.create"]);

        assert!(descriptor.matches_method("storage.buckets.create"));
        assert!(descriptor.matches_method("Storage.Buckets.Create"));
        assert!(descriptor.matches_method("google.storage.buckets.create.v2"));
        assert!(!descriptor.matches_method("storage.buckets.delete"));
    }

    #[test]
    fn test_validate_on_demand_requires_methods() {
        let descriptor = PluginDescriptor::new("Buckets", "storage/Bucket");
        assert!(matches!(
            descriptor.validate(),
            Err(LabelerError::InvalidPlugin { .. })
        ));

        let scheduled = PluginDescriptor::new("Cloudsql", "sql/Instance").scheduled_only();
        assert!(scheduled.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let descriptor = PluginDescriptor::new(" ", "storage/Bucket").triggered_by(["x"]);
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let descriptor = PluginDescriptor::new("Cloudsql", "sql/Instance")
            .triggered_by(["cloudsql.instances.create"])
            .scheduled_only();
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["resourceKind"], "sql/Instance");
        assert_eq!(value["onDemand"], false);
    }
}
