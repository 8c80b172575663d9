//! Cloud SQL instances.
//!
//! Scheduled only. An instance is still being provisioned when its creation
//! event fires and rejects label patches until it is ready, so instances are
//! picked up by the next sweep instead.

use std::sync::Arc;

use labeler_cloud::ResourceProvider;

use crate::events::EventNotification;
use crate::labels::{extract, LabelGenerator};
use crate::plugin::{Plugin, PluginDescriptor};

/// Plugin name carried in reconciliation requests.
pub const NAME: &str = "Cloudsql";

/// Audit log method that creates an instance.
pub const CREATE_METHOD: &str = "cloudsql.instances.create";

/// Build the plugin around an instance provider.
pub fn plugin(provider: Arc<dyn ResourceProvider>, label_prefix: Option<&str>) -> Plugin {
    let descriptor = PluginDescriptor::new(NAME, provider.kind())
        .triggered_by([CREATE_METHOD])
        .scheduled_only();
    let labels = LabelGenerator::new()
        .with_extractor("name", extract::name)
        .with_extractor("location", extract::region)
        .with_prefix(label_prefix);

    Plugin::new(descriptor, provider, labels, instance_name)
}

// `database_id` is `<project>:<instance>`.
fn instance_name(event: &EventNotification) -> Option<String> {
    let database_id = event.field("database_id")?;
    let instance = database_id
        .split_once(':')
        .map_or(database_id, |(_, instance)| instance);
    (!instance.is_empty()).then(|| instance.to_string())
}
