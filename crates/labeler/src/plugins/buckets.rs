//! Cloud Storage buckets.
//!
//! Labeled on demand: a bucket is fully readable as soon as its creation
//! event is emitted.

use std::sync::Arc;

use labeler_cloud::ResourceProvider;

use crate::events::EventNotification;
use crate::labels::{extract, LabelGenerator};
use crate::plugin::{Plugin, PluginDescriptor};

/// Plugin name carried in reconciliation requests.
pub const NAME: &str = "Buckets";

/// Audit log method that creates a bucket.
pub const CREATE_METHOD: &str = "storage.buckets.create";

/// Build the plugin around a bucket provider.
pub fn plugin(provider: Arc<dyn ResourceProvider>, label_prefix: Option<&str>) -> Plugin {
    let descriptor = PluginDescriptor::new(NAME, provider.kind()).triggered_by([CREATE_METHOD]);
    let labels = LabelGenerator::new()
        .with_extractor("name", extract::name)
        .with_extractor("location", extract::location)
        .with_prefix(label_prefix);

    Plugin::new(descriptor, provider, labels, bucket_name)
}

fn bucket_name(event: &EventNotification) -> Option<String> {
    event.field("bucket_name").map(str::to_string)
}
