//! Plugin-based labeling engine for cloud resources.
//!
//! Resources are labeled with their own attributes (name, location, ...)
//! along two paths:
//!
//! 1. **On demand**: a creation event is routed to every on-demand plugin
//!    whose trigger methods match, and the new resource is labeled at once.
//! 2. **Scheduled**: a cron trigger publishes one reconciliation request per
//!    included project and registered plugin; each request then sweeps every
//!    resource of that kind in that project.
//!
//! Label patches are accumulated by a [`batch::BatchExecutor`] and sent in
//! batched calls.

pub mod batch;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod labels;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod server;

pub use batch::{BatchExecutor, BatchStats, DEFAULT_BATCH_THRESHOLD};
pub use config::{LabelerConfig, ProjectFilter, ProjectInclusion};
pub use dispatcher::{Dispatcher, FanOutReport, OnDemandReport, SweepReport};
pub use error::{LabelerError, LabelerResult};
pub use events::{EventNotification, PushEnvelope, ReconciliationRequest};
pub use labels::{AttributeMissing, LabelGenerator, LabelSet};
pub use plugin::{Plugin, PluginDescriptor};
pub use registry::PluginRegistry;
