//! Dispatcher: the on-demand path and the two scheduled phases.
//!
//! Every operation is one independent unit of work with its own
//! [`BatchExecutor`]. The registry is the only state shared between units,
//! and it is read-only. Failures are contained at the narrowest scope: a
//! provider error skips one plugin (on demand) or ends one sweep, a publish
//! error skips one request.

use std::sync::Arc;

use labeler_cloud::{MessageBus, ProjectSource};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::batch::{BatchStats, DEFAULT_BATCH_THRESHOLD};
use crate::config::ProjectFilter;
use crate::error::{LabelerError, LabelerResult};
use crate::events::{EventNotification, ReconciliationRequest};
use crate::plugin::Plugin;
use crate::registry::PluginRegistry;

/// Outcome of one event notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnDemandReport {
    pub project_id: String,
    /// The project is excluded, nothing was touched.
    pub excluded: bool,
    /// On-demand plugins whose triggers matched the method name.
    pub matched_plugins: Vec<String>,
    /// Resources enqueued for labeling.
    pub labeled: usize,
    /// Matched plugins that could not resolve or label their resource.
    pub skipped: usize,
    /// Patches the API rejected.
    pub failed: usize,
    pub flushes: usize,
}

/// Outcome of the fan-out phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutReport {
    /// Projects visible to the project source.
    pub projects: usize,
    /// Projects dropped by the inclusion predicate.
    pub excluded: usize,
    /// Reconciliation requests published.
    pub published: usize,
    /// Requests whose publish failed.
    pub failed: usize,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub project_id: String,
    pub plugin_name: String,
    /// The project is excluded, nothing was listed.
    pub excluded: bool,
    /// Pages listed successfully.
    pub pages: usize,
    /// Resources enqueued for labeling.
    pub labeled: usize,
    /// Resources without derivable labels or patch.
    pub skipped: usize,
    /// Patches the API rejected.
    pub failed: usize,
    pub flushes: usize,
    /// A page failed and the remaining pages were not visited.
    pub aborted: bool,
}

/// Routes events and reconciliation requests to plugins.
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
    filter: Arc<dyn ProjectFilter>,
    projects: Arc<dyn ProjectSource>,
    bus: Arc<dyn MessageBus>,
    topic: String,
    batch_threshold: usize,
}

impl Dispatcher {
    /// Create a dispatcher publishing reconciliation requests to `topic`.
    pub fn new(
        registry: Arc<PluginRegistry>,
        filter: Arc<dyn ProjectFilter>,
        projects: Arc<dyn ProjectSource>,
        bus: Arc<dyn MessageBus>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            filter,
            projects,
            bus,
            topic: topic.into(),
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
        }
    }

    /// Override the auto-flush threshold of every session.
    #[must_use]
    pub fn with_batch_threshold(mut self, threshold: usize) -> Self {
        self.batch_threshold = threshold;
        self
    }

    /// Shared plugin registry.
    #[must_use]
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Label the resource an event refers to, through every matching
    /// on-demand plugin.
    pub async fn label_one(&self, event: &EventNotification) -> OnDemandReport {
        let mut report = OnDemandReport {
            project_id: event.project_id.clone(),
            ..Default::default()
        };

        if !self.filter.is_included(&event.project_id) {
            info!(
                project_id = %event.project_id,
                method = %event.api_method_name,
                "Project excluded, ignoring event"
            );
            report.excluded = true;
            return report;
        }

        let matched: Vec<&Plugin> = self
            .registry
            .on_demand()
            .filter(|p| p.descriptor().matches_method(&event.api_method_name))
            .collect();

        if matched.is_empty() {
            debug!(method = %event.api_method_name, "No plugin handles this method");
            return report;
        }

        for plugin in matched {
            report.matched_plugins.push(plugin.name().to_string());
            if let Err(e) = self.label_with(plugin, event, &mut report).await {
                error!(plugin = %plugin.name(), error = %e, "On-demand labeling refused");
                report.skipped += 1;
            }
        }

        info!(
            project_id = %event.project_id,
            method = %event.api_method_name,
            plugins = ?report.matched_plugins,
            labeled = report.labeled,
            skipped = report.skipped,
            "Handled creation event"
        );
        report
    }

    async fn label_with(
        &self,
        plugin: &Plugin,
        event: &EventNotification,
        report: &mut OnDemandReport,
    ) -> LabelerResult<()> {
        if !plugin.is_on_demand() {
            return Err(LabelerError::InvalidPlugin {
                name: plugin.name().to_string(),
                reason: "scheduled-only plugin invoked on demand".to_string(),
            });
        }

        let Some(key) = plugin.resource_key(event) else {
            warn!(
                plugin = %plugin.name(),
                project_id = %event.project_id,
                "Event does not identify a resource"
            );
            report.skipped += 1;
            return Ok(());
        };

        let resource = match plugin.provider().get(&event.project_id, &key).await {
            Ok(resource) => resource,
            Err(e) if e.is_not_found() => {
                warn!(plugin = %plugin.name(), project_id = %event.project_id, resource = %key, "Resource not found");
                report.skipped += 1;
                return Ok(());
            }
            Err(e) => {
                error!(
                    plugin = %plugin.name(),
                    project_id = %event.project_id,
                    resource = %key,
                    error = %e,
                    "Failed to fetch resource"
                );
                report.skipped += 1;
                return Ok(());
            }
        };

        let mut batch = plugin.batch_executor(self.batch_threshold);
        if plugin
            .label_resource(&mut batch, &event.project_id, &resource)
            .await
        {
            report.labeled += 1;
        } else {
            report.skipped += 1;
        }
        batch.flush().await;

        let stats = batch.stats();
        report.failed += stats.failed;
        report.flushes += stats.flushes;
        Ok(())
    }

    /// Publish one reconciliation request per included project and
    /// registered plugin.
    ///
    /// # Errors
    /// Fails only if projects cannot be enumerated. Individual publish
    /// failures are logged and counted.
    pub async fn schedule(&self) -> LabelerResult<FanOutReport> {
        let projects = self.projects.list_projects().await?;
        let mut report = FanOutReport {
            projects: projects.len(),
            ..Default::default()
        };

        for project_id in &projects {
            if !self.filter.is_included(project_id) {
                debug!(project_id = %project_id, "Project excluded from fan-out");
                report.excluded += 1;
                continue;
            }

            for plugin in self.registry.all() {
                let request = ReconciliationRequest::new(project_id.as_str(), plugin.name());
                match self.publish(&request).await {
                    Ok(message_id) => {
                        debug!(
                            project_id = %project_id,
                            plugin = %plugin.name(),
                            message_id = %message_id,
                            "Published reconciliation request"
                        );
                        report.published += 1;
                    }
                    Err(e) => {
                        error!(
                            project_id = %project_id,
                            plugin = %plugin.name(),
                            error = %e,
                            "Failed to publish reconciliation request"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            topic = %self.topic,
            projects = report.projects,
            excluded = report.excluded,
            published = report.published,
            failed = report.failed,
            "Fan-out complete"
        );
        Ok(report)
    }

    async fn publish(&self, request: &ReconciliationRequest) -> LabelerResult<String> {
        let data = request.to_bytes()?;
        Ok(self.bus.publish(&self.topic, &data).await?)
    }

    /// Label every resource of one plugin in one project.
    ///
    /// # Errors
    /// Returns [`LabelerError::PluginNotFound`] for unregistered plugin
    /// names, before any resource is accessed. Provider failures end the
    /// sweep early but still produce a report.
    pub async fn do_label(&self, request: &ReconciliationRequest) -> LabelerResult<SweepReport> {
        let plugin = self.registry.lookup_by_name(&request.plugin_name)?;
        let project_id = request.project_id.as_str();
        let mut report = SweepReport {
            project_id: project_id.to_string(),
            plugin_name: plugin.name().to_string(),
            ..Default::default()
        };

        if !self.filter.is_included(project_id) {
            info!(project_id = %project_id, plugin = %plugin.name(), "Project excluded, skipping sweep");
            report.excluded = true;
            return Ok(report);
        }

        let mut batch = plugin.batch_executor(self.batch_threshold);
        let mut page_token: Option<String> = None;

        loop {
            let page = match plugin.provider().list(project_id, page_token.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    error!(
                        project_id = %project_id,
                        plugin = %plugin.name(),
                        page = report.pages + 1,
                        error = %e,
                        "Failed to list resources, ending sweep"
                    );
                    report.aborted = true;
                    break;
                }
            };
            report.pages += 1;

            for resource in &page.items {
                if plugin.label_resource(&mut batch, project_id, resource).await {
                    report.labeled += 1;
                } else {
                    report.skipped += 1;
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        batch.flush().await;
        let BatchStats { failed, flushes, .. } = batch.stats();
        report.failed = failed;
        report.flushes = flushes;

        info!(
            project_id = %project_id,
            plugin = %plugin.name(),
            pages = report.pages,
            labeled = report.labeled,
            skipped = report.skipped,
            failed = report.failed,
            aborted = report.aborted,
            "Sweep complete"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("topic", &self.topic)
            .field("batch_threshold", &self.batch_threshold)
            .finish_non_exhaustive()
    }
}
