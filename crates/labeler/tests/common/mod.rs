//! In-memory fakes of the cloud capabilities.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use labeler::config::ProjectInclusion;
use labeler::dispatcher::Dispatcher;
use labeler::events::EventNotification;
use labeler::labels::{extract, LabelGenerator};
use labeler::plugin::{Plugin, PluginDescriptor};
use labeler::registry::PluginRegistry;
use labeler_cloud::{
    BatchResult, CloudProviderError, Labels, MessageBus, PatchOperation, PendingPatch,
    ProjectSource, Resource, ResourcePage, ResourceProvider,
};
use serde_json::{json, Value};

// =============================================================================
// Resource provider
// =============================================================================

/// Provider serving canned resources and pages and recording every batch.
pub struct FakeProvider {
    kind: String,
    resources: HashMap<String, Value>,
    /// `None` entries fail when listed.
    pages: Vec<Option<Vec<Value>>>,
    fail_get: bool,
    pub gets: AtomicUsize,
    pub lists: AtomicUsize,
    pub batches: Mutex<Vec<Vec<PendingPatch>>>,
}

impl FakeProvider {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            resources: HashMap::new(),
            pages: Vec::new(),
            fail_get: false,
            gets: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn with_resource(mut self, key: &str, value: Value) -> Self {
        self.resources.insert(key.to_string(), value);
        self
    }

    pub fn with_page(mut self, items: Vec<Value>) -> Self {
        self.pages.push(Some(items));
        self
    }

    pub fn with_failing_page(mut self) -> Self {
        self.pages.push(None);
        self
    }

    pub fn failing_get(mut self) -> Self {
        self.fail_get = true;
        self
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Resource keys of every patch, batch by batch.
    pub fn patched_keys(&self) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|batch| batch.iter().map(|p| p.operation.resource_key.clone()).collect())
            .collect()
    }
}

#[async_trait]
impl ResourceProvider for FakeProvider {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn get(&self, _project_id: &str, key: &str) -> Result<Resource, CloudProviderError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get {
            return Err(CloudProviderError::Api {
                status: 500,
                message: "backend error".to_string(),
            });
        }
        self.resources
            .get(key)
            .cloned()
            .map(Resource::new)
            .ok_or_else(|| CloudProviderError::NotFound(key.to_string()))
    }

    async fn list(
        &self,
        _project_id: &str,
        page_token: Option<&str>,
    ) -> Result<ResourcePage, CloudProviderError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let index = page_token
            .and_then(|t| t.strip_prefix("page-"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);

        let Some(page) = self.pages.get(index) else {
            return Ok(ResourcePage::default());
        };
        let Some(items) = page else {
            return Err(CloudProviderError::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        };

        let next_page_token = (index + 1 < self.pages.len()).then(|| format!("page-{}", index + 1));
        Ok(ResourcePage {
            items: items.iter().cloned().map(Resource::new).collect(),
            next_page_token,
        })
    }

    fn patch_request(
        &self,
        project_id: &str,
        resource: &Resource,
        labels: &Labels,
    ) -> Result<PatchOperation, CloudProviderError> {
        let name = resource
            .name()
            .ok_or_else(|| CloudProviderError::InvalidResource("no name".to_string()))?;
        Ok(PatchOperation {
            project_id: project_id.to_string(),
            resource_key: name.to_string(),
            body: json!({ "labels": labels }),
        })
    }

    async fn execute_batch(&self, batch: &[PendingPatch]) -> Result<BatchResult, CloudProviderError> {
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(BatchResult {
            succeeded: batch.len(),
            failed: vec![],
        })
    }
}

// =============================================================================
// Message bus and project source
// =============================================================================

/// Bus recording every published message, optionally failing for one project.
#[derive(Default)]
pub struct FakeBus {
    pub published: Mutex<Vec<(String, Value)>>,
    pub fail_project: Option<String>,
}

impl FakeBus {
    /// `(projectId, pluginName)` of every published request.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, data)| {
                (
                    data["projectId"].as_str().unwrap().to_string(),
                    data["pluginName"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl MessageBus for FakeBus {
    async fn publish(&self, topic: &str, data: &[u8]) -> Result<String, CloudProviderError> {
        let value: Value = serde_json::from_slice(data)?;
        if self.fail_project.as_deref() == value["projectId"].as_str() {
            return Err(CloudProviderError::Api {
                status: 500,
                message: "publish failed".to_string(),
            });
        }
        let mut published = self.published.lock().unwrap();
        published.push((topic.to_string(), value));
        Ok(published.len().to_string())
    }
}

/// Fixed list of projects.
pub struct FakeProjects(pub Vec<String>);

impl FakeProjects {
    pub fn of(ids: &[&str]) -> Self {
        Self(ids.iter().map(ToString::to_string).collect())
    }
}

#[async_trait]
impl ProjectSource for FakeProjects {
    async fn list_projects(&self) -> Result<Vec<String>, CloudProviderError> {
        Ok(self.0.clone())
    }
}

// =============================================================================
// Builders
// =============================================================================

/// On-demand plugin keyed by `bucket_name`, labeling `name` only.
pub fn other_plugin(name: &str, provider: Arc<FakeProvider>, methods: &[&str]) -> Plugin {
    Plugin::new(
        PluginDescriptor::new(name, provider.kind()).triggered_by(methods.iter().copied()),
        provider,
        LabelGenerator::new().with_extractor("name", extract::name),
        |event: &EventNotification| event.field("bucket_name").map(str::to_string),
    )
}

pub fn registry(plugins: Vec<Plugin>) -> Arc<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    for plugin in plugins {
        registry.register(plugin).unwrap();
    }
    Arc::new(registry)
}

pub fn dispatcher(
    registry: Arc<PluginRegistry>,
    excluded: &[&str],
    projects: FakeProjects,
    bus: Arc<FakeBus>,
) -> Dispatcher {
    let inclusion =
        ProjectInclusion::new(Vec::<String>::new(), excluded.iter().map(ToString::to_string));
    Dispatcher::new(
        registry,
        Arc::new(inclusion),
        Arc::new(projects),
        bus,
        "request_full_labeling",
    )
}
