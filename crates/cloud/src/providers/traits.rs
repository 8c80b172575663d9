//! Capability traits and common types shared by every cloud backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during cloud provider operations.
#[derive(Error, Debug)]
pub enum CloudProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A resource returned by the API lacks a field needed to address it.
    #[error("Invalid resource: {0}")]
    InvalidResource(String),
}

impl CloudProviderError {
    /// Whether this error means the addressed resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// HTTP status this error corresponds to, or 0 when no response was
    /// received.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Api { status, .. } => *status,
            Self::NotFound(_) => 404,
            Self::Auth(_) => 403,
            _ => 0,
        }
    }
}

/// Label key to label value mapping attached to a resource.
///
/// Ordered so that the serialized request body is stable across runs.
pub type Labels = BTreeMap<String, String>;

/// An opaque resource record as returned by a cloud API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(Value);

impl Resource {
    /// Wrap a raw JSON record.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Top-level string attribute, if present.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// String attribute addressed by a JSON pointer (e.g. `/settings/tier`).
    #[must_use]
    pub fn str_at(&self, pointer: &str) -> Option<&str> {
        self.0.pointer(pointer).and_then(Value::as_str)
    }

    /// The `name` attribute most APIs use as the resource identity.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    /// Borrow the underlying JSON.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for Resource {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Default)]
pub struct ResourcePage {
    /// Resources on this page, in API order.
    pub items: Vec<Resource>,
    /// Token for the following page; `None` on the last page.
    pub next_page_token: Option<String>,
}

/// A label patch prepared by a provider but not yet sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOperation {
    /// Project that owns the resource.
    pub project_id: String,
    /// Key the provider uses to address the resource (bucket or instance name).
    pub resource_key: String,
    /// JSON body of the patch call.
    pub body: Value,
}

/// A patch operation paired with its idempotency token.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPatch {
    /// The prepared patch.
    pub operation: PatchOperation,
    /// Unique per-operation token used to suppress duplicates on retry.
    pub idempotency_token: String,
}

/// Failure of a single operation inside an otherwise delivered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFailure {
    /// Key of the resource whose patch failed.
    pub resource_key: String,
    /// Token of the failed operation.
    pub idempotency_token: String,
    /// Status reported for the operation.
    pub status: u16,
    /// Error detail from the API.
    pub message: String,
}

/// Outcome of executing a batch of patches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Operations the API accepted.
    pub succeeded: usize,
    /// Operations the API rejected.
    pub failed: Vec<PatchFailure>,
}

impl BatchResult {
    /// Merge another result into this one.
    pub fn absorb(&mut self, other: Self) {
        self.succeeded += other.succeeded;
        self.failed.extend(other.failed);
    }
}

/// Access to one kind of cloud resource.
///
/// Patching is split in two: [`ResourceProvider::patch_request`] prepares an
/// operation without any network traffic, and
/// [`ResourceProvider::execute_batch`] sends a group of prepared operations
/// together.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// API identifier of the resource kind (e.g. `storage.googleapis.com/Bucket`).
    fn kind(&self) -> &str;

    /// Fetch one resource.
    async fn get(&self, project_id: &str, resource_key: &str)
        -> Result<Resource, CloudProviderError>;

    /// Fetch one page of resources in a project.
    async fn list(
        &self,
        project_id: &str,
        page_token: Option<&str>,
    ) -> Result<ResourcePage, CloudProviderError>;

    /// Prepare a patch that sets `labels` on `resource`.
    fn patch_request(
        &self,
        project_id: &str,
        resource: &Resource,
        labels: &Labels,
    ) -> Result<PatchOperation, CloudProviderError>;

    /// Execute prepared patches as one batched call.
    async fn execute_batch(&self, batch: &[PendingPatch])
        -> Result<BatchResult, CloudProviderError>;
}

/// Publish side of the message bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish one message and return the id the bus assigned to it.
    async fn publish(&self, topic: &str, data: &[u8]) -> Result<String, CloudProviderError>;
}

/// Enumerates the projects visible to the service.
#[async_trait]
pub trait ProjectSource: Send + Sync {
    /// All active project ids.
    async fn list_projects(&self) -> Result<Vec<String>, CloudProviderError>;
}
