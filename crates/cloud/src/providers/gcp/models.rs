//! GCP API request and response models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Metadata server
// ============================================================================

/// Token issued by the metadata server.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataToken {
    /// Bearer token.
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

// ============================================================================
// Listing responses (Cloud Storage and Cloud SQL share this shape)
// ============================================================================

/// A page of resources.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemListResponse {
    /// Raw resources on this page.
    #[serde(default)]
    pub items: Vec<Value>,
    /// Token for the next page.
    pub next_page_token: Option<String>,
}

// ============================================================================
// Resource Manager
// ============================================================================

/// A project as returned by the Resource Manager v1 API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project id.
    pub project_id: String,
    /// Lifecycle state (`ACTIVE`, `DELETE_REQUESTED`, ...).
    pub lifecycle_state: Option<String>,
}

/// Project list response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListResponse {
    /// Projects on this page.
    #[serde(default)]
    pub projects: Vec<Project>,
    /// Token for the next page.
    pub next_page_token: Option<String>,
}

// ============================================================================
// Pub/Sub
// ============================================================================

/// Publish request body.
#[derive(Debug, Serialize)]
pub struct PublishRequest {
    /// Messages to publish.
    pub messages: Vec<PubsubMessage>,
}

/// A single outbound message.
#[derive(Debug, Serialize)]
pub struct PubsubMessage {
    /// Base64-encoded payload.
    pub data: String,
}

/// Publish response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    /// Server-assigned ids, one per published message.
    #[serde(default)]
    pub message_ids: Vec<String>,
}

// ============================================================================
// Errors
// ============================================================================

/// Google API error envelope.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    /// Error detail.
    pub error: ApiErrorBody,
}

/// Google API error detail.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    /// HTTP status code.
    #[serde(default)]
    pub code: u16,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}
