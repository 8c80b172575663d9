//! Inbound messages: creation events, reconciliation requests and the push
//! envelope both arrive in.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LabelerError, LabelerResult};

/// A resource-creation event, normalized from an audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNotification {
    /// API method that produced the event, e.g. `storage.buckets.create`.
    pub api_method_name: String,
    /// Project the resource lives in.
    pub project_id: String,
    /// Identifying attributes of the affected resource.
    #[serde(default, alias = "resource")]
    pub resource_identifying_fields: BTreeMap<String, String>,
}

impl EventNotification {
    /// Create a notification.
    pub fn new<I, K, V>(api_method_name: impl Into<String>, project_id: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            api_method_name: api_method_name.into(),
            project_id: project_id.into(),
            resource_identifying_fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// One identifying attribute of the resource.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.resource_identifying_fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Parse either a raw audit log entry or the normalized form.
    ///
    /// Log entries are recognized by their `protoPayload` member. Method
    /// name comes from `protoPayload.methodName`, project from
    /// `resource.labels.project_id` and identifying fields from the string
    /// members of `resource.labels`.
    ///
    /// # Errors
    /// Returns [`LabelerError::InvalidPayload`] when a required member is
    /// missing or has the wrong type.
    pub fn from_json(value: &Value) -> LabelerResult<Self> {
        if value.get("protoPayload").is_some() {
            return Self::from_log_entry(value);
        }

        let event: Self = serde_json::from_value(value.clone())
            .map_err(|e| LabelerError::invalid_payload(format!("event notification: {e}")))?;
        if event.project_id.is_empty() {
            return Err(LabelerError::invalid_payload("event has an empty project id"));
        }
        Ok(event)
    }

    fn from_log_entry(value: &Value) -> LabelerResult<Self> {
        let api_method_name = value
            .pointer("/protoPayload/methodName")
            .and_then(Value::as_str)
            .ok_or_else(|| LabelerError::invalid_payload("log entry without protoPayload.methodName"))?;

        let labels = value
            .pointer("/resource/labels")
            .and_then(Value::as_object)
            .ok_or_else(|| LabelerError::invalid_payload("log entry without resource.labels"))?;

        let project_id = labels
            .get("project_id")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| LabelerError::invalid_payload("log entry without resource.labels.project_id"))?;

        let fields = labels
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())));

        Ok(Self::new(api_method_name, project_id, fields))
    }
}

/// Instruction to sweep every resource of one plugin in one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationRequest {
    #[serde(alias = "project_id")]
    pub project_id: String,
    #[serde(alias = "plugin")]
    pub plugin_name: String,
}

impl ReconciliationRequest {
    /// Request a sweep of `plugin_name` over `project_id`.
    pub fn new(project_id: impl Into<String>, plugin_name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            plugin_name: plugin_name.into(),
        }
    }

    /// Serialized message body.
    ///
    /// # Errors
    /// Only fails if serialization itself fails.
    pub fn to_bytes(&self) -> LabelerResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| LabelerError::invalid_payload(format!("reconciliation request: {e}")))
    }

    /// Parse a reconciliation request, accepting legacy member names.
    ///
    /// # Errors
    /// Returns [`LabelerError::InvalidPayload`] for missing or empty members.
    pub fn from_json(value: &Value) -> LabelerResult<Self> {
        let request: Self = serde_json::from_value(value.clone())
            .map_err(|e| LabelerError::invalid_payload(format!("reconciliation request: {e}")))?;
        if request.project_id.is_empty() || request.plugin_name.is_empty() {
            return Err(LabelerError::invalid_payload(
                "reconciliation request needs a project id and a plugin name",
            ));
        }
        Ok(request)
    }
}

/// Push delivery envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// Message carried by a [`PushEnvelope`].
#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    /// Base64 encoded JSON body.
    #[serde(default)]
    pub data: String,
    #[serde(default, rename = "messageId", alias = "message_id")]
    pub message_id: Option<String>,
}

impl PushEnvelope {
    /// Parse an envelope from a raw request body.
    ///
    /// # Errors
    /// Returns [`LabelerError::InvalidPayload`] if the body is not an envelope.
    pub fn from_slice(body: &[u8]) -> LabelerResult<Self> {
        serde_json::from_slice(body)
            .map_err(|e| LabelerError::invalid_payload(format!("push envelope: {e}")))
    }

    /// Decode `message.data` into JSON.
    ///
    /// # Errors
    /// Returns [`LabelerError::InvalidPayload`] if the data is empty, not
    /// base64, or not JSON.
    pub fn decode_data(&self) -> LabelerResult<Value> {
        if self.message.data.is_empty() {
            return Err(LabelerError::invalid_payload("push message has no data"));
        }
        let bytes = STANDARD
            .decode(self.message.data.trim())
            .map_err(|e| LabelerError::invalid_payload(format!("message data is not base64: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| LabelerError::invalid_payload(format!("message data is not JSON: {e}")))
    }
}
