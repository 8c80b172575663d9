//! Pub/Sub publishing.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use super::client::GcpClient;
use super::models::{PublishRequest, PublishResponse, PubsubMessage};
use crate::providers::traits::{CloudProviderError, MessageBus};

/// Default Pub/Sub endpoint.
pub const PUBSUB_API_BASE: &str = "https://pubsub.googleapis.com";

/// Publishes messages to topics of one host project.
#[derive(Clone, Debug)]
pub struct PubSub {
    client: GcpClient,
    host_project: String,
    base_url: String,
}

impl PubSub {
    /// Create a publisher for topics in `host_project`.
    #[must_use]
    pub fn new(client: GcpClient, host_project: impl Into<String>) -> Self {
        Self {
            client,
            host_project: host_project.into(),
            base_url: PUBSUB_API_BASE.to_string(),
        }
    }

    /// Point the publisher at another endpoint (emulators, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl MessageBus for PubSub {
    async fn publish(&self, topic: &str, data: &[u8]) -> Result<String, CloudProviderError> {
        let url = GcpClient::endpoint(
            &self.base_url,
            &[
                "v1",
                "projects",
                &self.host_project,
                "topics",
                &format!("{topic}:publish"),
            ],
        )?;

        let body = PublishRequest {
            messages: vec![PubsubMessage {
                data: STANDARD.encode(data),
            }],
        };

        let response: PublishResponse = self.client.post(url, &body).await?;
        let message_id = response.message_ids.into_iter().next().ok_or_else(|| {
            CloudProviderError::Api {
                status: 502,
                message: "publish response without message id".to_string(),
            }
        })?;

        debug!(topic = %topic, message_id = %message_id, "Published message");
        Ok(message_id)
    }
}
