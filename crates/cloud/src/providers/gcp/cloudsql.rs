//! Cloud SQL instances.
//!
//! The Admin API has no batch endpoint, so a flushed batch is executed as
//! sequential patch calls. A rejected call is recorded and the rest of the
//! batch still runs.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use super::client::GcpClient;
use super::models::ItemListResponse;
use crate::providers::traits::{
    BatchResult, CloudProviderError, Labels, PatchFailure, PatchOperation, PendingPatch, Resource,
    ResourcePage, ResourceProvider,
};

/// Default Cloud SQL Admin API endpoint.
pub const SQLADMIN_API_BASE: &str = "https://sqladmin.googleapis.com";

/// Resource kind identifier for Cloud SQL instances.
pub const INSTANCE_KIND: &str = "sqladmin.googleapis.com/Instance";

/// Cloud SQL instance provider.
#[derive(Clone, Debug)]
pub struct CloudSqlInstances {
    client: GcpClient,
    base_url: String,
}

impl CloudSqlInstances {
    /// Create a provider against the public endpoint.
    #[must_use]
    pub fn new(client: GcpClient) -> Self {
        Self {
            client,
            base_url: SQLADMIN_API_BASE.to_string(),
        }
    }

    /// Point the provider at another endpoint (emulators, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ResourceProvider for CloudSqlInstances {
    fn kind(&self) -> &str {
        INSTANCE_KIND
    }

    async fn get(
        &self,
        project_id: &str,
        resource_key: &str,
    ) -> Result<Resource, CloudProviderError> {
        debug!(project_id = %project_id, instance = %resource_key, "Fetching Cloud SQL instance");
        let url = GcpClient::endpoint(
            &self.base_url,
            &["v1", "projects", project_id, "instances", resource_key],
        )?;
        let instance: serde_json::Value = self.client.get(url).await?;
        Ok(Resource::new(instance))
    }

    async fn list(
        &self,
        project_id: &str,
        page_token: Option<&str>,
    ) -> Result<ResourcePage, CloudProviderError> {
        let mut url =
            GcpClient::endpoint(&self.base_url, &["v1", "projects", project_id, "instances"])?;
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }

        let page: ItemListResponse = self.client.get(url).await?;
        debug!(
            project_id = %project_id,
            count = page.items.len(),
            has_more = page.next_page_token.is_some(),
            "Listed Cloud SQL instances"
        );

        Ok(ResourcePage {
            items: page.items.into_iter().map(Resource::new).collect(),
            next_page_token: page.next_page_token,
        })
    }

    fn patch_request(
        &self,
        project_id: &str,
        resource: &Resource,
        labels: &Labels,
    ) -> Result<PatchOperation, CloudProviderError> {
        let name = resource.name().ok_or_else(|| {
            CloudProviderError::InvalidResource("Cloud SQL instance without a name".to_string())
        })?;

        Ok(PatchOperation {
            project_id: project_id.to_string(),
            resource_key: name.to_string(),
            body: json!({ "settings": { "userLabels": labels } }),
        })
    }

    async fn execute_batch(
        &self,
        batch: &[PendingPatch],
    ) -> Result<BatchResult, CloudProviderError> {
        let mut result = BatchResult::default();

        for pending in batch {
            let op = &pending.operation;
            let url = GcpClient::endpoint(
                &self.base_url,
                &["v1", "projects", &op.project_id, "instances", &op.resource_key],
            )?;

            match self.client.patch(url, &op.body).await {
                Ok(()) => result.succeeded += 1,
                Err(e) => {
                    warn!(
                        instance = %op.resource_key,
                        token = %pending.idempotency_token,
                        error = %e,
                        "Cloud SQL label patch failed"
                    );
                    result.failed.push(PatchFailure {
                        resource_key: op.resource_key.clone(),
                        idempotency_token: pending.idempotency_token.clone(),
                        status: e.status_code(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            succeeded = result.succeeded,
            failed = result.failed.len(),
            "Cloud SQL label batch executed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::gcp::GcpAuth;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> CloudSqlInstances {
        let client = GcpClient::new(GcpAuth::static_token("test-token")).unwrap();
        CloudSqlInstances::new(client).with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_list_instances() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/p1/instances"))
            .and(query_param("pageToken", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "db1", "region": "us-central1"}],
                "nextPageToken": "def"
            })))
            .mount(&server)
            .await;

        let page = provider(&server).list("p1", Some("abc")).await.unwrap();
        assert_eq!(page.items[0].name(), Some("db1"));
        assert_eq!(page.next_page_token.as_deref(), Some("def"));
    }

    #[tokio::test]
    async fn test_patch_failures_do_not_stop_batch() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/projects/p1/instances/db1"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/v1/projects/p1/instances/db2"))
            .and(body_json(json!({"settings": {"userLabels": {"name": "db2"}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "sql#operation"})))
            .expect(1)
            .mount(&server)
            .await;

        let sql = provider(&server);
        let mut batch = Vec::new();
        for (name, token) in [("db1", "t1"), ("db2", "t2")] {
            let mut labels = Labels::new();
            labels.insert("name".to_string(), name.to_string());
            batch.push(PendingPatch {
                operation: sql
                    .patch_request("p1", &Resource::new(json!({ "name": name })), &labels)
                    .unwrap(),
                idempotency_token: token.to_string(),
            });
        }

        let result = sql.execute_batch(&batch).await.unwrap();
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].resource_key, "db1");
        assert_eq!(result.failed[0].status, 500);
    }
}
