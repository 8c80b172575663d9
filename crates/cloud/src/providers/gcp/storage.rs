//! Cloud Storage buckets.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::batch::{self, BatchPart};
use super::client::GcpClient;
use super::models::ItemListResponse;
use crate::providers::traits::{
    BatchResult, CloudProviderError, Labels, PatchFailure, PatchOperation, PendingPatch, Resource,
    ResourcePage, ResourceProvider,
};

/// Default Cloud Storage JSON API endpoint.
pub const STORAGE_API_BASE: &str = "https://storage.googleapis.com";

/// Resource kind identifier for buckets.
pub const BUCKET_KIND: &str = "storage.googleapis.com/Bucket";

/// The storage batch endpoint accepts at most this many calls per request.
pub const MAX_CALLS_PER_BATCH: usize = 100;

/// Cloud Storage bucket provider.
#[derive(Clone, Debug)]
pub struct StorageBuckets {
    client: GcpClient,
    base_url: String,
}

impl StorageBuckets {
    /// Create a provider against the public endpoint.
    #[must_use]
    pub fn new(client: GcpClient) -> Self {
        Self {
            client,
            base_url: STORAGE_API_BASE.to_string(),
        }
    }

    /// Point the provider at another endpoint (emulators, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send one batch request of at most [`MAX_CALLS_PER_BATCH`] patches.
    async fn send_chunk(&self, chunk: &[PendingPatch]) -> Result<BatchResult, CloudProviderError> {
        let mut parts = Vec::with_capacity(chunk.len());
        for pending in chunk {
            let url = GcpClient::endpoint(
                &self.base_url,
                &["storage", "v1", "b", &pending.operation.resource_key],
            )?;
            parts.push(BatchPart {
                content_id: &pending.idempotency_token,
                method: "PATCH",
                path: url.path().to_string(),
                body: &pending.operation.body,
            });
        }

        let boundary = format!("batch_{}", chunk[0].idempotency_token);
        let url = GcpClient::endpoint(&self.base_url, &["batch", "storage", "v1"])?;
        let response = self
            .client
            .post_multipart(url, &boundary, batch::encode(&boundary, &parts))
            .await?;

        let mut result = BatchResult::default();
        let mut answered = HashSet::new();
        let mut anonymous = 0usize;
        for part in batch::decode(&response.content_type, &response.body)? {
            match &part.content_id {
                Some(id) => {
                    answered.insert(id.clone());
                }
                None => anonymous += 1,
            }
            if (200..300).contains(&part.status) {
                result.succeeded += 1;
                continue;
            }
            let token = part.content_id.unwrap_or_default();
            let resource_key = chunk
                .iter()
                .find(|p| p.idempotency_token == token)
                .map(|p| p.operation.resource_key.clone())
                .unwrap_or_default();
            warn!(
                bucket = %resource_key,
                status = part.status,
                "Bucket label patch rejected"
            );
            result.failed.push(PatchFailure {
                resource_key,
                idempotency_token: token,
                status: part.status,
                message: part.body,
            });
        }

        // Parts without a Content-ID already stand for some operation.
        let unanswered = chunk
            .iter()
            .filter(|p| !answered.contains(&p.idempotency_token))
            .skip(anonymous);
        for pending in unanswered {
            warn!(
                bucket = %pending.operation.resource_key,
                "Batch response has no part for bucket label patch"
            );
            result.failed.push(PatchFailure {
                resource_key: pending.operation.resource_key.clone(),
                idempotency_token: pending.idempotency_token.clone(),
                status: 0,
                message: "no response part for operation".to_string(),
            });
        }

        Ok(result)
    }
}

#[async_trait]
impl ResourceProvider for StorageBuckets {
    fn kind(&self) -> &str {
        BUCKET_KIND
    }

    async fn get(
        &self,
        project_id: &str,
        resource_key: &str,
    ) -> Result<Resource, CloudProviderError> {
        debug!(project_id = %project_id, bucket = %resource_key, "Fetching bucket");
        let url = GcpClient::endpoint(&self.base_url, &["storage", "v1", "b", resource_key])?;
        let bucket: serde_json::Value = self.client.get(url).await?;
        Ok(Resource::new(bucket))
    }

    async fn list(
        &self,
        project_id: &str,
        page_token: Option<&str>,
    ) -> Result<ResourcePage, CloudProviderError> {
        let mut url = GcpClient::endpoint(&self.base_url, &["storage", "v1", "b"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("project", project_id);
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }

        let page: ItemListResponse = self.client.get(url).await?;
        debug!(
            project_id = %project_id,
            count = page.items.len(),
            has_more = page.next_page_token.is_some(),
            "Listed buckets"
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
            CloudProviderError::InvalidResource("bucket without a name".to_string())
        })?;

        Ok(PatchOperation {
            project_id: project_id.to_string(),
            resource_key: name.to_string(),
            body: json!({ "labels": labels }),
        })
    }

    async fn execute_batch(
        &self,
        batch: &[PendingPatch],
    ) -> Result<BatchResult, CloudProviderError> {
        let mut result = BatchResult::default();
        for chunk in batch.chunks(MAX_CALLS_PER_BATCH) {
            match self.send_chunk(chunk).await {
                Ok(chunk_result) => result.absorb(chunk_result),
                Err(e) => {
                    error!(
                        operations = chunk.len(),
                        error = %e,
                        "Bucket label batch call failed"
                    );
                    let status = e.status_code();
                    let message = e.to_string();
                    result.failed.extend(chunk.iter().map(|pending| PatchFailure {
                        resource_key: pending.operation.resource_key.clone(),
                        idempotency_token: pending.idempotency_token.clone(),
                        status,
                        message: message.clone(),
                    }));
                }
            }
        }

        info!(
            succeeded = result.succeeded,
            failed = result.failed.len(),
            "Bucket label batch executed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::gcp::GcpAuth;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn provider(server: &MockServer) -> StorageBuckets {
        let client = GcpClient::new(GcpAuth::static_token("test-token")).unwrap();
        StorageBuckets::new(client).with_base_url(server.uri())
    }

    fn pending(bucket: &str, token: &str) -> PendingPatch {
        PendingPatch {
            operation: PatchOperation {
                project_id: "p1".to_string(),
                resource_key: bucket.to_string(),
                body: json!({"labels": {"name": bucket}}),
            },
            idempotency_token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/b1"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "b1", "location": "US-EAST1"})),
            )
            .mount(&server)
            .await;

        let bucket = provider(&server).get("p1", "b1").await.unwrap();
        assert_eq!(bucket.name(), Some("b1"));
        assert_eq!(bucket.str_field("location"), Some("US-EAST1"));
    }

    #[tokio::test]
    async fn test_get_missing_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                json!({"error": {"code": 404, "message": "The specified bucket does not exist."}}),
            ))
            .mount(&server)
            .await;

        let err = provider(&server).get("p1", "gone").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_passes_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b"))
            .and(query_param("project", "p1"))
            .and(query_param("pageToken", "next-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "c"}]
            })))
            .mount(&server)
            .await;

        let page = provider(&server).list("p1", Some("next-1")).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn test_patch_request_requires_name() {
        let client = GcpClient::new(GcpAuth::static_token("t")).unwrap();
        let buckets = StorageBuckets::new(client);
        let mut labels = Labels::new();
        labels.insert("name".to_string(), "b1".to_string());

        let op = buckets
            .patch_request("p1", &Resource::new(json!({"name": "b1"})), &labels)
            .unwrap();
        assert_eq!(op.resource_key, "b1");
        assert_eq!(op.body, json!({"labels": {"name": "b1"}}));

        let err = buckets
            .patch_request("p1", &Resource::new(json!({"location": "US"})), &labels)
            .unwrap_err();
        assert!(matches!(err, CloudProviderError::InvalidResource(_)));
    }

    #[tokio::test]
    async fn test_execute_batch_reports_failed_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/batch/storage/v1"))
            .respond_with(|request: &Request| {
                let body = String::from_utf8_lossy(&request.body);
                assert!(body.contains("PATCH /storage/v1/b/b1 HTTP/1.1"));
                assert!(body.contains("PATCH /storage/v1/b/b2 HTTP/1.1"));
                let response = "--resp\r\n\
                    Content-Type: application/http\r\n\
                    Content-ID: <response-t1>\r\n\
                    \r\n\
                    HTTP/1.1 200 OK\r\n\
                    \r\n\
                    {}\r\n\
                    --resp\r\n\
                    Content-Type: application/http\r\n\
                    Content-ID: <response-t2>\r\n\
                    \r\n\
                    HTTP/1.1 403 Forbidden\r\n\
                    \r\n\
                    {\"error\": {\"code\": 403}}\r\n\
                    --resp--\r\n";
                ResponseTemplate::new(200).set_body_raw(response, "multipart/mixed; boundary=resp")
            })
            .expect(1)
            .mount(&server)
            .await;

        let result = provider(&server)
            .execute_batch(&[pending("b1", "t1"), pending("b2", "t2")])
            .await
            .unwrap();

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].resource_key, "b2");
        assert_eq!(result.failed[0].status, 403);
    }

    /// Answer every request part with a 200 part carrying its `Content-ID`.
    fn echo_parts(request: &Request) -> ResponseTemplate {
        let body = String::from_utf8_lossy(&request.body);
        let mut response = String::new();
        for id in body
            .lines()
            .filter_map(|line| line.trim_end().strip_prefix("Content-ID: <"))
            .filter_map(|rest| rest.strip_suffix('>'))
        {
            response.push_str(&format!(
                "--resp\r\n\
                 Content-Type: application/http\r\n\
                 Content-ID: <response-{id}>\r\n\
                 \r\n\
                 HTTP/1.1 200 OK\r\n\
                 \r\n\
                 {{}}\r\n"
            ));
        }
        response.push_str("--resp--\r\n");
        ResponseTemplate::new(200).set_body_raw(response, "multipart/mixed; boundary=resp")
    }

    fn many(count: usize) -> Vec<PendingPatch> {
        (0..count)
            .map(|i| pending(&format!("b{i}"), &format!("t{i}")))
            .collect()
    }

    #[tokio::test]
    async fn test_execute_batch_splits_large_flushes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/batch/storage/v1"))
            .respond_with(echo_parts)
            .expect(3)
            .mount(&server)
            .await;

        let result = provider(&server).execute_batch(&many(250)).await.unwrap();
        assert_eq!(result.succeeded, 250);
        assert!(result.failed.is_empty());
    }

    #[tokio::test]
    async fn test_execute_batch_continues_after_failed_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/batch/storage/v1"))
            .respond_with(ResponseTemplate::new(503).set_body_json(
                json!({"error": {"code": 503, "message": "Backend unavailable"}}),
            ))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/batch/storage/v1"))
            .respond_with(echo_parts)
            .expect(2)
            .mount(&server)
            .await;

        let result = provider(&server).execute_batch(&many(250)).await.unwrap();

        assert_eq!(result.succeeded, 150);
        assert_eq!(result.failed.len(), 100);
        assert!(result.failed.iter().all(|f| f.status == 503));
        assert_eq!(result.failed[0].resource_key, "b0");
        assert_eq!(result.failed[99].idempotency_token, "t99");
    }

    #[tokio::test]
    async fn test_execute_batch_counts_unanswered_operations_as_failed() {
        let server = MockServer::start().await;
        let response = "--resp\r\n\
            Content-Type: application/http\r\n\
            Content-ID: <response-t1>\r\n\
            \r\n\
            HTTP/1.1 200 OK\r\n\
            \r\n\
            {}\r\n\
            --resp--\r\n";
        Mock::given(method("POST"))
            .and(path("/batch/storage/v1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(response, "multipart/mixed; boundary=resp"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = provider(&server)
            .execute_batch(&[pending("b1", "t1"), pending("b2", "t2")])
            .await
            .unwrap();

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].resource_key, "b2");
        assert_eq!(result.failed[0].idempotency_token, "t2");
    }
}
