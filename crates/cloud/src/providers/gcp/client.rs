//! Authenticated REST client shared by the GCP capability implementations.

use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::auth::GcpAuth;
use super::models::ApiErrorResponse;
use crate::providers::traits::CloudProviderError;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw response of a multipart batch call.
#[derive(Debug, Clone)]
pub struct MultipartResponse {
    /// Value of the `Content-Type` header (carries the boundary).
    pub content_type: String,
    /// Undecoded body.
    pub body: String,
}

/// HTTP client carrying the token source.
#[derive(Clone, Debug)]
pub struct GcpClient {
    /// HTTP client.
    client: Client,
    /// Bearer token source.
    auth: GcpAuth,
}

impl GcpClient {
    /// Create a new client.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(auth: GcpAuth) -> Result<Self, CloudProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(CloudProviderError::Http)?;

        Ok(Self { client, auth })
    }

    /// Build `base` + path segments, percent-encoding each segment.
    pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<Url, CloudProviderError> {
        let mut url = Url::parse(base)
            .map_err(|e| CloudProviderError::Config(format!("invalid base URL {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| CloudProviderError::Config(format!("base URL {base} cannot have a path")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Make an authenticated GET request.
    pub(crate) async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<T, CloudProviderError> {
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(url)
            .bearer_auth(self.auth.token().await?)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated POST request.
    pub(crate) async fn post<T, B>(&self, url: Url, body: &B) -> Result<T, CloudProviderError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(url)
            .bearer_auth(self.auth.token().await?)
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated PATCH request, discarding the response body.
    pub(crate) async fn patch<B: serde::Serialize>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<(), CloudProviderError> {
        debug!(url = %url, "PATCH request");

        let response = self
            .client
            .patch(url)
            .bearer_auth(self.auth.token().await?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(Self::error_for(status, text))
        }
    }

    /// POST a `multipart/mixed` batch body.
    pub(crate) async fn post_multipart(
        &self,
        url: Url,
        boundary: &str,
        body: String,
    ) -> Result<MultipartResponse, CloudProviderError> {
        debug!(url = %url, bytes = body.len(), "POST batch request");

        let response = self
            .client
            .post(url)
            .bearer_auth(self.auth.token().await?)
            .header(CONTENT_TYPE, format!("multipart/mixed; boundary={boundary}"))
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let text = response.text().await?;

        if status.is_success() {
            Ok(MultipartResponse {
                content_type,
                body: text,
            })
        } else {
            Err(Self::error_for(status, text))
        }
    }

    /// Handle API response.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CloudProviderError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                CloudProviderError::Serialization(e)
            })
        } else {
            Err(Self::error_for(status, text))
        }
    }

    /// Map a non-success status to an error, preferring the API's own message.
    pub(crate) fn error_for(status: StatusCode, text: String) -> CloudProviderError {
        let message = serde_json::from_str::<ApiErrorResponse>(&text)
            .map(|e| e.error.message)
            .unwrap_or(text);

        if status == StatusCode::NOT_FOUND {
            CloudProviderError::NotFound(message)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            CloudProviderError::Auth(message)
        } else {
            CloudProviderError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}
