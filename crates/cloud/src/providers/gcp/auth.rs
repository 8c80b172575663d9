//! OAuth2 access tokens for Google Cloud APIs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::models::MetadataToken;
use crate::providers::traits::CloudProviderError;

/// Token endpoint of the GCE / Cloud Run metadata server.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh cached tokens this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Timeout for metadata server requests.
const METADATA_TIMEOUT_SECS: u64 = 5;

enum TokenSource {
    /// Fixed bearer token, never refreshed.
    Static(String),
    /// Default service account token from the metadata server.
    Metadata { url: String, client: Client },
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Source of bearer tokens shared by every Google Cloud client.
///
/// Cheap to clone; clones share the token cache.
#[derive(Clone)]
pub struct GcpAuth {
    source: Arc<TokenSource>,
    cache: Arc<RwLock<Option<CachedToken>>>,
}

impl GcpAuth {
    /// Use a fixed access token (for local runs and tests).
    #[must_use]
    pub fn static_token(token: impl Into<String>) -> Self {
        Self {
            source: Arc::new(TokenSource::Static(token.into())),
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Fetch tokens from the runtime's metadata server.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn metadata_server() -> Result<Self, CloudProviderError> {
        Self::metadata_server_at(METADATA_TOKEN_URL)
    }

    /// Fetch tokens from a metadata server at a custom URL.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn metadata_server_at(url: impl Into<String>) -> Result<Self, CloudProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(METADATA_TIMEOUT_SECS))
            .build()
            .map_err(CloudProviderError::Http)?;

        Ok(Self {
            source: Arc::new(TokenSource::Metadata {
                url: url.into(),
                client,
            }),
            cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Current access token, refreshing it when close to expiry.
    ///
    /// # Errors
    /// Returns [`CloudProviderError::Auth`] if the metadata server cannot
    /// issue a token.
    pub async fn token(&self) -> Result<String, CloudProviderError> {
        let (url, client) = match self.source.as_ref() {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Metadata { url, client } => (url, client),
        };

        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.token.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.token.clone());
            }
        }

        debug!(url = %url, "Fetching access token from metadata server");
        let response = client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| CloudProviderError::Auth(format!("metadata server unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Metadata server refused token request");
            return Err(CloudProviderError::Auth(format!(
                "metadata server returned {status}: {text}"
            )));
        }

        let token: MetadataToken = response.json().await?;
        let lifetime = token.expires_in.saturating_sub(REFRESH_MARGIN_SECS).max(0);
        *cache = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
        });

        Ok(token.access_token)
    }
}

impl std::fmt::Debug for GcpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source.as_ref() {
            TokenSource::Static(_) => "static",
            TokenSource::Metadata { .. } => "metadata",
        };
        f.debug_struct("GcpAuth").field("source", &source).finish()
    }
}
