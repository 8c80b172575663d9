//! Project enumeration through Cloud Resource Manager.

use async_trait::async_trait;
use tracing::{debug, info};

use super::client::GcpClient;
use super::models::ProjectListResponse;
use crate::providers::traits::{CloudProviderError, ProjectSource};

/// Default Resource Manager endpoint.
pub const RESOURCE_MANAGER_API_BASE: &str = "https://cloudresourcemanager.googleapis.com";

/// Lists the active projects the service account can see.
#[derive(Clone, Debug)]
pub struct ResourceManager {
    client: GcpClient,
    base_url: String,
}

impl ResourceManager {
    /// Create a lister against the public endpoint.
    #[must_use]
    pub fn new(client: GcpClient) -> Self {
        Self {
            client,
            base_url: RESOURCE_MANAGER_API_BASE.to_string(),
        }
    }

    /// Point the lister at another endpoint (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProjectSource for ResourceManager {
    async fn list_projects(&self) -> Result<Vec<String>, CloudProviderError> {
        let mut projects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = GcpClient::endpoint(&self.base_url, &["v1", "projects"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("filter", "lifecycleState:ACTIVE");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page: ProjectListResponse = self.client.get(url).await?;
            debug!(count = page.projects.len(), "Listed projects page");

            projects.extend(
                page.projects
                    .into_iter()
                    .filter(|p| p.lifecycle_state.as_deref().is_none_or(|s| s == "ACTIVE"))
                    .map(|p| p.project_id),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!(count = projects.len(), "Enumerated projects");
        Ok(projects)
    }
}
