//! Labeling policy loaded from YAML.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::LabelerResult;

/// Default Pub/Sub topic carrying reconciliation requests.
pub const DEFAULT_TOPIC: &str = "request_full_labeling";

/// Decides whether a project takes part in labeling.
pub trait ProjectFilter: Send + Sync {
    /// Whether `project_id` may be labeled.
    fn is_included(&self, project_id: &str) -> bool;
}

/// Policy file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    /// Projects to label. Empty means every visible project.
    pub projects: Vec<String>,
    /// Projects never labeled, even if listed in `projects`.
    pub excluded_projects: Vec<String>,
    /// Optional prefix for every label key.
    pub label_prefix: Option<String>,
    /// Plugins to register. Empty means all.
    pub plugins: Vec<String>,
}

impl LabelerConfig {
    /// Parse a policy document.
    ///
    /// # Errors
    /// Returns a YAML error for malformed documents.
    pub fn from_yaml(yaml: &str) -> LabelerResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load the policy file at `path`, falling back to defaults when no path
    /// is given or the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> LabelerResult<Self> {
        let Some(path) = path else {
            info!("No policy file configured, labeling every project");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!(path = %path.display(), "Policy file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&contents)?;
        info!(
            path = %path.display(),
            included = config.projects.len(),
            excluded = config.excluded_projects.len(),
            "Loaded policy file"
        );
        Ok(config)
    }

    /// Prefix for label keys, if a non-empty one is configured.
    #[must_use]
    pub fn label_prefix(&self) -> Option<&str> {
        self.label_prefix
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Whether the plugin named `name` should be registered.
    #[must_use]
    pub fn plugin_enabled(&self, name: &str) -> bool {
        self.plugins.is_empty() || self.plugins.iter().any(|p| p == name)
    }

    /// Project inclusion predicate for this policy.
    #[must_use]
    pub fn inclusion(&self) -> ProjectInclusion {
        ProjectInclusion::new(self.projects.iter().cloned(), self.excluded_projects.iter().cloned())
    }
}

/// Include/exclude lists. Exclusion wins; an empty include list admits all.
#[derive(Debug, Clone, Default)]
pub struct ProjectInclusion {
    included: HashSet<String>,
    excluded: HashSet<String>,
}

impl ProjectInclusion {
    /// Build the predicate from include and exclude lists.
    pub fn new<I, E>(included: I, excluded: E) -> Self
    where
        I: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
    {
        Self {
            included: included.into_iter().collect(),
            excluded: excluded.into_iter().collect(),
        }
    }
}

impl ProjectFilter for ProjectInclusion {
    fn is_included(&self, project_id: &str) -> bool {
        if self.excluded.contains(project_id) {
            return false;
        }
        self.included.is_empty() || self.included.contains(project_id)
    }
}
