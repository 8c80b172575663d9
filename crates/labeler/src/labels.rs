//! Label generation.
//!
//! A [`LabelGenerator`] is an explicit table of `label key -> extractor`
//! built when a plugin is constructed. Generation is a pure function of the
//! resource record: the same record always yields the same label set, so
//! relabeling an already labeled resource is a no-op at the API.

use labeler_cloud::{Labels, Resource};
use thiserror::Error;
use tracing::warn;

/// Label key to label value mapping produced for one resource.
pub type LabelSet = Labels;

/// Maximum length of a label key or value.
pub const MAX_LABEL_LEN: usize = 63;

/// An extractor could not derive its attribute from the resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("attribute '{attribute}' missing from resource")]
pub struct AttributeMissing {
    /// Name of the missing attribute.
    pub attribute: String,
}

impl AttributeMissing {
    /// Create a new error for `attribute`.
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }
}

/// Derives one raw label value from a resource.
pub type Extractor = fn(&Resource) -> Result<String, AttributeMissing>;

/// Per-plugin table of label extractors.
#[derive(Debug, Clone, Default)]
pub struct LabelGenerator {
    prefix: Option<String>,
    extractors: Vec<(&'static str, Extractor)>,
}

impl LabelGenerator {
    /// Create an empty generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an extractor for `key`.
    #[must_use]
    pub fn with_extractor(mut self, key: &'static str, extractor: Extractor) -> Self {
        self.extractors.push((key, extractor));
        self
    }

    /// Prefix every key with `<prefix>_`. Empty prefixes are ignored.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Option<&str>) -> Self {
        self.prefix = prefix
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(normalize_key);
        self
    }

    /// Unprefixed keys this generator produces, in table order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.extractors.iter().map(|(key, _)| *key)
    }

    /// Generate the label set for `resource`.
    ///
    /// Missing attributes are logged and their label omitted.
    #[must_use]
    pub fn generate(&self, resource: &Resource) -> LabelSet {
        let mut labels = LabelSet::new();

        for (key, extractor) in &self.extractors {
            let value = extractor(resource).and_then(|raw| {
                let value = normalize_value(&raw);
                if value.is_empty() {
                    Err(AttributeMissing::new(*key))
                } else {
                    Ok(value)
                }
            });

            match value {
                Ok(value) => {
                    let key = match &self.prefix {
                        Some(prefix) => normalize_key(&format!("{prefix}_{key}")),
                        None => normalize_key(key),
                    };
                    labels.insert(key, value);
                }
                Err(e) => {
                    warn!(
                        label = %key,
                        resource = resource.name().unwrap_or("<unnamed>"),
                        error = %e,
                        "Omitting label"
                    );
                }
            }
        }

        labels
    }
}

/// Normalize a label value: lower case, punctuation (`.`, `-`, ...) and any
/// other character outside `[a-z0-9_]` replaced by `_`, truncated to
/// [`MAX_LABEL_LEN`].
#[must_use]
pub fn normalize_value(raw: &str) -> String {
    raw.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .take(MAX_LABEL_LEN)
        .collect()
}

/// Normalize a label key. Keys additionally must start with a letter.
#[must_use]
pub fn normalize_key(raw: &str) -> String {
    let key = normalize_value(raw);
    if key.starts_with(|c: char| c.is_ascii_lowercase()) {
        key
    } else {
        format!("x{key}").chars().take(MAX_LABEL_LEN).collect()
    }
}

/// Reusable extractors.
pub mod extract {
    use super::{AttributeMissing, Resource};

    /// Last path segment of the `name` attribute.
    pub fn name(resource: &Resource) -> Result<String, AttributeMissing> {
        resource
            .name()
            .and_then(|name| name.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AttributeMissing::new("name"))
    }

    /// The `location` attribute.
    pub fn location(resource: &Resource) -> Result<String, AttributeMissing> {
        resource
            .str_field("location")
            .map(str::to_string)
            .ok_or_else(|| AttributeMissing::new("location"))
    }

    /// The `region` attribute.
    pub fn region(resource: &Resource) -> Result<String, AttributeMissing> {
        resource
            .str_field("region")
            .map(str::to_string)
            .ok_or_else(|| AttributeMissing::new("region"))
    }
}
