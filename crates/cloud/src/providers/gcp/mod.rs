//! GCP (Google Cloud Platform) capabilities.
//!
//! Implements the capability traits against the Google Cloud REST APIs.
//!
//! ## Services
//!
//! - **Cloud Storage** - buckets, labels patched via the JSON batch endpoint
//!   (at most 100 calls per batch request)
//! - **Cloud SQL Admin** - instances, labels stored as `settings.userLabels`
//! - **Pub/Sub** - message publishing
//! - **Resource Manager** - active project enumeration
//!
//! ## Authentication
//!
//! All clients share one [`GcpAuth`]: a static bearer token, or the default
//! service account token from the metadata server, cached until shortly
//! before it expires.

mod auth;
pub mod batch;
mod client;
mod cloudsql;
mod models;
mod pubsub;
mod resource_manager;
mod storage;

pub use auth::{GcpAuth, METADATA_TOKEN_URL};
pub use client::{GcpClient, MultipartResponse};
pub use cloudsql::{CloudSqlInstances, INSTANCE_KIND, SQLADMIN_API_BASE};
pub use models::*;
pub use pubsub::{PubSub, PUBSUB_API_BASE};
pub use resource_manager::{ResourceManager, RESOURCE_MANAGER_API_BASE};
pub use storage::{StorageBuckets, BUCKET_KIND, MAX_CALLS_PER_BATCH, STORAGE_API_BASE};
