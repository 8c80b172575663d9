//! Cloud capabilities for the resource labeler.
//!
//! The labeling engine talks to the cloud through three narrow traits:
//!
//! - [`ResourceProvider`] - get, paginated list and batched label patch for
//!   one resource kind
//! - [`MessageBus`] - publish a message to a topic
//! - [`ProjectSource`] - enumerate the projects the service can see
//!
//! ## Google Cloud
//!
//! The [`gcp`] module implements them against the Google Cloud REST APIs:
//!
//! 1. **Cloud Storage** buckets, patched through the JSON batch endpoint
//! 2. **Cloud SQL** instances, patched one call per operation
//! 3. **Pub/Sub** publishing and **Resource Manager** project listing
//!
//! Every client authenticates with a [`gcp::GcpAuth`] token source, either a
//! static bearer token or the metadata server of the runtime.

pub mod providers;

pub use providers::{
    gcp, BatchResult, CloudProviderError, Labels, MessageBus, PatchFailure, PatchOperation,
    PendingPatch, ProjectSource, Resource, ResourcePage, ResourceProvider,
};
