//! Cloud provider abstractions.
//!
//! This module defines the capability traits the labeler depends on and the
//! Google Cloud implementations of them.

pub mod gcp;
mod traits;

pub use traits::{
    BatchResult, CloudProviderError, Labels, MessageBus, PatchFailure, PatchOperation,
    PendingPatch, ProjectSource, Resource, ResourcePage, ResourceProvider,
};
