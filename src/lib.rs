//! Hemmer Logs Provider
//!
//! Log-management resources (log groups, streams, metric and subscription
//! filters, policies, transformers, deliveries) for Hemmer, built on a
//! generic reconciliation engine that drives a remote control-plane API
//! toward a desired spec.
//!
//! # Overview
//!
//! - **Finder** ([`finder`]): locate one object by key through a direct get or
//!   a paginated filtered list, or enumerate everything matching a filter
//! - **Normalizer** ([`normalizer`]): canonical JSON so documents compare by
//!   meaning, not by text
//! - **Controller** ([`controller`]): create/put, read, update, delete, import
//!   and plan for one [`ResourceKind`], with read-back after every write
//! - **Identity** ([`identity`]): encode, decode and derive resource keys
//! - **Locks** ([`mutex`]): named mutexes serializing mutations under a
//!   shared parent
//! - **Retry** ([`retry`]): bounded backoff with cancellation
//! - **Catalog** ([`resources`]): the shipped resource kinds
//! - **Provider** ([`provider`]): the [`ProviderService`] facade an
//!   orchestrator drives
//! - **Testing** ([`testing`]): an in-memory remote and a provider harness
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use hemmer_provider_logs::testing::MemoryRemote;
//! use hemmer_provider_logs::{LogsProvider, ProviderService};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let provider = LogsProvider::new(Arc::new(MemoryRemote::new()));
//!
//! let plan = provider
//!     .plan("logs_log_group", None, json!({"name": "/app/web"}), json!({}))
//!     .await
//!     .unwrap();
//! let state = provider.create("logs_log_group", plan.planned_state).await.unwrap();
//! assert_eq!(state["id"], "/app/web");
//!
//! provider.delete("logs_log_group", state).await.unwrap();
//! # });
//! ```
//!
//! # Remote services
//!
//! The engine speaks to the control plane only through [`RemoteService`].
//! Implementations map its calls onto the concrete API and must report
//! absent objects as [`ProviderError::NotFound`] so that refresh, delete and
//! read-back can tell "gone" from "broken".

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod error;
pub mod finder;
pub mod identity;
pub mod logging;
pub mod mutex;
pub mod normalizer;
pub mod provider;
pub mod remote;
pub mod resources;
pub mod retry;
pub mod schema;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use config::ProviderConfig;
pub use controller::{
    Applied, DeleteOutcome, ReadOutcome, ResourceController, ResourceKind, UpdateOutcome,
};
pub use error::{Action, NotFoundError, ProviderError};
pub use finder::{Finder, Lookup};
pub use identity::{Identity, IdentityScheme};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{LogsProvider, ProviderService};
pub use remote::{Attributes, ListFilter, Page, RemoteObject, RemoteService, UpdateRequest};
pub use retry::{OperationContext, RetryOptions};
pub use schema::ProviderSchema;
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
};
pub use validation::{is_valid, validate, validate_spec};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
