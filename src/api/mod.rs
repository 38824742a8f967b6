//! Upstream tool API
//!
//! The relay never executes tools itself. Catalog retrieval and execution are
//! forwarded to the HTTP API through [`ToolBackend`]; [`ApiClient`] is the
//! production implementation.

pub mod client;
pub mod sse;

pub use client::ApiClient;

use crate::cancel::CancellationToken;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Receiving end of streamed output. Chunks arrive in network order.
pub type ChunkSink = mpsc::UnboundedSender<String>;

/// One entry of the upstream catalog, unwrapped from its `function` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Upstream product identifier
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema for the arguments, passed through untouched
    #[serde(default)]
    pub parameters: Value,
}

/// Body of a `/products/purchase` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRequest {
    pub product_id: String,
    pub parameters: Value,
}

impl ExecutionRequest {
    pub fn new(product_id: impl Into<String>, parameters: Value) -> Self {
        Self {
            product_id: product_id.into(),
            parameters,
        }
    }
}

/// Operations the dispatcher needs from the upstream service.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Fetch the whole catalog, following pagination to the last page.
    async fn fetch_tools(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolDescriptor>, ApiError>;

    /// Execute a tool and return its textual output.
    async fn purchase(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ApiError>;

    /// Execute a tool with streamed output pushed into `sink`.
    ///
    /// Callers must not assume a chunk count: an upstream that declines to
    /// stream yields its whole output as a single chunk. Chunks already sent
    /// stay sent when the call later fails or is cancelled.
    async fn stream_purchase(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
        sink: ChunkSink,
    ) -> Result<(), ApiError>;
}
