//! HTTP client for the AgentPMT products API

use super::sse::{EventKind, SseDecoder};
use super::{ChunkSink, ExecutionRequest, ToolBackend, ToolDescriptor};
use crate::cancel::CancellationToken;
use crate::error::ApiError;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

pub const FETCH_ENDPOINT: &str = "/products/fetch";
pub const PURCHASE_ENDPOINT: &str = "/products/purchase";

/// Tools requested per catalog page
pub const PAGE_SIZE: u32 = 50;

pub const USER_AGENT: &str = concat!("agent-payment-router/", env!("CARGO_PKG_VERSION"));

const API_KEY_HEADER: &str = "X-API-Key";
const BUDGET_KEY_HEADER: &str = "X-Budget-Key";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest a stream may stay silent between chunks
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct FetchToolsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    details: PaginationDetails,
    #[serde(default)]
    tools: Vec<ToolWrapper>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PaginationDetails {
    #[serde(default)]
    has_next_page: bool,
    #[serde(default)]
    total_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ToolWrapper {
    function: ToolDescriptor,
}

#[derive(Debug, Deserialize)]
struct PurchaseResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Option<String>,
}

impl PurchaseResponse {
    fn into_output(self, operation: &'static str) -> Result<String, ApiError> {
        if !self.success {
            return Err(ApiError::Upstream {
                operation,
                message: self.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(match self.output {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

pub struct ApiClient {
    base_url: String,
    api_key: String,
    budget_key: String,
    http: reqwest::Client,
    http_stream: reqwest::Client,
    stream_header_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        budget_key: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        // No overall timeout: a stream runs as long as the upstream keeps
        // sending. Header receipt and gaps between chunks are bounded instead.
        let http_stream = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            budget_key: budget_key.into(),
            http,
            http_stream,
            stream_header_timeout: REQUEST_TIMEOUT,
            stream_idle_timeout: STREAM_IDLE_TIMEOUT,
        })
    }

    /// Override how long a streaming purchase waits for response headers and
    /// for each subsequent chunk.
    pub fn with_stream_timeouts(mut self, headers: Duration, idle: Duration) -> Self {
        self.stream_header_timeout = headers;
        self.stream_idle_timeout = idle;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(API_KEY_HEADER, &self.api_key)
            .header(BUDGET_KEY_HEADER, &self.budget_key)
    }

    async fn send(
        &self,
        operation: &'static str,
        endpoint: &str,
        builder: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ApiError> {
        let response = with_cancel(operation, cancel, self.authorized(builder).send())
            .await?
            .map_err(|source| ApiError::Request {
                operation,
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = with_cancel(operation, cancel, response.text())
                .await?
                .unwrap_or_else(|_| "(no body)".to_string());
            return Err(ApiError::Status {
                operation,
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn read_body(
        &self,
        operation: &'static str,
        endpoint: &str,
        response: reqwest::Response,
        cancel: &CancellationToken,
    ) -> Result<String, ApiError> {
        with_cancel(operation, cancel, response.text())
            .await?
            .map_err(|source| ApiError::Request {
                operation,
                endpoint: endpoint.to_string(),
                source,
            })
    }

    async fn fetch_page(
        &self,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<FetchToolsResponse, ApiError> {
        const OP: &str = "fetch_tools";
        let endpoint = format!("{}{}", self.base_url, FETCH_ENDPOINT);

        let builder = self
            .http
            .get(&endpoint)
            .query(&[("page", page), ("page_size", PAGE_SIZE)]);
        let response = self.send(OP, &endpoint, builder, cancel).await?;
        let body = self.read_body(OP, &endpoint, response, cancel).await?;

        let parsed: FetchToolsResponse =
            serde_json::from_str(&body).map_err(|source| ApiError::Decode {
                operation: OP,
                endpoint: endpoint.clone(),
                source,
            })?;
        if !parsed.success {
            return Err(ApiError::Upstream {
                operation: OP,
                message: parsed.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(parsed)
    }
}

#[async_trait]
impl ToolBackend for ApiClient {
    async fn fetch_tools(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolDescriptor>, ApiError> {
        let mut tools = Vec::new();
        let mut page = 1;

        loop {
            let response = self.fetch_page(page, cancel).await?;
            tracing::debug!(
                page,
                tools_on_page = response.tools.len(),
                total_pages = ?response.details.total_pages,
                "Fetched catalog page"
            );

            tools.extend(response.tools.into_iter().map(|w| w.function));

            if !response.details.has_next_page {
                break;
            }
            page += 1;
        }

        Ok(tools)
    }

    async fn purchase(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ApiError> {
        const OP: &str = "purchase";
        let endpoint = format!("{}{}", self.base_url, PURCHASE_ENDPOINT);

        let builder = self.http.post(&endpoint).json(request);
        let response = self.send(OP, &endpoint, builder, cancel).await?;
        let body = self.read_body(OP, &endpoint, response, cancel).await?;

        let parsed: PurchaseResponse =
            serde_json::from_str(&body).map_err(|source| ApiError::Decode {
                operation: OP,
                endpoint: endpoint.clone(),
                source,
            })?;
        parsed.into_output(OP)
    }

    async fn stream_purchase(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
        sink: ChunkSink,
    ) -> Result<(), ApiError> {
        const OP: &str = "stream_purchase";
        let endpoint = format!("{}{}", self.base_url, PURCHASE_ENDPOINT);

        let builder = self
            .http_stream
            .post(&endpoint)
            .query(&[("stream", "true")])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request);
        let response = with_deadline(
            OP,
            &endpoint,
            self.stream_header_timeout,
            self.send(OP, &endpoint, builder, cancel),
        )
        .await??;

        if !is_event_stream(&response) {
            // Upstream declined to stream: deliver the whole output as one chunk
            tracing::debug!("Upstream returned a non-streaming response, falling back");
            let body = with_deadline(
                OP,
                &endpoint,
                self.stream_idle_timeout,
                self.read_body(OP, &endpoint, response, cancel),
            )
            .await??;
            let parsed: PurchaseResponse =
                serde_json::from_str(&body).map_err(|source| ApiError::Decode {
                    operation: OP,
                    endpoint: endpoint.clone(),
                    source,
                })?;
            push_chunk(&sink, parsed.into_output(OP)?);
            return Ok(());
        }

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::Cancelled { operation: OP }),
                next = tokio::time::timeout(self.stream_idle_timeout, body.next()) => {
                    next.map_err(|_| ApiError::Timeout {
                        operation: OP,
                        endpoint: endpoint.clone(),
                        after: self.stream_idle_timeout,
                    })?
                },
            };

            let finished = next.is_none();
            let events = match next {
                Some(Ok(bytes)) => decoder.feed(&bytes),
                Some(Err(source)) => {
                    return Err(ApiError::Request {
                        operation: OP,
                        endpoint,
                        source,
                    })
                },
                None => decoder.finish().into_iter().collect(),
            };

            for event in events {
                match event.kind() {
                    EventKind::Data => {
                        if !event.data.is_empty() {
                            push_chunk(&sink, event.data);
                        }
                    },
                    EventKind::Error => return Err(ApiError::Stream(event.data)),
                    EventKind::Done => return Ok(()),
                    EventKind::Other(kind) => {
                        tracing::debug!(event = kind, "Ignoring unknown stream event");
                    },
                }
            }

            if finished {
                return Ok(());
            }
        }
    }
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase().starts_with("text/event-stream"))
        .unwrap_or(false)
}

fn push_chunk(sink: &ChunkSink, chunk: String) {
    if sink.send(chunk).is_err() {
        tracing::debug!("Chunk receiver dropped, discarding streamed output");
    }
}

/// Fail with [`ApiError::Timeout`] if `fut` does not finish within `after`.
async fn with_deadline<F: Future>(
    operation: &'static str,
    endpoint: &str,
    after: Duration,
    fut: F,
) -> Result<F::Output, ApiError> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| ApiError::Timeout {
            operation,
            endpoint: endpoint.to_string(),
            after,
        })
}

/// Race `fut` against cancellation of `cancel`.
async fn with_cancel<F: Future>(
    operation: &'static str,
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, ApiError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled { operation }),
        out = fut => Ok(out),
    }
}
