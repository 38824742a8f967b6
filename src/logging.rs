//! Agent Payment Router Logging System
//!
//! Structured logging through `tracing`. Stdout carries the JSON-RPC stream,
//! so diagnostics go to stderr or to a file, never to stdout. Every writer is
//! wrapped in [`RedactingMakeWriter`] so credentials cannot leak into logs.

use crate::redact::{RedactingMakeWriter, SecretSet};
use std::io;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level to output
    pub level: Level,
    /// Show target/module name
    pub show_target: bool,
    /// Enable JSON format for machine parsing
    pub json_format: bool,
    /// Append to this file instead of stderr
    pub file_output: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            show_target: false,
            json_format: false,
            file_output: None,
        }
    }
}

impl LoggingConfig {
    /// Create config from CLI arguments
    ///
    /// `verbose` counts `-v` flags: one enables debug, two or more trace.
    pub fn from_args(quiet: bool, verbose: u8, json: bool) -> Self {
        let level = match (quiet, verbose) {
            (_, 2..) => Level::TRACE,
            (_, 1) => Level::DEBUG,
            (true, 0) => Level::ERROR,
            (false, 0) => Level::INFO,
        };

        Self {
            level,
            show_target: verbose > 0,
            json_format: json,
            file_output: None,
        }
    }

    pub fn with_file(mut self, path: Option<PathBuf>) -> Self {
        self.file_output = path;
        self
    }

    /// Directive used when `RUST_LOG` is not set
    pub fn default_directive(&self) -> String {
        format!("agent_payment_router={}", self.level)
    }
}

/// Initialize the logging system
///
/// Output is redacted against `secrets` before it reaches stderr or the log
/// file. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: LoggingConfig, secrets: SecretSet) -> io::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    let registry = Registry::default().with(env_filter);

    if let Some(log_file) = &config.file_output {
        let directory = match log_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = log_file.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file name")
        })?;
        std::fs::create_dir_all(&directory)?;

        let file_appender = tracing_appender::rolling::never(directory, file_name);
        let writer = RedactingMakeWriter::new(file_appender, secrets);
        registry.with(build_layer(&config, writer)).init();
    } else {
        let writer = RedactingMakeWriter::new(io::stderr, secrets);
        registry.with(build_layer(&config, writer)).init();
    }

    Ok(())
}

fn build_layer<S, W>(config: &LoggingConfig, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    if config.json_format {
        return fmt::layer()
            .json()
            .with_current_span(false)
            .with_target(config.show_target)
            .with_timer(fmt::time::ChronoUtc::rfc_3339())
            .with_writer(writer)
            .boxed();
    }

    fmt::layer()
        .with_target(config.show_target)
        .with_level(true)
        .with_ansi(false)
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(writer)
        .boxed()
}

#[macro_export]
macro_rules! log_mcp_operation {
    ($operation:expr, $method:expr) => {
        tracing::debug!(
            operation = $operation,
            mcp_method = $method,
            "MCP operation"
        );
    };
    ($operation:expr, $method:expr, $details:expr) => {
        tracing::debug!(
            operation = $operation,
            mcp_method = $method,
            details = $details,
            "MCP operation"
        );
    };
}

/// Utility macro for structured error logging
#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Operation failed"
        );
    };
}
