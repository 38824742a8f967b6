use agent_payment_router::cancel::CancellationToken;
use agent_payment_router::cli::Cli;
use agent_payment_router::config::{credentials_help, Config};
use agent_payment_router::logging::{init_logging, LoggingConfig};
use agent_payment_router::mcp;
use agent_payment_router::redact::SecretSet;
use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() {
    // Parse CLI arguments first to get logging configuration
    let cli = Cli::parse();

    // Credentials are needed before logging starts so the writer can redact them
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config.with_api_url(cli.api_url.as_deref()),
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", credentials_help());
            std::process::exit(1);
        },
    };

    let log_config =
        LoggingConfig::from_args(cli.quiet, cli.verbose, cli.json).with_file(cli.log_file);
    if let Err(e) = init_logging(log_config, SecretSet::new(config.secrets())) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let code = match run(config).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{:#}", e);
            1
        },
    };

    // The stdin reader thread may still be blocked in read(); exiting here
    // avoids waiting on it during runtime shutdown.
    std::process::exit(code);
}

async fn run(config: Config) -> anyhow::Result<()> {
    let shown = config.redacted();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        api_url = %shown.api_url,
        api_key = %shown.api_key,
        budget_key = %shown.budget_key,
        "Starting agent payment router"
    );
    match &config.source {
        Some(path) => tracing::debug!("Loaded configuration from {}", path.display()),
        None => tracing::debug!("No config file found, using environment variables"),
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    mcp::run(&config, shutdown)
        .await
        .context("MCP server terminated")?;

    tracing::info!("MCP server stopped");
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C, or on SIGTERM where available.
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                wait_for_ctrl_c().await;
                shutdown.cancel();
                return;
            },
        };

        tokio::select! {
            _ = wait_for_ctrl_c() => {},
            _ = terminate.recv() => tracing::info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;

    shutdown.cancel();
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        },
    }
}
