use clap::Parser;
use std::path::PathBuf;

const LONG_ABOUT: &str = r#"
Agent Payment Router - MCP relay for the AgentPMT tool marketplace

Speaks the Model Context Protocol (JSON-RPC 2.0, one message per line) on
stdin/stdout and forwards tool listing and tool execution to the AgentPMT
HTTP API. Diagnostics go to stderr or to --log-file, never to stdout.

Credentials:
  config.json in the working directory or next to the executable:
    { "APIURL": "...", "APIKey": "...", "BudgetKey": "..." }
  or environment variables, which take precedence:
    AGENTPMT_API_URL, AGENTPMT_API_KEY, AGENTPMT_BUDGET_KEY

Client setup (e.g. an MCP-capable assistant):
  { "command": "agent-payment-router", "args": [] }
"#;

#[derive(Parser, Clone, Debug)]
#[command(name = "agent-payment-router")]
#[command(about = "MCP stdio relay for the AgentPMT tool API")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Read configuration from this file instead of searching for config.json
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,
}
