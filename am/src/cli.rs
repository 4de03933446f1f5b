//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// am - request/response over a one-way socket
#[derive(Parser, Debug)]
#[command(
    name = "am",
    about = "Request/response correlation over a fire-and-forget transport",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer requests on the socket until interrupted
    Serve {
        /// Socket path (overrides config)
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },

    /// Send one request and wait for its response
    Invoke {
        /// Message type
        #[arg(required = true)]
        message_type: String,

        /// JSON body placed in the `data` field
        #[arg(short, long)]
        data: Option<String>,

        /// Scope used to match the response
        #[arg(long)]
        scope: Option<String>,

        /// Explicit request id instead of a generated one
        #[arg(short, long)]
        request_id: Option<String>,

        /// Timeout in milliseconds (overrides config)
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Send without waiting for a response
        #[arg(long)]
        send_only: bool,

        /// Socket path (overrides config)
        #[arg(short, long)]
        socket: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Output format for invoke results
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
