//! am - request/response over a Unix socket
//!
//! CLI entry point: serve echo replies, or send one correlated request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use asyncmessager::cli::{Cli, Command, OutputFormat};
use asyncmessager::config::Config;
use asyncmessager::message::{DATA_FIELD, REQUEST_ID_FIELD, SCOPE_FIELD, TYPE_FIELD};
use asyncmessager::transport::SocketTransport;
use asyncmessager::transport::listener::{cleanup_socket, create_listener_at, echo_reply, serve};
use asyncmessager::{Hooks, InvokeOptions, Messager, MessagerError};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install subscriber: {}", e))?;

    debug!(?level, "Logging initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Serve { socket } => cmd_serve(&config, socket).await,
        Command::Invoke {
            message_type,
            data,
            scope,
            request_id,
            timeout_ms,
            send_only,
            socket,
            format,
        } => {
            let payload = build_payload(&message_type, data.as_deref(), scope, request_id)?;
            let mut options = InvokeOptions::new();
            if let Some(ms) = timeout_ms {
                options = options.timeout(Duration::from_millis(ms));
            }
            if send_only {
                options = options.send_only();
            }
            cmd_invoke(&config, socket, payload, options, format).await
        }
        Command::Config => cmd_config(&config),
    }
}

/// Build the request body from CLI arguments
fn build_payload(message_type: &str, data: Option<&str>, scope: Option<String>, request_id: Option<String>) -> Result<Value> {
    let mut payload = Map::new();
    payload.insert(TYPE_FIELD.to_string(), json!(message_type));
    if let Some(data) = data {
        let data: Value = serde_json::from_str(data).context("--data must be valid JSON")?;
        payload.insert(DATA_FIELD.to_string(), data);
    }
    if let Some(scope) = scope {
        payload.insert(SCOPE_FIELD.to_string(), json!(scope));
    }
    if let Some(request_id) = request_id {
        payload.insert(REQUEST_ID_FIELD.to_string(), json!(request_id));
    }
    Ok(Value::Object(payload))
}

/// Bind the socket and answer with echo replies until Ctrl-C
async fn cmd_serve(config: &Config, socket: Option<PathBuf>) -> Result<()> {
    let socket_path = socket.unwrap_or_else(|| config.socket_path.clone());
    debug!(?socket_path, "cmd_serve: called");

    let (listener, socket_path) = create_listener_at(&socket_path).context("Failed to bind socket")?;
    println!("{} Listening on {}", "✓".green(), socket_path.display().to_string().cyan());
    info!(?socket_path, "cmd_serve: serving");

    let result = tokio::select! {
        result = serve(listener, Arc::new(echo_reply)) => result.context("Server failed"),
        _ = tokio::signal::ctrl_c() => {
            info!("cmd_serve: interrupted, shutting down");
            Ok(())
        }
    };

    cleanup_socket(&socket_path);
    result
}

/// Send one request over the socket and print the response
async fn cmd_invoke(
    config: &Config,
    socket: Option<PathBuf>,
    payload: Value,
    options: InvokeOptions,
    format: OutputFormat,
) -> Result<()> {
    let socket_path = socket.unwrap_or_else(|| config.socket_path.clone());
    debug!(?socket_path, %payload, "cmd_invoke: called");

    let transport = SocketTransport::connect(&socket_path)
        .await
        .context(format!("Failed to connect to {}", socket_path.display()))?;
    let messager = Messager::new(config.messager.clone(), Hooks::with_transport(Arc::new(transport)));
    // Replies are only read while subscribed, whatever auto-subscribe says
    messager.subscribe().context("Failed to subscribe")?;

    let result = messager.invoke(payload, options).await;
    let statistics = messager.statistics();
    messager.destroy();

    match format {
        OutputFormat::Json => {
            let body = match &result {
                Ok(response) => json!({ "response": response, "statistics": statistics }),
                Err(e) => json!({
                    "error": e.to_string(),
                    "fallback": e.timeout_payload(),
                    "statistics": statistics,
                }),
            };
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => match &result {
            Ok(Some(response)) => {
                println!("{} {}", "✓".green(), serde_json::to_string_pretty(response)?);
            }
            Ok(None) => println!("{} sent", "✓".green()),
            Err(e) => println!("{} {}", "✗".red(), e),
        },
    }

    if format == OutputFormat::Text {
        println!(
            "{} total={} success={} timeout={}",
            "stats".dimmed(),
            statistics.total,
            statistics.success,
            statistics.timeout
        );
    }

    match result {
        Ok(_) => Ok(()),
        Err(e @ MessagerError::Timeout { .. }) => Err(e).context("No response before the timeout"),
        Err(e) => Err(e).context("Invoke failed"),
    }
}

/// Print the effective configuration as YAML
fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}
