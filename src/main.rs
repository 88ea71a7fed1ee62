//! Event Bus Monitor - Main Entry Point
//!
//! Connects to the agent platform's event bus and prints every event and
//! connection state change until interrupted.

use clap::{Parser, Subcommand, ValueEnum};
use eventbus_client::config::ClientConfig;
use eventbus_client::observability::logging::{init_default_logging, init_logging, LogFormat};
use eventbus_client::protocol::KnownEventType;
use eventbus_client::{ConnectionState, EventClient};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tracing::{error, info, Level};

/// Realtime event bus monitor
#[derive(Parser)]
#[command(name = "eventbus-monitor")]
#[command(about = "Monitor the agent platform event bus")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the configured endpoint
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print events until interrupted
    Run {
        /// Event type to subscribe to; repeatable (default: all known types)
        #[arg(long = "event", value_name = "TYPE")]
        events: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        format: OutputFormat,
    },
    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
}

/// Output formatting options
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Color-coded, human-readable with timestamps (default)
    Pretty,
    /// Single line per event
    Compact,
    /// One JSON object per line for programmatic processing
    Json,
}

const RESET: &str = "\x1b[0m";

fn event_color(event_type: &str) -> &'static str {
    match event_type.parse::<KnownEventType>() {
        Ok(KnownEventType::MessageReceived) => "\x1b[1;34m", // Blue
        Ok(KnownEventType::AgentThinking) => "\x1b[1;33m",   // Yellow
        Ok(KnownEventType::ToolInvoked) => "\x1b[1;35m",     // Magenta
        Ok(KnownEventType::TaskCompleted) => "\x1b[1;32m",   // Green
        Err(_) => "\x1b[0;37m",                              // White
    }
}

fn state_color(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected => "\x1b[1;32m",
        ConnectionState::Connecting => "\x1b[1;33m",
        ConnectionState::Disconnected => "\x1b[1;31m",
        ConnectionState::Closed => "\x1b[0;37m",
    }
}

fn format_event(event_type: &str, payload: &Value, format: OutputFormat) -> String {
    let timestamp = chrono::Utc::now().format("%H:%M:%S");

    match format {
        OutputFormat::Json => json!({
            "timestamp": timestamp.to_string(),
            "kind": "event",
            "event_type": event_type,
            "payload": payload,
        })
        .to_string(),
        OutputFormat::Compact => format!("{timestamp} [{event_type}] {payload}"),
        OutputFormat::Pretty => {
            let color = event_color(event_type);
            let body = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
            format!("{color}[{event_type}]{RESET} {timestamp}\n{body}\n")
        }
    }
}

fn format_state(state: ConnectionState, format: OutputFormat) -> String {
    let timestamp = chrono::Utc::now().format("%H:%M:%S");

    match format {
        OutputFormat::Json => json!({
            "timestamp": timestamp.to_string(),
            "kind": "state",
            "state": state,
        })
        .to_string(),
        OutputFormat::Compact => format!("{timestamp} [STATE] {state}"),
        OutputFormat::Pretty => {
            let color = state_color(state);
            format!("{color}[STATE]{RESET} {timestamp} {state}")
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        1 => init_logging(Level::DEBUG, LogFormat::Compact, false),
        _ => init_logging(Level::TRACE, LogFormat::Compact, true),
    }

    let config = match load_configuration(cli.config.as_ref(), cli.endpoint.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { events, format } => run_monitor(config, events, format).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: Option<&PathBuf>,
    endpoint: Option<&str>,
) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            ClientConfig::load_from_file(path)?
        }
        None => {
            let default_path = ["eventbus.toml", "config/eventbus.toml"]
                .into_iter()
                .map(PathBuf::from)
                .find(|path| path.exists());

            match default_path {
                Some(path) => {
                    info!("Loading configuration from: {}", path.display());
                    ClientConfig::load_from_file(&path)?
                }
                None => {
                    info!("No configuration file found, using defaults");
                    ClientConfig::default()
                }
            }
        }
    };

    if let Some(endpoint) = endpoint {
        config.client.endpoint = endpoint.to_string();
        config.validate()?;
    }

    Ok(config)
}

async fn run_monitor(
    config: ClientConfig,
    events: Vec<String>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = EventClient::from_config(&config)?;

    let event_types = if events.is_empty() {
        KnownEventType::ALL
            .iter()
            .map(|kind| kind.as_str().to_string())
            .collect()
    } else {
        events
    };

    for event_type in &event_types {
        let label = event_type.clone();
        client.subscribe(event_type, move |payload| {
            println!("{}", format_event(&label, payload, format));
            Ok(())
        });
    }

    info!(
        endpoint = %client.endpoint(),
        events = ?event_types,
        "Event bus monitor starting"
    );

    let mut states = client.watch_state();
    client.connect();

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    println!("{}", format_state(*states.borrow_and_update(), format));
    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                println!("{}", format_state(state, format));
            }
        }
    }

    client.dispose();

    let metrics = client.metrics();
    info!(
        events_dispatched = metrics.events.events_dispatched,
        reconnects = metrics.connection.reconnects_scheduled,
        "Event bus monitor stopped"
    );
    Ok(())
}

fn handle_config_command(
    config: &ClientConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    if show {
        println!("Effective configuration:");
        println!("{}", config.to_toml_string()?);
    }

    info!("Configuration validation complete");
    Ok(())
}
