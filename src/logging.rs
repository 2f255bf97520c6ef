use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log file name when `--log` is given without a value
pub const DEFAULT_LOG_FILE: &str = "memory-jsonl-mcp.log";

/// Transport mode for MCP server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// stdio transport (default) - for local MCP clients
    Stdio,
    /// Streamable HTTP transport - for remote/web access
    Stream,
}

impl TransportMode {
    /// stdout carries the protocol in stdio mode and stderr output breaks
    /// the client handshake, so only stream mode logs to the console.
    fn console_allowed(self) -> bool {
        matches!(self, TransportMode::Stream)
    }
}

/// Initialize logging based on transport mode
///
/// # stdio mode
/// - no console output
/// - file logging only when `log_file` is set, otherwise nothing is installed
///
/// # Stream mode
/// - stderr logging
/// - plus file logging when `log_file` is set
pub fn init_logging(mode: TransportMode, log_file: Option<String>) -> Result<()> {
    let console = mode.console_allowed();
    if !console && log_file.is_none() {
        return Ok(());
    }

    let file_layer = match log_file {
        Some(filename) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&filename)
                .with_context(|| format!("Failed to open log file '{}'", filename))?;
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        }
        None => None,
    };
    let console_layer = console.then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}
