//! Logging subsystem
//!
//! Structured logging via tracing, written to stderr so that sanitized markup
//! on stdout stays clean.
//!
//! # Environment Variables
//!
//! - `PASTECLEAN_LOG` - Primary log level/filter (takes precedence)
//! - `RUST_LOG` - Fallback log level/filter
//!
//! Without either, the configured `logging.level` is used.

use std::io;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Primary filter variable.
pub const LOG_ENV: &str = "PASTECLEAN_LOG";

/// Guard to track if logging has been initialized
static INIT_GUARD: OnceLock<()> = OnceLock::new();

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging error types
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to parse log filter: {0}")]
    FilterParse(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to initialize subscriber: {0}")]
    TryInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Pick the filter directive: `PASTECLEAN_LOG`, then `RUST_LOG`, then the
/// configured level. Empty variables are skipped.
fn select_filter(primary: Option<String>, fallback: Option<String>, configured: &str) -> String {
    primary
        .filter(|s| !s.trim().is_empty())
        .or_else(|| fallback.filter(|s| !s.trim().is_empty()))
        .unwrap_or_else(|| configured.to_string())
}

fn build_env_filter(configured: &str) -> Result<EnvFilter, LoggingError> {
    let directive = select_filter(
        std::env::var(LOG_ENV).ok(),
        std::env::var("RUST_LOG").ok(),
        configured,
    );
    Ok(EnvFilter::try_new(directive)?)
}

/// Initialize logging once. Later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    if INIT_GUARD.get().is_some() {
        return Ok(());
    }

    let filter = build_env_filter(&config.level)?;
    let timer = UtcTime::rfc_3339();

    match config.format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_timer(timer)
                .with_target(true)
                .with_writer(io::stderr);
            Registry::default().with(filter).with(layer).try_init()?;
        }
        LogFormat::Text => {
            let layer = tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_target(false)
                .with_writer(io::stderr);
            Registry::default().with(filter).with(layer).try_init()?;
        }
    }

    let _ = INIT_GUARD.set(());
    tracing::debug!(level = %config.level, format = ?config.format, "logging initialized");
    Ok(())
}
