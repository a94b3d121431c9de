//! Tracing subscriber initialisation
//!
//! `RUST_LOG` takes precedence over the configured level. When a log file is
//! configured, output goes there instead of stderr.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter directive for the chorus crates at `level`
pub fn default_directives(level: &str) -> String {
    format!(
        "chorus_server={level},chorus_common={level},tower_http={level}",
        level = level
    )
}

/// Install the global tracing subscriber
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    let registry = tracing_subscriber::registry().with(filter);

    match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()
                .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {}", e)))
        }
        None => registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {}", e))),
    }
}
