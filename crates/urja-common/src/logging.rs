//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the pipeline runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Filter override read before `RUST_LOG`.
pub const LOG_ENV: &str = "URJA_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

// Flushing stops once these drop, so they live for the process.
static WRITER_GUARDS: OnceCell<[WorkerGuard; 2]> = OnceCell::new();

/// Console output format; the rolling file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Pick the filter from `URJA_LOG`, then `RUST_LOG`, then `info`.
///
/// A malformed `URJA_LOG` falls back to `info`; the rejected directive is
/// returned so it can be logged once the subscriber exists.
fn resolve_filter(
    urja_log: Option<String>,
    rust_log: Option<String>,
) -> (EnvFilter, Option<String>) {
    if let Some(directive) = urja_log {
        return match EnvFilter::try_new(&directive) {
            Ok(filter) => (filter, None),
            Err(_) => (EnvFilter::new(DEFAULT_DIRECTIVE), Some(directive)),
        };
    }
    let filter = rust_log
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE));
    (filter, None)
}

/// Install the global subscriber for `service_name`.
///
/// Console lines use `config.format`; a daily rolling JSON file named after
/// `config.file_prefix` (or the service) is written under `config.directory`.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("failed to create log directory {}", config.directory.display())
    })?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, format!("{prefix}.log")));
    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = WRITER_GUARDS.set([file_guard, console_guard]);

    let (filter, rejected) = resolve_filter(
        std::env::var(LOG_ENV).ok(),
        std::env::var("RUST_LOG").ok(),
    );

    let console = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(console_writer);
    let console = match config.format {
        LogFormat::StructuredJson => console.with_target(false).json().boxed(),
        LogFormat::Pretty => console.with_target(true).boxed(),
    };
    let file = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .boxed();

    // A subscriber installed earlier (tests) stays in place.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init();

    if let Some(directive) = rejected {
        warn!(env = LOG_ENV, %directive, "ignoring malformed log filter");
    }
    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        "tracing initialised"
    );
    Ok(())
}
