//! Structured logging for debugging orchestration runs.
//!
//! The engine emits `tracing` events:
//! - WARN: item failures, exhausted retries, blocked items
//! - INFO: run start/finish, items handed to workers
//! - DEBUG: phase transitions, dispatch decisions, recycled items
//!
//! Debug mode can be enabled with `init_with_debug(true)` or `TASKWEAVE_DEBUG=1`.
//! `TASKWEAVE_LOG` takes an `EnvFilter` directive and overrides both.

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::Result;

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

const FILTER_ENV: &str = "TASKWEAVE_LOG";
const DEBUG_ENV: &str = "TASKWEAVE_DEBUG";

/// Path of the log file, `~/.taskweave/taskweave.log`.
pub fn log_path() -> Result<PathBuf> {
    Ok(crate::config::Config::home_dir()?.join("taskweave.log"))
}

/// Initialize logging to ~/.taskweave/taskweave.log
pub fn init() -> Result<()> {
    init_with_debug(false)
}

/// Initialize logging with explicit debug mode setting.
///
/// The log file is truncated on startup. Calling this twice is harmless;
/// the second subscriber is rejected and the first stays installed.
pub fn init_with_debug(debug: bool) -> Result<()> {
    let debug_enabled = debug || env_debug();
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let dir = crate::config::Config::home_dir()?;
    std::fs::create_dir_all(&dir)?;
    let file = File::create(log_path()?)?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter_for(debug_enabled))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("global subscriber already installed");
    }
    Ok(())
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

fn env_debug() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "taskweave=debug"
    } else {
        "taskweave=info"
    }
}

fn filter_for(debug: bool) -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)))
}
