//! Logger setup, in the style of this workspace's standalone `logger`
//! crate, folded into this crate directly since nothing else depends on the
//! rest of that crate's surface.
//!
//! This crate never calls into these functions itself — it only emits
//! `tracing` events and leaves sink configuration to the embedder (see the
//! scope notes on logging in the crate's top-level docs). These helpers
//! exist for embedders and for this crate's own test suite.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{
    filter::Targets,
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};

/// Initialize a global `tracing` logger that prints to stdout. Defaults to
/// `INFO` and above; override with `RUST_LOG`. Panics if a global logger is
/// already installed.
pub fn init() {
    try_init().expect("failed to install tracing subscriber");
}

/// Initialize a logger for test binaries: a no-op unless `RUST_LOG` is set,
/// and tolerant of a logger already being installed by another test thread.
pub fn init_for_testing() {
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    let _ = try_init();
}

fn try_init() -> Result<(), TryInitError> {
    let rust_log_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|rust_log| Targets::from_str(&rust_log).ok())
        .unwrap_or_else(|| Targets::new().with_default(Level::INFO));

    let stdout_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_level(true)
        .with_target(true)
        .with_ansi(true)
        .with_filter(rust_log_filter);

    tracing_subscriber::registry().with(stdout_log).try_init()
}
