//! Process-wide `tracing` subscriber.

use std::{ io::IsTerminal, sync::OnceLock };
use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Registry,
};

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install a formatting subscriber filtered by `RUST_LOG` (default `info`).
///
/// Only the first call has any effect; returns `true` if this call installed
/// the subscriber.
pub fn init_tracing() -> bool {
    if INITIALIZED.set(()).is_err() { return false; }
    let filter
        = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer
        = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    Registry::default().with(filter).with(fmt_layer).try_init().is_ok()
}
