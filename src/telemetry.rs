//! # telemetry
//!
//! Structured-logging bootstrap for binaries embedding the engine.

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global `fmt` subscriber.
///
/// A set `RUST_LOG` is used as is; `default_directive` (e.g.
/// `"candlewick=debug"`) only applies when it is unset.  Fails instead of
/// panicking when a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> anyhow::Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(rust_log.as_deref(), default_directive)?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .context("global tracing subscriber already installed")?;

    Ok(())
}

fn build_filter(rust_log: Option<&str>, default_directive: &str) -> anyhow::Result<EnvFilter> {
    match rust_log {
        Some(env) => EnvFilter::try_new(env).with_context(|| format!("invalid RUST_LOG '{env}'")),
        None => EnvFilter::try_new(default_directive)
            .with_context(|| format!("invalid tracing directive '{default_directive}'")),
    }
}
