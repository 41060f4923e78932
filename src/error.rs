//! # error
//!
//! Centralised error types.
//!
//! Order placement failures are *not* surfaced through these types to the
//! strategy: the engine recovers them locally and logs them.  What does
//! propagate is everything the caller of `start` / `learn` / `create_order` /
//! `close_order` must see: missing preconditions, collaborator failures
//! outside order placement, and errors raised by plugin hooks.

use thiserror::Error;

use crate::hooks::PluginHook;

/// Failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker received the request and refused it.
    #[error("Order rejected: {0}")]
    Rejected(String),

    /// The broker could not be reached or timed out.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Transport error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The historical data source failed during `learn`.
    #[error("History error: {0}")]
    History(anyhow::Error),

    /// An async plugin hook returned an error.
    #[error("Plugin '{plugin}' failed in {hook} hook: {source}")]
    Hook {
        hook: PluginHook,
        plugin: String,
        #[source]
        source: anyhow::Error,
    },

    /// An order operation ran before `start()` / `learn()` resolved the instrument.
    #[error("Instrument is not resolved yet")]
    NoInstrument,

    /// An order operation ran before the first tick arrived.
    #[error("No market tick received yet")]
    NoMarketTick,

    #[error("No history source configured")]
    NoHistorySource,

    /// `run()` was called without a live subscription.
    #[error("Engine is not started")]
    NotStarted,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
