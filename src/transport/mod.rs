//! # transport
//!
//! Collaborator contracts the engine consumes.  Concrete broker adapters live
//! outside this crate; [`paper::PaperTransport`] and
//! [`history::JsonFileHistory`] are the in-process implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::TimeFrame;
use crate::error::TransportError;
use crate::models::{Candle, ExecutedOrder, Instrument, PendingOrder};

pub mod history;
pub mod paper;

pub use history::JsonFileHistory;
pub use paper::PaperTransport;

// ─── Transport ────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_instrument(&self, ticker: &str) -> Result<Instrument, TransportError>;

    /// Opens a sequential tick stream for `ticker`.
    async fn subscribe_to_tick(
        &self,
        ticker: &str,
        interval: TimeFrame,
    ) -> Result<TickSubscription, TransportError>;

    /// Places `order`; the returned [`ExecutedOrder`] must keep the `cid`.
    async fn place_order(&self, order: PendingOrder) -> Result<ExecutedOrder, TransportError>;

    /// Broker-specific rounding of a raw lot count.
    fn prepare_lots(&self, lots: f64, ticker: &str) -> f64;
}

// ─── TickSubscription ─────────────────────────────────────────────────────────

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Live tick stream plus the callback that tears it down.
pub struct TickSubscription {
    ticks: mpsc::Receiver<Candle>,
    unsubscribe: Option<Unsubscribe>,
}

impl TickSubscription {
    pub fn new<F>(ticks: mpsc::Receiver<Candle>, unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            ticks,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Next tick; `None` once the transport closed the stream.
    pub async fn recv(&mut self) -> Option<Candle> {
        self.ticks.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.ticks.close();
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for TickSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickSubscription").finish_non_exhaustive()
    }
}

// ─── HistorySource ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub broker: String,
    pub ticker: String,
    /// Lookback window in days.
    pub days: u32,
    pub interval: TimeFrame,
    /// Days to leave out at the recent end of the window.
    pub gap_days: u32,
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Ticks inside the requested window, oldest first.
    async fn get_history(&self, request: HistoryRequest) -> anyhow::Result<Vec<Candle>>;
}
