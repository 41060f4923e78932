//! # transport::paper
//!
//! **Paper Transport** — in-memory broker that fills every order immediately
//! at its requested price.  Used for dry runs and as the engine's test double:
//! outcomes can be scripted and every placed order is recorded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::TimeFrame;
use crate::error::TransportError;
use crate::models::{Candle, ExecutedOrder, Instrument, PendingOrder};
use crate::transport::{TickSubscription, Transport};

pub struct PaperTransport {
    instrument: Instrument,
    /// Decimal places kept by `prepare_lots` (0 = whole lots).
    lot_precision: u32,
    feed: Mutex<Vec<Candle>>,
    /// Scripted outcomes, front first: `None` fills, `Some(reason)` rejects.
    /// Once empty every order fills.
    outcomes: Mutex<VecDeque<Option<String>>>,
    placed: Mutex<Vec<PendingOrder>>,
    next_id: AtomicU64,
    instrument_requests: AtomicUsize,
    unsubscribed: Arc<AtomicBool>,
}

impl PaperTransport {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            lot_precision: 0,
            feed: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
            placed: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            instrument_requests: AtomicUsize::new(0),
            unsubscribed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_lot_precision(mut self, precision: u32) -> Self {
        self.lot_precision = precision;
        self
    }

    /// Ticks delivered by the next subscription, after which the stream ends.
    pub fn with_feed(self, ticks: Vec<Candle>) -> Self {
        if let Ok(mut feed) = self.feed.lock() {
            *feed = ticks;
        }
        self
    }

    pub fn fill_next(&self) {
        self.push_outcome(None);
    }

    pub fn reject_next(&self, reason: impl Into<String>) {
        self.push_outcome(Some(reason.into()));
    }

    /// Every order passed to `place_order`, filled or not.
    pub fn placed_orders(&self) -> Vec<PendingOrder> {
        self.placed.lock().map(|placed| placed.clone()).unwrap_or_default()
    }

    pub fn instrument_requests(&self) -> usize {
        self.instrument_requests.load(Ordering::SeqCst)
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::SeqCst)
    }

    fn push_outcome(&self, outcome: Option<String>) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(outcome);
        }
    }

    fn next_outcome(&self) -> Option<String> {
        self.outcomes
            .lock()
            .ok()
            .and_then(|mut outcomes| outcomes.pop_front())
            .flatten()
    }
}

#[async_trait]
impl Transport for PaperTransport {
    async fn get_instrument(&self, ticker: &str) -> Result<Instrument, TransportError> {
        self.instrument_requests.fetch_add(1, Ordering::SeqCst);

        if ticker != self.instrument.ticker {
            return Err(TransportError::Rejected(format!("unknown ticker {ticker}")));
        }
        Ok(self.instrument.clone())
    }

    async fn subscribe_to_tick(
        &self,
        ticker: &str,
        interval: TimeFrame,
    ) -> Result<TickSubscription, TransportError> {
        let ticks = self
            .feed
            .lock()
            .map(|mut feed| std::mem::take(&mut *feed))
            .map_err(|_| TransportError::Unavailable("paper feed poisoned".into()))?;

        let (tx, rx) = mpsc::channel(ticks.len().max(1));
        for tick in ticks {
            if tx.try_send(tick).is_err() {
                warn!(ticker, "Paper feed channel full, tick dropped");
            }
        }

        info!(ticker, %interval, "📡 [PAPER] Tick subscription opened");

        let unsubscribed = Arc::clone(&self.unsubscribed);
        Ok(TickSubscription::new(rx, move || {
            unsubscribed.store(true, Ordering::SeqCst);
        }))
    }

    async fn place_order(&self, order: PendingOrder) -> Result<ExecutedOrder, TransportError> {
        if let Ok(mut placed) = self.placed.lock() {
            placed.push(order.clone());
        }

        if let Some(reason) = self.next_outcome() {
            warn!(cid = order.cid, reason = %reason, "[PAPER] Order rejected");
            return Err(TransportError::Rejected(reason));
        }

        let order_id = format!("paper-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let lots = order.lots;

        info!(
            cid = order.cid,
            order_id = %order_id,
            side = ?order.order_type,
            price = order.price,
            lots,
            close = order.close,
            "✅ [PAPER] Order filled"
        );

        Ok(ExecutedOrder::from_pending(order, order_id, lots))
    }

    fn prepare_lots(&self, lots: f64, _ticker: &str) -> f64 {
        let scale = 10f64.powi(self.lot_precision as i32);
        (lots * scale).floor() / scale
    }
}
