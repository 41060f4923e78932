//! # engine::orders
//!
//! Insertion-ordered collection of open positions and the `cid` source.
//! Only the engine mutates it; plugins and strategies read it through
//! `&[Order]`.

use chrono::Utc;
use tracing::warn;

use crate::models::{ExecutedOrder, Order, PendingOrder};

// ─── CidGenerator ─────────────────────────────────────────────────────────────

/// Millisecond wall-clock ids, bumped so that no two calls on one generator
/// ever return the same value.
#[derive(Debug, Default)]
pub struct CidGenerator {
    last: u64,
}

impl CidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_cid(&mut self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.last = now.max(self.last + 1);
        self.last
    }
}

// ─── OrderBook ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct OrderBook {
    orders: Vec<Order>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[Order] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn contains(&self, cid: u64) -> bool {
        self.position(cid).is_some()
    }

    pub fn get(&self, cid: u64) -> Option<&Order> {
        self.orders.iter().find(|order| order.cid() == cid)
    }

    pub(crate) fn push_pending(&mut self, order: PendingOrder) {
        self.orders.push(Order::Pending(order));
    }

    /// Re-inserts a position at the front (oldest slot).
    pub(crate) fn push_front(&mut self, order: ExecutedOrder) {
        self.orders.insert(0, Order::Executed(order));
    }

    /// Swaps the entry with the same `cid` for its executed form.
    pub(crate) fn replace_pending(&mut self, order: ExecutedOrder) {
        match self.position(order.cid()) {
            Some(idx) => self.orders[idx] = Order::Executed(order),
            None => warn!(
                cid = order.cid(),
                order_id = %order.order_id,
                open = self.orders.len(),
                "Unknown order for replace"
            ),
        }
    }

    pub(crate) fn remove(&mut self, cid: u64) -> Option<Order> {
        self.position(cid).map(|idx| self.orders.remove(idx))
    }

    /// Sets the close guard on the executed entry with `cid`, if any.
    pub(crate) fn set_processing(&mut self, cid: u64, processing: bool) {
        if let Some(Order::Executed(order)) = self.orders.iter_mut().find(|o| o.cid() == cid) {
            order.processing = processing;
        }
    }

    fn position(&self, cid: u64) -> Option<usize> {
        self.orders.iter().position(|order| order.cid() == cid)
    }
}
