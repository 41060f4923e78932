//! # models::order
//!
//! Order lifecycle types.
//!
//! `PendingOrder`  = intent built by the engine, not yet acknowledged by the broker
//! `ExecutedOrder` = the same intent after the transport confirmed it
//! `Order`         = one entry of the engine's open-positions collection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TimeFrame;

// ─── OrderType ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Buy,
    Sell,
}

impl OrderType {
    /// Side of the order that closes a position opened with `self`.
    #[inline]
    pub fn inverse(self) -> Self {
        match self {
            OrderType::Buy => OrderType::Sell,
            OrderType::Sell => OrderType::Buy,
        }
    }
}

// ─── PendingOrder ─────────────────────────────────────────────────────────────

/// Order intent handed to [`Transport::place_order`](crate::transport::Transport::place_order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    /// Locally generated correlation id, unique per engine instance.
    pub cid: u64,
    pub broker: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub ticker: String,
    pub figi: String,
    pub currency: String,
    pub interval: TimeFrame,
    /// Name of the strategy that produced the order.
    pub author: String,
    pub price: f64,
    pub lots: f64,
    pub lot_size: f64,
    pub pip_size: f64,
    /// `true` when this order closes an existing position.
    pub close: bool,
    /// Broker id of the position being closed (closing orders only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_id: Option<String>,
    /// Price the closed position was opened at (closing orders only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_price: Option<f64>,
    pub sandbox: bool,
    /// Created while the engine was replaying history (a simulated fill).
    pub learning: bool,
    pub time: DateTime<Utc>,
    pub margin: bool,
    pub futures: bool,
    pub lots_multiplier: f64,
    pub equity_level: f64,
}

// ─── ExecutedOrder ────────────────────────────────────────────────────────────

/// A [`PendingOrder`] acknowledged by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedOrder {
    #[serde(flatten)]
    pub base: PendingOrder,
    /// Broker-assigned order id.
    pub order_id: String,
    pub executed_lots: f64,
    /// Set while a close request for this order is in flight.
    #[serde(skip)]
    pub processing: bool,
}

impl ExecutedOrder {
    /// Used by transports to build the acknowledgement for `pending`.
    pub fn from_pending(pending: PendingOrder, order_id: impl Into<String>, executed_lots: f64) -> Self {
        Self {
            base: pending,
            order_id: order_id.into(),
            executed_lots,
            processing: false,
        }
    }

    #[inline]
    pub fn cid(&self) -> u64 {
        self.base.cid
    }
}

// ─── Order ────────────────────────────────────────────────────────────────────

/// Entry of the open-positions collection.
///
/// An entry stays `Pending` between the optimistic insert and the broker
/// acknowledgement, then is swapped for its `Executed` form by `cid`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Order {
    Pending(PendingOrder),
    Executed(ExecutedOrder),
}

impl Order {
    #[inline]
    pub fn cid(&self) -> u64 {
        match self {
            Order::Pending(order) => order.cid,
            Order::Executed(order) => order.base.cid,
        }
    }

    /// Shared order fields regardless of state.
    pub fn base(&self) -> &PendingOrder {
        match self {
            Order::Pending(order) => order,
            Order::Executed(order) => &order.base,
        }
    }

    pub fn as_executed(&self) -> Option<&ExecutedOrder> {
        match self {
            Order::Executed(order) => Some(order),
            Order::Pending(_) => None,
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, Order::Executed(order) if order.processing)
    }
}

impl From<PendingOrder> for Order {
    fn from(order: PendingOrder) -> Self {
        Order::Pending(order)
    }
}

impl From<ExecutedOrder> for Order {
    fn from(order: ExecutedOrder) -> Self {
        Order::Executed(order)
    }
}
