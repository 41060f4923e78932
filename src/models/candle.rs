//! # models::candle
//!
//! Defines [`Candle`], the single shape used for both a raw price tick and a
//! finalized candle.  A tick *becomes* a candle once a later tick with a
//! different timestamp proves its interval is closed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timestamped price sample.
///
/// Transports only guarantee `time` and `close`; the remaining OHLCV fields
/// default to `0.0` when the feed does not send them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Start of the aggregation interval this sample belongs to.
    pub time: DateTime<Utc>,

    #[serde(default)]
    pub open: f64,

    #[serde(default)]
    pub high: f64,

    #[serde(default)]
    pub low: f64,

    /// Last traded price; every order is priced from it.
    pub close: f64,

    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    /// Flat candle where every price field is `price`.
    pub fn from_price(time: DateTime<Utc>, price: f64) -> Self {
        Self {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }

    /// `true` when both samples belong to the same aggregation interval.
    #[inline]
    pub fn same_interval(&self, other: &Candle) -> bool {
        self.time == other.time
    }
}
