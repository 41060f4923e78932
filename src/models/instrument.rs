//! # models::instrument

use serde::{Deserialize, Serialize};

/// Broker-side description of the traded instrument.
///
/// Fetched from the transport at `start()` and again at the start of every
/// `learn()` session; never mutated in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Exchange ticker, e.g. `"BTCUSDT"`, `"SBER"`.
    pub ticker: String,

    /// Broker-specific global identifier (FIGI on brokers that have one,
    /// otherwise the ticker again).
    pub figi: String,

    /// How many units of the asset make up one lot.
    pub lot_size: f64,

    /// Minimal price increment.
    pub pip_size: f64,
}

impl Instrument {
    pub fn new(ticker: impl Into<String>, lot_size: f64, pip_size: f64) -> Self {
        let ticker = ticker.into();
        Self {
            figi: ticker.clone(),
            ticker,
            lot_size,
            pip_size,
        }
    }

    /// Price of a single lot at `price`.
    #[inline]
    pub fn lot_price(&self, price: f64) -> f64 {
        price * self.lot_size
    }
}
