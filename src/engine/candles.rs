//! # engine::candles
//!
//! Bounded, most-recent-first window of finalized candles.

use std::collections::VecDeque;

use crate::models::Candle;

/// How many finalized candles the engine keeps.
pub const CANDLE_HISTORY_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct CandleWindow {
    candles: VecDeque<Candle>,
}

impl CandleWindow {
    pub fn new() -> Self {
        Self {
            candles: VecDeque::with_capacity(CANDLE_HISTORY_SIZE + 1),
        }
    }

    /// Pushes `candle` to the front, evicting the oldest when full.
    pub fn push(&mut self, candle: Candle) {
        if self.candles.len() >= CANDLE_HISTORY_SIZE {
            self.candles.pop_back();
        }
        self.candles.push_front(candle);
    }

    /// Most recently finalized candle.
    pub fn latest(&self) -> Option<&Candle> {
        self.candles.front()
    }

    /// `0` is the latest candle.
    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

impl Default for CandleWindow {
    fn default() -> Self {
        Self::new()
    }
}
