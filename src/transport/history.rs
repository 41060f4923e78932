//! # transport::history
//!
//! File-backed [`HistorySource`]: a JSON array of candles (any order) from
//! which the requested lookback window is cut, measured back from the newest
//! tick in the file.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use crate::models::Candle;
use crate::transport::{HistoryRequest, HistorySource};

#[derive(Debug, Clone)]
pub struct JsonFileHistory {
    path: PathBuf,
}

impl JsonFileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl HistorySource for JsonFileHistory {
    async fn get_history(&self, request: HistoryRequest) -> anyhow::Result<Vec<Candle>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("cannot read history file {}", self.path.display()))?;

        let mut ticks: Vec<Candle> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid history file {}", self.path.display()))?;

        // stable: ticks sharing a timestamp keep file order
        ticks.sort_by_key(|tick| tick.time);

        let Some(newest) = ticks.last().map(|tick| tick.time) else {
            return Ok(ticks);
        };

        let end = newest - chrono::Duration::days(i64::from(request.gap_days));
        let start = end - chrono::Duration::days(i64::from(request.days));
        ticks.retain(|tick| tick.time >= start && tick.time <= end);

        debug!(
            ticker = %request.ticker,
            days = request.days,
            gap_days = request.gap_days,
            ticks = ticks.len(),
            "History window loaded"
        );

        Ok(ticks)
    }
}
