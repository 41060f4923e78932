//! # config — per-run strategy options
//!
//! Options are read once at construction and never change during the run.
//! Sources: environment variables (`.env` supported) or a JSON file.

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

// ─── TimeFrame ────────────────────────────────────────────────────────────────

/// Candle sampling interval requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    #[serde(rename = "1min")]
    Min1,
    #[serde(rename = "5min")]
    Min5,
    #[serde(rename = "15min")]
    Min15,
    #[serde(rename = "30min")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "day")]
    Day,
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::Min1 => "1min",
            TimeFrame::Min5 => "5min",
            TimeFrame::Min15 => "15min",
            TimeFrame::Min30 => "30min",
            TimeFrame::Hour1 => "1h",
            TimeFrame::Hour4 => "4h",
            TimeFrame::Day => "day",
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        match self {
            TimeFrame::Min1 => chrono::Duration::minutes(1),
            TimeFrame::Min5 => chrono::Duration::minutes(5),
            TimeFrame::Min15 => chrono::Duration::minutes(15),
            TimeFrame::Min30 => chrono::Duration::minutes(30),
            TimeFrame::Hour1 => chrono::Duration::hours(1),
            TimeFrame::Hour4 => chrono::Duration::hours(4),
            TimeFrame::Day => chrono::Duration::days(1),
        }
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFrame {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "1min" => TimeFrame::Min1,
            "5min" => TimeFrame::Min5,
            "15min" => TimeFrame::Min15,
            "30min" => TimeFrame::Min30,
            "1h" => TimeFrame::Hour1,
            "4h" => TimeFrame::Hour4,
            "day" => TimeFrame::Day,
            other => bail!("Unknown interval: '{other}'. Use 1min, 5min, 15min, 30min, 1h, 4h or day"),
        })
    }
}

// ─── StrategyOptions ──────────────────────────────────────────────────────────

fn one() -> f64 {
    1.0
}

/// Everything the engine needs to know about a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOptions {
    /// Instrument ticker, e.g. `"BTCUSDT"`
    pub ticker: String,
    pub interval: TimeFrame,
    /// Broker identity propagated onto every order
    pub broker: String,
    pub currency: String,
    /// Money allocated to each opened position
    pub amount: f64,
    #[serde(default = "one")]
    pub lots_multiplier: f64,
    /// Fraction of equity the strategy may use, in (0, 1]
    #[serde(default = "one")]
    pub equity_level: f64,
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default)]
    pub margin: bool,
    #[serde(default)]
    pub futures: bool,
}

impl StrategyOptions {
    pub fn new(ticker: impl Into<String>, interval: TimeFrame, amount: f64) -> Self {
        Self {
            ticker: ticker.into(),
            interval,
            broker: "paper".to_string(),
            currency: "USD".to_string(),
            amount,
            lots_multiplier: 1.0,
            equity_level: 1.0,
            sandbox: true,
            margin: false,
            futures: false,
        }
    }

    /// Reads `STRATEGY_*` variables, loading `.env` first when present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ticker = lookup("STRATEGY_TICKER").context("STRATEGY_TICKER is required")?;

        let interval = lookup("STRATEGY_INTERVAL")
            .unwrap_or_else(|| "1min".to_string())
            .parse()?;

        let amount: f64 = lookup("STRATEGY_AMOUNT")
            .context("STRATEGY_AMOUNT is required")?
            .parse()
            .context("STRATEGY_AMOUNT must be a number")?;

        let lots_multiplier: f64 = match lookup("STRATEGY_LOTS_MULTIPLIER") {
            Some(v) => v.parse().context("STRATEGY_LOTS_MULTIPLIER must be a number")?,
            None => 1.0,
        };

        let equity_level: f64 = match lookup("STRATEGY_EQUITY_LEVEL") {
            Some(v) => v.parse().context("STRATEGY_EQUITY_LEVEL must be a number")?,
            None => 1.0,
        };

        let flag = |key: &str| {
            lookup(key)
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };

        let opts = Self {
            ticker,
            interval,
            broker: lookup("STRATEGY_BROKER").unwrap_or_else(|| "paper".to_string()),
            currency: lookup("STRATEGY_CURRENCY").unwrap_or_else(|| "USD".to_string()),
            amount,
            lots_multiplier,
            equity_level,
            sandbox: flag("STRATEGY_SANDBOX"),
            margin: flag("STRATEGY_MARGIN"),
            futures: flag("STRATEGY_FUTURES"),
        };

        opts.validate()?;
        Ok(opts)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read strategy config {}", path.display()))?;
        let opts: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid strategy config {}", path.display()))?;

        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ticker.trim().is_empty() {
            bail!("ticker must not be empty");
        }
        if !(self.amount > 0.0) {
            bail!("amount must be > 0, got {}", self.amount);
        }
        if !(self.lots_multiplier > 0.0) {
            bail!("lots_multiplier must be > 0, got {}", self.lots_multiplier);
        }
        if !(self.equity_level > 0.0 && self.equity_level <= 1.0) {
            bail!("equity_level must be in (0, 1], got {}", self.equity_level);
        }
        Ok(())
    }
}
