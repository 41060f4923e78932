//! # Candlewick — event-driven strategy runner core
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌──────────────┐   subscribe_to_tick    ┌────────────────────────────┐
//!  │  Transport   │ ──────────────────────▶│  StrategyEngine<S>         │
//!  │  (broker)    │ ◀──────────────────────│                            │
//!  └──────────────┘   place_order          │  tick → candle window (10) │
//!                                          │  OrderBook (open orders)   │
//!  ┌──────────────┐   get_history          │                            │
//!  │ HistorySource│ ──────────────────────▶│  learn(days) replays ticks │
//!  └──────────────┘                        └─────────────┬──────────────┘
//!                                                        │ hook points
//!                                          ┌─────────────▼──────────────┐
//!                                          │  HookPipeline              │
//!                                          │  sync · skip · async       │
//!                                          │  Plugin, Plugin, ...       │
//!                                          └────────────────────────────┘
//! ```
//!
//! ## Environment Variables
//!
//! | Variable                   | Default  | Description                     |
//! |----------------------------|----------|---------------------------------|
//! | `STRATEGY_TICKER`          | required | Instrument ticker               |
//! | `STRATEGY_INTERVAL`        | `1min`   | Candle interval                 |
//! | `STRATEGY_AMOUNT`          | required | Capital per order               |
//! | `STRATEGY_BROKER`          | `paper`  | Broker name written into orders |
//! | `RUST_LOG`                 | unset    | Tracing filter                  |
//!
//! See [`config::StrategyOptions::from_env`] for the full list.

pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod models;
pub mod telemetry;
pub mod transport;

pub use config::{StrategyOptions, TimeFrame};
pub use engine::{Disposer, EngineState, Strategy, StrategyEngine};
pub use error::{EngineError, TransportError};
pub use hooks::{HookResult, Plugin, PluginApi, PluginCtx, PluginHook};
pub use models::{Candle, ExecutedOrder, Instrument, Order, OrderType, PendingOrder};
pub use transport::{HistoryRequest, HistorySource, JsonFileHistory, PaperTransport, TickSubscription, Transport};
