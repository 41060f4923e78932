//! Domain models shared across the engine, the hook pipeline and transports.

pub mod candle;
pub mod instrument;
pub mod order;

pub use candle::Candle;
pub use instrument::Instrument;
pub use order::{ExecutedOrder, Order, OrderType, PendingOrder};
