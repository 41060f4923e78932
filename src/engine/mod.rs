//! # engine
//!
//! **Strategy Engine** — tick ingestion, candle finalization and the
//! open/close order protocols.  Every side effect is bracketed by hook
//! dispatch through the [`HookPipeline`].
//!
//! ## Per tick
//! ```text
//! 1. Tick skip hook            → any plugin may drop the tick
//! 2. Interval changed?         → previous tick exists and its time differs
//! 3. Current tick ← new tick
//! 4. If changed: push previous tick into the candle window
//!      onCandle → Strategy::on_candle → onAfterCandle
//! 5. Strategy::on_tick
//! ```
//!
//! A candle is only known to be closed once the next interval's first tick
//! arrives, so finalization always trails the boundary by one tick.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::StrategyOptions;
use crate::error::EngineError;
use crate::hooks::{AsyncHook, HookPipeline, Plugin, PluginApi, SkipHook, SyncHook};
use crate::models::{Candle, ExecutedOrder, Instrument, Order, OrderType, PendingOrder};
use crate::transport::{HistoryRequest, HistorySource, TickSubscription, Transport};

pub mod candles;
pub mod orders;

pub use candles::{CandleWindow, CANDLE_HISTORY_SIZE};
pub use orders::{CidGenerator, OrderBook};

// ─── Strategy extension points ────────────────────────────────────────────────

/// What a concrete strategy plugs into the engine.
///
/// Each extension point receives the engine itself, so a strategy can place
/// or close orders from inside it and reach its own fields through
/// [`StrategyEngine::strategy`] / [`StrategyEngine::strategy_mut`].
#[async_trait]
pub trait Strategy: Sized + Send + Sync + 'static {
    /// Written into every order's `author` field.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        // `a::b::Foo<c::Bar>` → `Foo`
        let path = full.split('<').next().unwrap_or(full);
        path.rsplit("::").next().unwrap_or(path)
    }

    async fn on_tick(_engine: &mut StrategyEngine<Self>, _tick: &Candle) -> Result<(), EngineError> {
        Ok(())
    }

    async fn on_candle(_engine: &mut StrategyEngine<Self>, _candle: &Candle) -> Result<(), EngineError> {
        Ok(())
    }

    async fn on_order_opened(
        _engine: &mut StrategyEngine<Self>,
        _order: &ExecutedOrder,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    async fn on_order_closed(
        _engine: &mut StrategyEngine<Self>,
        _order: &ExecutedOrder,
        _closing: &ExecutedOrder,
    ) -> Result<(), EngineError> {
        Ok(())
    }
}

// ─── EngineState ──────────────────────────────────────────────────────────────

/// Engine state readable by plugins (through `PluginCtx::engine`) and by
/// strategies.  Only the engine mutates it.
#[derive(Debug)]
pub struct EngineState {
    opts: StrategyOptions,
    instrument: Option<Instrument>,
    orders: OrderBook,
    candles: CandleWindow,
    /// In-progress (not yet finalized) tick.
    market_tick: Option<Candle>,
    learning: bool,
    plugins: PluginApi,
}

impl EngineState {
    pub(crate) fn new(opts: StrategyOptions) -> Self {
        Self {
            opts,
            instrument: None,
            orders: OrderBook::new(),
            candles: CandleWindow::new(),
            market_tick: None,
            learning: false,
            plugins: PluginApi::default(),
        }
    }

    pub fn opts(&self) -> &StrategyOptions {
        &self.opts
    }

    pub fn instrument(&self) -> Option<&Instrument> {
        self.instrument.as_ref()
    }

    /// Open positions, oldest first.
    pub fn orders(&self) -> &[Order] {
        self.orders.as_slice()
    }

    /// Last finalized candle.
    pub fn prev_candle(&self) -> Option<&Candle> {
        self.candles.latest()
    }

    /// Current tick, not finalized yet.
    pub fn current_candle(&self) -> Option<&Candle> {
        self.market_tick.as_ref()
    }

    pub fn candles(&self) -> &CandleWindow {
        &self.candles
    }

    pub fn is_learning(&self) -> bool {
        self.learning
    }

    /// Capability objects published by registered plugins.
    pub fn plugins(&self) -> &PluginApi {
        &self.plugins
    }
}

// ─── Disposer ─────────────────────────────────────────────────────────────────

/// Returned by [`StrategyEngine::start`]; stops [`StrategyEngine::run`].
///
/// Consumed on use.  Dropping it without calling `dispose` leaves the engine
/// running.
#[derive(Debug)]
pub struct Disposer {
    stop: Arc<Notify>,
}

impl Disposer {
    pub fn dispose(self) {
        self.stop.notify_one();
    }
}

// ─── StrategyEngine ───────────────────────────────────────────────────────────

pub struct StrategyEngine<S> {
    id: Uuid,
    state: EngineState,
    pipeline: HookPipeline,
    transport: Arc<dyn Transport>,
    history: Option<Arc<dyn HistorySource>>,
    strategy: S,
    cids: CidGenerator,
    subscription: Option<TickSubscription>,
    stop: Arc<Notify>,
}

impl<S: Strategy> StrategyEngine<S> {
    pub fn new(transport: Arc<dyn Transport>, opts: StrategyOptions, strategy: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: EngineState::new(opts),
            pipeline: HookPipeline::new(),
            transport,
            history: None,
            strategy,
            cids: CidGenerator::new(),
            subscription: None,
            stop: Arc::new(Notify::new()),
        }
    }

    /// Data source replayed by [`learn`](Self::learn).
    pub fn with_history(mut self, history: Arc<dyn HistorySource>) -> Self {
        self.history = Some(history);
        self
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn opts(&self) -> &StrategyOptions {
        self.state.opts()
    }

    pub fn instrument(&self) -> Option<&Instrument> {
        self.state.instrument()
    }

    pub fn orders(&self) -> &[Order] {
        self.state.orders()
    }

    pub fn prev_candle(&self) -> Option<&Candle> {
        self.state.prev_candle()
    }

    pub fn current_candle(&self) -> Option<&Candle> {
        self.state.current_candle()
    }

    pub fn plugins(&self) -> &PluginApi {
        self.state.plugins()
    }

    pub fn is_learning(&self) -> bool {
        self.state.is_learning()
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Registers `plugins` in order, publishes their API namespace, then
    /// fires the ready hook.  Call before [`start`](Self::start).
    pub fn register_plugins<I>(&mut self, plugins: I)
    where
        I: IntoIterator<Item = Arc<dyn Plugin>>,
    {
        self.pipeline.register(plugins, &self.state);
        self.state.plugins = self.pipeline.public_api();
        self.pipeline.sync_reduce(&self.state, SyncHook::Ready);

        debug!(engine = %self.id, plugins = self.pipeline.len(), "Plugins registered");
    }

    /// Runs the start hooks, resolves the instrument and subscribes to ticks.
    /// Ticks are consumed by [`run`](Self::run).
    pub async fn start(&mut self) -> Result<Disposer, EngineError> {
        self.pipeline.async_reduce(&self.state, AsyncHook::Start).await?;

        let ticker = self.state.opts.ticker.clone();
        let instrument = self.transport.get_instrument(&ticker).await?;
        self.state.instrument = Some(instrument);

        let subscription = self
            .transport
            .subscribe_to_tick(&ticker, self.state.opts.interval)
            .await?;

        if let Some(previous) = self.subscription.replace(subscription) {
            warn!(engine = %self.id, "start() called twice, dropping previous subscription");
            previous.unsubscribe();
        }

        info!(
            engine   = %self.id,
            strategy = self.strategy.name(),
            ticker   = %ticker,
            interval = %self.state.opts.interval,
            "🚀 Strategy started"
        );

        Ok(Disposer {
            stop: Arc::clone(&self.stop),
        })
    }

    /// Feeds subscribed ticks through the handler until the stream ends or
    /// the [`Disposer`] fires, then disposes the engine.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        if self.subscription.is_none() {
            return Err(EngineError::NotStarted);
        }

        let stop = Arc::clone(&self.stop);
        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                break;
            };

            let tick = tokio::select! {
                biased;
                _ = stop.notified() => None,
                tick = subscription.recv() => tick,
            };

            match tick {
                Some(tick) => self.handle_tick(tick).await?,
                None => break,
            }
        }

        self.dispose().await
    }

    /// Closes every position, unsubscribes, then fires the dispose hooks.
    /// A no-op when the engine is not subscribed.
    pub async fn dispose(&mut self) -> Result<(), EngineError> {
        let Some(subscription) = self.subscription.take() else {
            return Ok(());
        };

        let closed = self.close_all().await;
        subscription.unsubscribe();
        let closed = closed?;

        info!(engine = %self.id, closed = closed.len(), "🛑 Strategy disposed");

        self.pipeline.async_reduce(&self.state, AsyncHook::Dispose).await
    }

    /// Replays `days` of history through the live tick path.  Orders created
    /// meanwhile carry `learning = true`.
    pub async fn learn(&mut self, days: u32) -> Result<(), EngineError> {
        let history = self.history.clone().ok_or(EngineError::NoHistorySource)?;

        let instrument = self.transport.get_instrument(&self.state.opts.ticker).await?;
        self.state.instrument = Some(instrument);

        self.state.learning = true;
        let result = self.replay(history.as_ref(), days).await;
        self.state.learning = false;

        result
    }

    async fn replay(&mut self, history: &dyn HistorySource, days: u32) -> Result<(), EngineError> {
        let request = HistoryRequest {
            broker: self.state.opts.broker.clone(),
            ticker: self.state.opts.ticker.clone(),
            days,
            interval: self.state.opts.interval,
            gap_days: 0,
        };

        let ticks = history.get_history(request).await.map_err(EngineError::History)?;
        info!(engine = %self.id, days, ticks = ticks.len(), "📚 Learning on history");

        for tick in ticks {
            self.handle_tick(tick).await?;
        }
        Ok(())
    }

    // ── Tick ingestion ────────────────────────────────────────────────────────

    pub(crate) async fn handle_tick(&mut self, tick: Candle) -> Result<(), EngineError> {
        // ── 1. Tick skip hook ─────────────────────────────────────────────────
        if self.pipeline.skip_reduce(&self.state, SkipHook::Tick(&tick)) {
            return Ok(());
        }

        // ── 2-3. Swap current tick ────────────────────────────────────────────
        let prev = self.state.market_tick.replace(tick.clone());

        // ── 4. Finalize previous tick on interval change ──────────────────────
        if let Some(candle) = prev.filter(|prev| !prev.same_interval(&tick)) {
            self.state.candles.push(candle.clone());

            self.pipeline.async_reduce(&self.state, AsyncHook::Candle(&candle)).await?;
            S::on_candle(self, &candle).await?;
            self.pipeline
                .async_reduce(&self.state, AsyncHook::AfterCandle(&candle))
                .await?;
        }

        // ── 5. Raw tick ───────────────────────────────────────────────────────
        S::on_tick(self, &tick).await
    }

    // ── Orders ────────────────────────────────────────────────────────────────

    /// Closes every open position, oldest first, one at a time.  Positions
    /// whose close fails stay in the collection.
    pub async fn close_all(&mut self) -> Result<Vec<ExecutedOrder>, EngineError> {
        let cids: Vec<u64> = self.state.orders().iter().map(Order::cid).collect();
        let mut closed = Vec::with_capacity(cids.len());

        for cid in cids {
            // an earlier close (or its hooks) may have removed it already
            let Some(order) = self.state.orders.get(cid).cloned() else {
                continue;
            };

            if let Some(executed) = self.close_order(&order).await? {
                closed.push(executed);
            }
        }

        Ok(closed)
    }

    /// Opens a position at the current tick price.
    ///
    /// `Ok(None)` when a plugin skipped the open or the transport failed; the
    /// failure is logged and the optimistic insert rolled back.
    pub async fn create_order(&mut self, side: OrderType) -> Result<Option<ExecutedOrder>, EngineError> {
        let pending = self.build_open_order(side)?;

        if self.pipeline.skip_reduce(&self.state, SkipHook::BeforeOpen(&pending)) {
            debug!(cid = pending.cid, "Open skipped by plugin");
            return Ok(None);
        }

        self.state.orders.push_pending(pending.clone());

        info!(
            cid      = pending.cid,
            side     = ?pending.order_type,
            ticker   = %pending.ticker,
            price    = pending.price,
            lots     = pending.lots,
            learning = pending.learning,
            "📤 Opening order"
        );

        let order = match self.transport.place_order(pending.clone()).await {
            Ok(order) => order,
            Err(e) => {
                error!(cid = pending.cid, error = %e, "❌ Order open failed");
                self.state.orders.remove(pending.cid);
                return Ok(None);
            }
        };

        let hooks = self.after_open(&order).await;
        // the broker holds the position now; keep it visible even if a hook failed
        self.state.orders.replace_pending(order.clone());
        hooks?;

        Ok(Some(order))
    }

    async fn after_open(&mut self, order: &ExecutedOrder) -> Result<(), EngineError> {
        self.pipeline.async_reduce(&self.state, AsyncHook::Open(order)).await?;
        S::on_order_opened(self, order).await
    }

    /// Closes an executed position at the current tick price.
    ///
    /// No-op for pending orders, orders already being closed and orders the
    /// engine no longer tracks.  On transport failure the position is put
    /// back at the front of the collection.
    pub async fn close_order(&mut self, order: &Order) -> Result<Option<ExecutedOrder>, EngineError> {
        let Some(target) = order.as_executed() else {
            return Ok(None);
        };

        // mid-close copies are gone from the collection: bail out silently
        if target.processing {
            return Ok(None);
        }

        let Some(live) = self.state.orders.get(target.cid()) else {
            warn!(cid = target.cid(), order_id = %target.order_id, "Close requested for unknown order");
            return Ok(None);
        };

        if live.is_processing() {
            return Ok(None);
        }

        let pending = self.build_close_order(target)?;

        let mut closing = target.clone();
        closing.processing = true;
        self.state.orders.set_processing(closing.cid(), true);

        let result = self.close_guarded(pending, &closing).await;

        // released on every exit path
        self.state.orders.set_processing(closing.cid(), false);

        result
    }

    async fn close_guarded(
        &mut self,
        pending: PendingOrder,
        closing: &ExecutedOrder,
    ) -> Result<Option<ExecutedOrder>, EngineError> {
        if self
            .pipeline
            .skip_reduce(&self.state, SkipHook::BeforeClose(&pending, closing))
        {
            debug!(cid = closing.cid(), "Close skipped by plugin");
            return Ok(None);
        }

        self.state.orders.remove(closing.cid());

        info!(
            cid      = pending.cid,
            open_id  = %closing.order_id,
            side     = ?pending.order_type,
            price    = pending.price,
            lots     = pending.lots,
            "📥 Closing order"
        );

        let order = match self.transport.place_order(pending).await {
            Ok(order) => order,
            Err(e) => {
                error!(open_id = %closing.order_id, error = %e, "❌ Order close failed");

                if !self.state.orders.contains(closing.cid()) {
                    let mut restored = closing.clone();
                    restored.processing = false;
                    self.state.orders.push_front(restored);
                }
                return Ok(None);
            }
        };

        self.pipeline
            .async_reduce(&self.state, AsyncHook::Close(&order, closing))
            .await?;
        S::on_order_closed(self, &order, closing).await?;

        Ok(Some(order))
    }

    fn build_open_order(&mut self, side: OrderType) -> Result<PendingOrder, EngineError> {
        let tick = self.state.market_tick.as_ref().ok_or(EngineError::NoMarketTick)?;
        let instrument = self.state.instrument.as_ref().ok_or(EngineError::NoInstrument)?;
        let opts = &self.state.opts;

        let raw_lots = (opts.amount / instrument.lot_price(tick.close)) * opts.lots_multiplier;
        let lots = self.transport.prepare_lots(raw_lots, &instrument.ticker);

        Ok(PendingOrder {
            cid: self.cids.next_cid(),
            broker: opts.broker.clone(),
            order_type: side,
            ticker: instrument.ticker.clone(),
            figi: instrument.figi.clone(),
            currency: opts.currency.clone(),
            interval: opts.interval,
            author: self.strategy.name().to_string(),
            price: tick.close,
            lots,
            lot_size: instrument.lot_size,
            pip_size: instrument.pip_size,
            close: false,
            open_id: None,
            open_price: None,
            sandbox: opts.sandbox,
            learning: self.state.learning,
            time: tick.time,
            margin: opts.margin,
            futures: opts.futures,
            lots_multiplier: opts.lots_multiplier,
            equity_level: opts.equity_level,
        })
    }

    fn build_close_order(&mut self, closing: &ExecutedOrder) -> Result<PendingOrder, EngineError> {
        let tick = self.state.market_tick.as_ref().ok_or(EngineError::NoMarketTick)?;
        let instrument = self.state.instrument.as_ref().ok_or(EngineError::NoInstrument)?;
        let opts = &self.state.opts;

        let lots = self
            .transport
            .prepare_lots(closing.executed_lots * instrument.lot_size, &instrument.ticker);

        Ok(PendingOrder {
            cid: self.cids.next_cid(),
            broker: opts.broker.clone(),
            order_type: closing.base.order_type.inverse(),
            ticker: instrument.ticker.clone(),
            figi: instrument.figi.clone(),
            currency: opts.currency.clone(),
            interval: opts.interval,
            author: self.strategy.name().to_string(),
            price: tick.close,
            lots,
            lot_size: instrument.lot_size,
            pip_size: instrument.pip_size,
            close: true,
            open_id: Some(closing.order_id.clone()),
            open_price: Some(closing.base.price),
            sandbox: closing.base.sandbox,
            learning: closing.base.learning,
            time: tick.time,
            margin: opts.margin,
            futures: closing.base.futures,
            lots_multiplier: opts.lots_multiplier,
            equity_level: opts.equity_level,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeFrame;
    use crate::hooks::{ApiObject, HookResult, PluginCtx, PluginHook};
    use crate::telemetry::capture::WarnCounter;
    use crate::transport::PaperTransport;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + chrono::Duration::minutes(minute)
    }

    fn paper() -> Arc<PaperTransport> {
        Arc::new(PaperTransport::new(Instrument::new("BTCUSDT", 1.0, 0.01)))
    }

    fn events(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    // ── Test strategy ─────────────────────────────────────────────────────────

    #[derive(Default)]
    struct Probe {
        log: Log,
        open_on_candle: bool,
        reclose_on_closed: bool,
        reclose_result: Option<bool>,
    }

    impl Probe {
        fn push(&self, event: impl Into<String>) {
            self.log.lock().unwrap().push(event.into());
        }
    }

    #[async_trait]
    impl Strategy for Probe {
        async fn on_tick(engine: &mut StrategyEngine<Self>, tick: &Candle) -> Result<(), EngineError> {
            engine.strategy().push(format!("strategy:tick:{}", tick.close));
            Ok(())
        }

        async fn on_candle(engine: &mut StrategyEngine<Self>, candle: &Candle) -> Result<(), EngineError> {
            engine.strategy().push(format!("strategy:candle:{}", candle.close));
            if engine.strategy().open_on_candle {
                engine.create_order(OrderType::Buy).await?;
            }
            Ok(())
        }

        async fn on_order_opened(
            engine: &mut StrategyEngine<Self>,
            _order: &ExecutedOrder,
        ) -> Result<(), EngineError> {
            engine.strategy().push("strategy:opened");
            Ok(())
        }

        async fn on_order_closed(
            engine: &mut StrategyEngine<Self>,
            _order: &ExecutedOrder,
            closing: &ExecutedOrder,
        ) -> Result<(), EngineError> {
            engine.strategy().push("strategy:closed");
            if engine.strategy().reclose_on_closed {
                let again = engine.close_order(&Order::Executed(closing.clone())).await?;
                engine.strategy_mut().reclose_result = Some(again.is_some());
            }
            Ok(())
        }
    }

    // ── Test plugin ───────────────────────────────────────────────────────────

    #[derive(Default)]
    struct Tracer {
        log: Log,
        skip_open: bool,
        skip_close: bool,
        skip_tick_at: Option<f64>,
        fail_open: bool,
        api_value: u32,
        /// Whether `on_before_close` saw the guard set on both copies.
        closing_guarded: Mutex<Option<bool>>,
        /// What `ctx.api("tracer")` returned in `on_ready`.
        ready_api: Mutex<Option<u32>>,
    }

    impl Tracer {
        fn push(&self, event: impl Into<String>) {
            self.log.lock().unwrap().push(event.into());
        }
    }

    #[async_trait]
    impl Plugin for Tracer {
        fn name(&self) -> &str {
            "tracer"
        }

        fn api(&self) -> Option<ApiObject> {
            Some(Arc::new(self.api_value))
        }

        fn on_ready(&self, ctx: &PluginCtx<'_>) {
            *self.ready_api.lock().unwrap() = ctx.api::<u32>("tracer").map(|v| *v);
            self.push(format!("plugin:ready:{}", ctx.engine().plugins().contains("tracer")));
        }

        fn on_before_open(&self, _ctx: &PluginCtx<'_>, _order: &PendingOrder) -> bool {
            self.skip_open
        }

        fn on_before_close(&self, ctx: &PluginCtx<'_>, _order: &PendingOrder, closing: &ExecutedOrder) -> bool {
            let live = ctx
                .engine()
                .orders()
                .iter()
                .any(|o| o.cid() == closing.cid() && o.is_processing());
            *self.closing_guarded.lock().unwrap() = Some(closing.processing && live);
            self.skip_close
        }

        fn on_tick(&self, _ctx: &PluginCtx<'_>, tick: &Candle) -> bool {
            self.skip_tick_at == Some(tick.close)
        }

        async fn on_open(&self, _ctx: &PluginCtx<'_>, _order: &ExecutedOrder) -> HookResult {
            self.push("plugin:open");
            if self.fail_open {
                anyhow::bail!("open hook failed");
            }
            Ok(())
        }

        async fn on_close(&self, _ctx: &PluginCtx<'_>, _order: &ExecutedOrder, _closing: &ExecutedOrder) -> HookResult {
            self.push("plugin:close");
            Ok(())
        }

        async fn on_candle(&self, ctx: &PluginCtx<'_>, candle: &Candle) -> HookResult {
            // window already holds the candle being announced
            assert_eq!(ctx.engine().prev_candle(), Some(candle));
            self.push(format!("plugin:candle:{}", candle.close));
            Ok(())
        }

        async fn on_after_candle(&self, _ctx: &PluginCtx<'_>, candle: &Candle) -> HookResult {
            self.push(format!("plugin:after_candle:{}", candle.close));
            Ok(())
        }

        async fn on_start(&self, _ctx: &PluginCtx<'_>) -> HookResult {
            self.push("plugin:start");
            Ok(())
        }

        async fn on_dispose(&self, ctx: &PluginCtx<'_>) -> HookResult {
            self.push(format!("plugin:dispose:{}", ctx.engine().orders().len()));
            Ok(())
        }
    }

    // ── History doubles ───────────────────────────────────────────────────────

    struct VecHistory(Vec<Candle>);

    #[async_trait]
    impl HistorySource for VecHistory {
        async fn get_history(&self, _request: HistoryRequest) -> anyhow::Result<Vec<Candle>> {
            Ok(self.0.clone())
        }
    }

    struct FailingHistory;

    #[async_trait]
    impl HistorySource for FailingHistory {
        async fn get_history(&self, _request: HistoryRequest) -> anyhow::Result<Vec<Candle>> {
            anyhow::bail!("feed offline")
        }
    }

    // ── Setup ─────────────────────────────────────────────────────────────────

    fn new_engine(transport: &Arc<PaperTransport>, strategy: Probe) -> StrategyEngine<Probe> {
        StrategyEngine::new(
            transport.clone(),
            StrategyOptions::new("BTCUSDT", TimeFrame::Min1, 100.0),
            strategy,
        )
    }

    /// Started engine (instrument resolved) with one tick at price 100.
    async fn primed(
        transport: &Arc<PaperTransport>,
        strategy: Probe,
        tracer: Option<Arc<Tracer>>,
    ) -> StrategyEngine<Probe> {
        let mut engine = new_engine(transport, strategy);
        if let Some(tracer) = tracer {
            let plugin: Arc<dyn Plugin> = tracer;
            engine.register_plugins([plugin]);
        }
        engine.start().await.unwrap();
        engine.handle_tick(Candle::from_price(t(0), 100.0)).await.unwrap();
        engine
    }

    struct Wrapped<T>(std::marker::PhantomData<T>);

    impl<T: Send + Sync + 'static> Strategy for Wrapped<T> {}

    #[test]
    fn test_strategy_name_is_short_type_name() {
        assert_eq!(Probe::default().name(), "Probe");
        assert_eq!(Wrapped::<Vec<u8>>(std::marker::PhantomData).name(), "Wrapped");
    }

    // ── Orders ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_open_then_close_round_trip() {
        let transport = paper();
        let mut engine = primed(&transport, Probe::default(), None).await;

        let opened = engine.create_order(OrderType::Buy).await.unwrap().unwrap();
        assert_eq!(opened.base.lots, 1.0);
        assert!(!opened.base.close);
        assert_eq!(opened.base.order_type, OrderType::Buy);
        assert_eq!(opened.base.author, "Probe");
        assert_eq!(engine.orders().len(), 1);
        assert_eq!(
            engine.orders()[0].as_executed().map(|o| o.order_id.as_str()),
            Some("paper-1")
        );

        engine.handle_tick(Candle::from_price(t(1), 110.0)).await.unwrap();
        let order = engine.orders()[0].clone();
        let closed = engine.close_order(&order).await.unwrap().unwrap();

        assert!(closed.base.close);
        assert_eq!(closed.base.order_type, OrderType::Sell);
        assert_eq!(closed.base.open_price, Some(100.0));
        assert_eq!(closed.base.open_id.as_deref(), Some("paper-1"));
        assert_eq!(closed.base.price, 110.0);
        assert_eq!(closed.base.lots, 1.0);
        assert!(engine.orders().is_empty());
    }

    #[tokio::test]
    async fn test_failed_open_leaves_collection_unchanged() {
        let transport = paper();
        let mut engine = primed(&transport, Probe::default(), None).await;
        transport.reject_next("insufficient funds");

        assert!(engine.create_order(OrderType::Buy).await.unwrap().is_none());
        assert!(engine.orders().is_empty());
        assert_eq!(transport.placed_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_skipped_open_never_reaches_transport() {
        let transport = paper();
        let tracer = Arc::new(Tracer {
            skip_open: true,
            ..Default::default()
        });
        let mut engine = primed(&transport, Probe::default(), Some(tracer)).await;

        assert!(engine.create_order(OrderType::Sell).await.unwrap().is_none());
        assert!(engine.orders().is_empty());
        assert!(transport.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn test_open_requires_tick_and_instrument() {
        let transport = paper();

        let mut started = new_engine(&transport, Probe::default());
        started.start().await.unwrap();
        assert!(matches!(
            started.create_order(OrderType::Buy).await,
            Err(EngineError::NoMarketTick)
        ));

        let mut idle = new_engine(&transport, Probe::default());
        idle.handle_tick(Candle::from_price(t(0), 100.0)).await.unwrap();
        assert!(matches!(
            idle.create_order(OrderType::Buy).await,
            Err(EngineError::NoInstrument)
        ));
    }

    #[tokio::test]
    async fn test_open_hook_error_propagates_and_position_stays_visible() {
        let transport = paper();
        let tracer = Arc::new(Tracer {
            fail_open: true,
            ..Default::default()
        });
        let mut engine = primed(&transport, Probe::default(), Some(tracer)).await;

        let err = engine.create_order(OrderType::Buy).await.unwrap_err();
        assert!(matches!(err, EngineError::Hook { hook: PluginHook::Open, .. }));
        assert_eq!(engine.orders().len(), 1);
        assert!(engine.orders()[0].as_executed().is_some());
    }

    #[tokio::test]
    async fn test_close_pending_is_noop() {
        let transport = paper();
        let mut engine = primed(&transport, Probe::default(), None).await;
        let opened = engine.create_order(OrderType::Buy).await.unwrap().unwrap();

        let pending = Order::Pending(opened.base.clone());
        assert!(engine.close_order(&pending).await.unwrap().is_none());
        assert_eq!(engine.orders().len(), 1);
        assert_eq!(transport.placed_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_skipped_close_releases_processing() {
        let transport = paper();
        let tracer = Arc::new(Tracer {
            skip_close: true,
            ..Default::default()
        });
        let mut engine = primed(&transport, Probe::default(), Some(tracer.clone())).await;
        engine.create_order(OrderType::Buy).await.unwrap().unwrap();

        let order = engine.orders()[0].clone();
        assert!(engine.close_order(&order).await.unwrap().is_none());

        assert_eq!(*tracer.closing_guarded.lock().unwrap(), Some(true));
        assert_eq!(engine.orders().len(), 1);
        assert!(!engine.orders()[0].is_processing());
    }

    #[tokio::test]
    async fn test_failed_close_reinserts_at_front() {
        let transport = paper();
        let mut engine = primed(&transport, Probe::default(), None).await;
        let first = engine.create_order(OrderType::Buy).await.unwrap().unwrap();
        let second = engine.create_order(OrderType::Buy).await.unwrap().unwrap();

        transport.reject_next("market closed");
        let target = Order::Executed(second.clone());
        assert!(engine.close_order(&target).await.unwrap().is_none());

        let cids: Vec<u64> = engine.orders().iter().map(Order::cid).collect();
        assert_eq!(cids, vec![second.cid(), first.cid()]);
        assert!(engine.orders().iter().all(|o| !o.is_processing()));
    }

    #[tokio::test]
    async fn test_reentrant_close_is_noop() {
        let transport = paper();
        let probe = Probe {
            reclose_on_closed: true,
            ..Default::default()
        };
        let mut engine = primed(&transport, probe, None).await;
        engine.create_order(OrderType::Buy).await.unwrap().unwrap();

        let warnings = WarnCounter::default();
        let _guard = warnings.install();

        let order = engine.orders()[0].clone();
        assert!(engine.close_order(&order).await.unwrap().is_some());

        assert_eq!(engine.strategy().reclose_result, Some(false));
        // one open plus exactly one close
        assert_eq!(transport.placed_orders().len(), 2);
        // the guard rejects it without logging
        assert_eq!(warnings.count(), 0);
    }

    #[tokio::test]
    async fn test_close_while_live_entry_processing_is_noop() {
        let transport = paper();
        let mut engine = primed(&transport, Probe::default(), None).await;
        let opened = engine.create_order(OrderType::Buy).await.unwrap().unwrap();
        engine.state.orders.set_processing(opened.cid(), true);

        let warnings = WarnCounter::default();
        let _guard = warnings.install();

        // stale copy without the flag; the live entry carries it
        assert!(engine.close_order(&Order::Executed(opened)).await.unwrap().is_none());
        assert_eq!(transport.placed_orders().len(), 1);
        assert_eq!(engine.orders().len(), 1);
        assert_eq!(warnings.count(), 0);
    }

    #[tokio::test]
    async fn test_close_unknown_order_is_noop() {
        let transport = paper();
        let mut engine = primed(&transport, Probe::default(), None).await;
        let opened = engine.create_order(OrderType::Buy).await.unwrap().unwrap();
        engine.close_order(&Order::Executed(opened.clone())).await.unwrap().unwrap();

        assert!(engine.close_order(&Order::Executed(opened)).await.unwrap().is_none());
        assert_eq!(transport.placed_orders().len(), 2);
    }

    #[tokio::test]
    async fn test_close_all_success_and_partial_failure() {
        let transport = paper();
        let mut engine = primed(&transport, Probe::default(), None).await;
        for _ in 0..3 {
            engine.create_order(OrderType::Buy).await.unwrap().unwrap();
        }
        assert_eq!(engine.close_all().await.unwrap().len(), 3);
        assert!(engine.orders().is_empty());

        let mut cids = Vec::new();
        for _ in 0..3 {
            cids.push(engine.create_order(OrderType::Sell).await.unwrap().unwrap().cid());
        }
        transport.fill_next();
        transport.reject_next("throttled");
        transport.fill_next();

        let closed = engine.close_all().await.unwrap();
        assert_eq!(closed.len(), 2);
        assert!(closed.iter().all(|o| o.base.order_type == OrderType::Buy));

        let left: Vec<u64> = engine.orders().iter().map(Order::cid).collect();
        assert_eq!(left, vec![cids[1]]);
        assert!(!engine.orders()[0].is_processing());
    }

    #[tokio::test]
    async fn test_close_all_on_empty_collection() {
        let transport = paper();
        let mut engine = primed(&transport, Probe::default(), None).await;
        assert!(engine.close_all().await.unwrap().is_empty());
    }

    // ── Ticks & candles ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_hook_order_per_tick() {
        let transport = paper();
        let log = Log::default();
        let tracer = Arc::new(Tracer {
            log: log.clone(),
            ..Default::default()
        });
        let probe = Probe {
            log: log.clone(),
            ..Default::default()
        };
        let mut engine = primed(&transport, probe, Some(tracer)).await;
        log.lock().unwrap().clear();

        engine.handle_tick(Candle::from_price(t(1), 101.0)).await.unwrap();

        assert_eq!(
            events(&log),
            vec![
                "plugin:candle:100",
                "strategy:candle:100",
                "plugin:after_candle:100",
                "strategy:tick:101",
            ]
        );
    }

    #[tokio::test]
    async fn test_skipped_tick_changes_nothing() {
        let transport = paper();
        let log = Log::default();
        let tracer = Arc::new(Tracer {
            skip_tick_at: Some(999.0),
            ..Default::default()
        });
        let probe = Probe {
            log: log.clone(),
            ..Default::default()
        };
        let mut engine = primed(&transport, probe, Some(tracer)).await;
        log.lock().unwrap().clear();

        engine.handle_tick(Candle::from_price(t(1), 999.0)).await.unwrap();

        assert_eq!(engine.current_candle().map(|c| c.close), Some(100.0));
        assert!(engine.prev_candle().is_none());
        assert!(events(&log).is_empty());
    }

    #[tokio::test]
    async fn test_candle_window_keeps_latest_ten() {
        let transport = paper();
        let mut engine = new_engine(&transport, Probe::default());
        for i in 0..25 {
            engine.handle_tick(Candle::from_price(t(i), i as f64)).await.unwrap();
        }

        let candles = engine.state().candles();
        assert_eq!(candles.len(), CANDLE_HISTORY_SIZE);
        assert_eq!(engine.prev_candle().map(|c| c.close), Some(23.0));
        assert_eq!(candles.get(9).map(|c| c.close), Some(14.0));
        assert_eq!(engine.current_candle().map(|c| c.close), Some(24.0));
    }

    // ── Learning ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_identical_timestamps_finalize_once() {
        let transport = paper();
        let history = VecHistory(vec![
            Candle::from_price(t(0), 100.0),
            Candle::from_price(t(0), 101.0),
            Candle::from_price(t(1), 102.0),
        ]);
        let mut engine = new_engine(&transport, Probe::default()).with_history(Arc::new(history));

        engine.learn(1).await.unwrap();

        assert_eq!(engine.state().candles().len(), 1);
        assert_eq!(engine.prev_candle().map(|c| c.close), Some(101.0));
        assert_eq!(engine.current_candle().map(|c| c.close), Some(102.0));
        assert!(!engine.is_learning());
    }

    #[tokio::test]
    async fn test_orders_opened_while_learning_are_flagged() {
        let transport = paper();
        let history = VecHistory(vec![Candle::from_price(t(0), 100.0), Candle::from_price(t(1), 100.0)]);
        let probe = Probe {
            open_on_candle: true,
            ..Default::default()
        };
        let mut engine = new_engine(&transport, probe).with_history(Arc::new(history));

        engine.learn(1).await.unwrap();
        let live = engine.create_order(OrderType::Buy).await.unwrap().unwrap();

        let placed = transport.placed_orders();
        assert_eq!(placed.len(), 2);
        assert!(placed[0].learning);
        assert!(!live.base.learning);
        assert_eq!(transport.instrument_requests(), 1);
    }

    #[tokio::test]
    async fn test_learn_failure_clears_flag() {
        let transport = paper();
        let mut engine = new_engine(&transport, Probe::default()).with_history(Arc::new(FailingHistory));

        assert!(matches!(engine.learn(3).await, Err(EngineError::History(_))));
        assert!(!engine.is_learning());

        let mut bare = new_engine(&transport, Probe::default());
        assert!(matches!(bare.learn(3).await, Err(EngineError::NoHistorySource)));
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_register_publishes_api_before_ready() {
        let transport = paper();
        let log = Log::default();
        let tracer: Arc<dyn Plugin> = Arc::new(Tracer {
            log: log.clone(),
            api_value: 7,
            ..Default::default()
        });
        let mut engine = new_engine(&transport, Probe::default());
        engine.register_plugins([tracer]);

        assert_eq!(events(&log), vec!["plugin:ready:true"]);
        assert_eq!(engine.plugins().get::<u32>("tracer").as_deref(), Some(&7));
    }

    #[tokio::test]
    async fn test_duplicate_names_share_one_namespace() {
        let transport = paper();
        let first = Arc::new(Tracer {
            api_value: 1,
            ..Default::default()
        });
        let second = Arc::new(Tracer {
            api_value: 2,
            ..Default::default()
        });
        let plugins: Vec<Arc<dyn Plugin>> = vec![first.clone(), second.clone()];

        let mut engine = new_engine(&transport, Probe::default());
        engine.register_plugins(plugins);

        // later registration wins, for plugins and strategies alike
        assert_eq!(engine.plugins().get::<u32>("tracer").as_deref(), Some(&2));
        assert_eq!(*first.ready_api.lock().unwrap(), Some(2));
        assert_eq!(*second.ready_api.lock().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_run_consumes_feed_then_disposes() {
        let transport = Arc::new(
            PaperTransport::new(Instrument::new("BTCUSDT", 1.0, 0.01)).with_feed(vec![
                Candle::from_price(t(0), 100.0),
                Candle::from_price(t(1), 101.0),
                Candle::from_price(t(2), 102.0),
            ]),
        );
        let log = Log::default();
        let tracer: Arc<dyn Plugin> = Arc::new(Tracer {
            log: log.clone(),
            ..Default::default()
        });
        let probe = Probe {
            open_on_candle: true,
            ..Default::default()
        };
        let mut engine = new_engine(&transport, probe);
        engine.register_plugins([tracer]);

        let _disposer = engine.start().await.unwrap();
        engine.run().await.unwrap();

        // two candles opened two positions, dispose closed both
        assert_eq!(transport.placed_orders().len(), 4);
        assert!(engine.orders().is_empty());
        assert!(transport.is_unsubscribed());

        let seen = events(&log);
        assert_eq!(seen.first().map(String::as_str), Some("plugin:ready:true"));
        assert_eq!(seen.get(1).map(String::as_str), Some("plugin:start"));
        assert_eq!(seen.last().map(String::as_str), Some("plugin:dispose:0"));

        // second dispose is a no-op
        let before = events(&log).len();
        engine.dispose().await.unwrap();
        assert_eq!(events(&log).len(), before);
    }

    #[tokio::test]
    async fn test_disposer_stops_before_first_tick() {
        let transport = Arc::new(
            PaperTransport::new(Instrument::new("BTCUSDT", 1.0, 0.01))
                .with_feed(vec![Candle::from_price(t(0), 100.0), Candle::from_price(t(1), 101.0)]),
        );
        let log = Log::default();
        let tracer: Arc<dyn Plugin> = Arc::new(Tracer {
            log: log.clone(),
            ..Default::default()
        });
        let mut engine = new_engine(&transport, Probe::default());
        engine.register_plugins([tracer]);

        let disposer = engine.start().await.unwrap();
        disposer.dispose();
        engine.run().await.unwrap();

        assert!(engine.current_candle().is_none());
        assert!(transport.is_unsubscribed());
        assert_eq!(events(&log).last().map(String::as_str), Some("plugin:dispose:0"));
    }

    #[tokio::test]
    async fn test_run_requires_start() {
        let transport = paper();
        let mut engine = new_engine(&transport, Probe::default());
        assert!(matches!(engine.run().await, Err(EngineError::NotStarted)));
    }
}
