//! # hooks — plugin interface
//!
//! Every side effect the engine performs is bracketed by a hook point.  Hook
//! points are a closed set ([`PluginHook`]); each one has a fixed argument
//! shape and belongs to exactly one dispatch mode:
//!
//! ```text
//!  mode          hook points                        return
//!  ───────────   ─────────────────────────────────  ───────────────────────
//!  registration  Init                                —
//!  sync-reduce   Ready                               —
//!  skip-reduce   BeforeOpen · BeforeClose · Tick     bool  (true = skip)
//!  async-reduce  Open · Close · Candle · AfterCandle HookResult
//!                Start · Dispose
//! ```
//!
//! A plugin implements only the [`Plugin`] methods it cares about; the
//! defaults are no-ops, which is indistinguishable from not registering a
//! callback for that hook point.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{Candle, ExecutedOrder, PendingOrder};

pub mod pipeline;

pub use pipeline::{HookPipeline, PluginApi, PluginCtx};

/// What an async hook returns.  An `Err` aborts the engine operation that
/// dispatched the hook.
pub type HookResult = anyhow::Result<()>;

/// A capability object a plugin publishes under its own name.
pub type ApiObject = Arc<dyn Any + Send + Sync>;

// ─── Hook points ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginHook {
    Init,
    Ready,
    BeforeOpen,
    Open,
    BeforeClose,
    Close,
    Tick,
    Candle,
    AfterCandle,
    Start,
    Dispose,
}

impl PluginHook {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginHook::Init => "onInit",
            PluginHook::Ready => "onReady",
            PluginHook::BeforeOpen => "onBeforeOpen",
            PluginHook::Open => "onOpen",
            PluginHook::BeforeClose => "onBeforeClose",
            PluginHook::Close => "onClose",
            PluginHook::Tick => "onTick",
            PluginHook::Candle => "onCandle",
            PluginHook::AfterCandle => "onAfterCandle",
            PluginHook::Start => "onStart",
            PluginHook::Dispose => "onDispose",
        }
    }
}

impl std::fmt::Display for PluginHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hooks dispatched with [`HookPipeline::sync_reduce`].
#[derive(Debug, Clone, Copy)]
pub enum SyncHook {
    Ready,
}

/// Hooks dispatched with [`HookPipeline::skip_reduce`].
#[derive(Debug, Clone, Copy)]
pub enum SkipHook<'a> {
    BeforeOpen(&'a PendingOrder),
    /// `(closing order, order being closed)`
    BeforeClose(&'a PendingOrder, &'a ExecutedOrder),
    Tick(&'a Candle),
}

impl SkipHook<'_> {
    pub fn kind(&self) -> PluginHook {
        match self {
            SkipHook::BeforeOpen(_) => PluginHook::BeforeOpen,
            SkipHook::BeforeClose(..) => PluginHook::BeforeClose,
            SkipHook::Tick(_) => PluginHook::Tick,
        }
    }
}

/// Hooks dispatched with [`HookPipeline::async_reduce`].
#[derive(Debug, Clone, Copy)]
pub enum AsyncHook<'a> {
    Open(&'a ExecutedOrder),
    /// `(executed closing order, order that was closed)`
    Close(&'a ExecutedOrder, &'a ExecutedOrder),
    Candle(&'a Candle),
    AfterCandle(&'a Candle),
    Start,
    Dispose,
}

impl AsyncHook<'_> {
    pub fn kind(&self) -> PluginHook {
        match self {
            AsyncHook::Open(_) => PluginHook::Open,
            AsyncHook::Close(..) => PluginHook::Close,
            AsyncHook::Candle(_) => PluginHook::Candle,
            AsyncHook::AfterCandle(_) => PluginHook::AfterCandle,
            AsyncHook::Start => PluginHook::Start,
            AsyncHook::Dispose => PluginHook::Dispose,
        }
    }
}

// ─── Plugin ───────────────────────────────────────────────────────────────────

/// A named unit observing and gating the engine.
///
/// Callbacks take `&self`: plugins keeping their own state (indicator
/// buffers, counters) hold it behind a lock.  The [`PluginCtx`] gives read
/// access to the engine and to the other registered plugins.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Lookup key and namespace of the published [`api`](Plugin::api).
    fn name(&self) -> &str;

    /// Capability object published under [`name`](Plugin::name).
    fn api(&self) -> Option<ApiObject> {
        None
    }

    /// Called once, right when the plugin is registered.
    fn on_init(&self, _ctx: &PluginCtx<'_>) {}

    /// Called after every plugin in the batch is registered and the public
    /// API namespace is published.
    fn on_ready(&self, _ctx: &PluginCtx<'_>) {}

    // ── skip hooks ────────────────────────────────────────────────────────────

    fn on_before_open(&self, _ctx: &PluginCtx<'_>, _order: &PendingOrder) -> bool {
        false
    }

    fn on_before_close(
        &self,
        _ctx: &PluginCtx<'_>,
        _order: &PendingOrder,
        _closing: &ExecutedOrder,
    ) -> bool {
        false
    }

    fn on_tick(&self, _ctx: &PluginCtx<'_>, _tick: &Candle) -> bool {
        false
    }

    // ── async hooks ───────────────────────────────────────────────────────────

    async fn on_open(&self, _ctx: &PluginCtx<'_>, _order: &ExecutedOrder) -> HookResult {
        Ok(())
    }

    async fn on_close(
        &self,
        _ctx: &PluginCtx<'_>,
        _order: &ExecutedOrder,
        _closing: &ExecutedOrder,
    ) -> HookResult {
        Ok(())
    }

    async fn on_candle(&self, _ctx: &PluginCtx<'_>, _candle: &Candle) -> HookResult {
        Ok(())
    }

    async fn on_after_candle(&self, _ctx: &PluginCtx<'_>, _candle: &Candle) -> HookResult {
        Ok(())
    }

    async fn on_start(&self, _ctx: &PluginCtx<'_>) -> HookResult {
        Ok(())
    }

    async fn on_dispose(&self, _ctx: &PluginCtx<'_>) -> HookResult {
        Ok(())
    }
}
