//! # hooks::pipeline
//!
//! **Hook Pipeline** — holds registered plugins in registration order and
//! dispatches hook points to them.
//!
//! ## Dispatch modes
//! 1. `sync_reduce`  — call every plugin, ignore results
//! 2. `skip_reduce`  — call plugins in order, stop at the first `true`
//! 3. `async_reduce` — await each plugin fully before starting the next

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::EngineState;
use crate::error::EngineError;
use crate::hooks::{ApiObject, AsyncHook, Plugin, SkipHook, SyncHook};

// ─── PluginCtx ────────────────────────────────────────────────────────────────

/// Read-only context handed to every plugin callback.
///
/// Built as an immutable borrow over the live plugin list and the engine
/// state; plugins can look at anything reachable from it but cannot swap it
/// out or mutate the engine through it.
#[derive(Clone, Copy)]
pub struct PluginCtx<'a> {
    pipeline: &'a HookPipeline,
    engine: &'a EngineState,
}

impl<'a> PluginCtx<'a> {
    pub(crate) fn new(pipeline: &'a HookPipeline, engine: &'a EngineState) -> Self {
        Self { pipeline, engine }
    }

    /// First registered plugin called `name`.
    pub fn find_plugin(&self, name: &str) -> Option<&'a dyn Plugin> {
        self.pipeline.find_plugin(name)
    }

    /// Typed capability object published under `name`, from the same frozen
    /// namespace strategies see.  Empty until registration finishes, so
    /// `on_init` gets `None`.
    pub fn api<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.engine.plugins().get(name)
    }

    pub fn engine(&self) -> &'a EngineState {
        self.engine
    }
}

// ─── PluginApi ────────────────────────────────────────────────────────────────

/// Frozen `plugin name → capability object` namespace exposed to strategies.
#[derive(Clone, Default)]
pub struct PluginApi {
    entries: Arc<HashMap<String, ApiObject>>,
}

impl PluginApi {
    /// Typed lookup; `None` when the name is unknown or the type differs.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).cloned()?.downcast::<T>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for PluginApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("PluginApi").field("names", &names).finish()
    }
}

// ─── HookPipeline ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct HookPipeline {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `plugins` in order, calling each one's `on_init` right after
    /// it joins the list.  Duplicate names are allowed but logged.
    pub fn register<I>(&mut self, plugins: I, engine: &EngineState)
    where
        I: IntoIterator<Item = Arc<dyn Plugin>>,
    {
        for plugin in plugins {
            if self.find_plugin(plugin.name()).is_some() {
                warn!(plugin = plugin.name(), "⚠️ Plugin initialized many times");
            }

            self.plugins.push(Arc::clone(&plugin));
            debug!(plugin = plugin.name(), "Plugin registered");

            plugin.on_init(&PluginCtx::new(self, engine));
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn find_plugin(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|plugin| plugin.name() == name)
            .map(|plugin| plugin.as_ref())
    }

    /// Snapshot of every published capability object.  A later plugin with
    /// the same name overwrites an earlier one.
    pub fn public_api(&self) -> PluginApi {
        let mut entries = HashMap::new();
        for plugin in &self.plugins {
            if let Some(api) = plugin.api() {
                entries.insert(plugin.name().to_string(), api);
            }
        }
        PluginApi {
            entries: Arc::new(entries),
        }
    }

    pub fn sync_reduce(&self, engine: &EngineState, hook: SyncHook) {
        let ctx = PluginCtx::new(self, engine);
        for plugin in &self.plugins {
            match hook {
                SyncHook::Ready => plugin.on_ready(&ctx),
            }
        }
    }

    /// `true` as soon as one plugin asks to skip; later plugins are not called.
    pub fn skip_reduce(&self, engine: &EngineState, hook: SkipHook<'_>) -> bool {
        let ctx = PluginCtx::new(self, engine);
        for plugin in &self.plugins {
            let skip = match hook {
                SkipHook::BeforeOpen(order) => plugin.on_before_open(&ctx, order),
                SkipHook::BeforeClose(order, closing) => plugin.on_before_close(&ctx, order, closing),
                SkipHook::Tick(tick) => plugin.on_tick(&ctx, tick),
            };

            if skip {
                debug!(hook = %hook.kind(), plugin = plugin.name(), "Skip requested by plugin");
                return true;
            }
        }
        false
    }

    /// Runs the hook on every plugin strictly one after another.  The first
    /// error stops the dispatch and is returned to the caller.
    pub async fn async_reduce(&self, engine: &EngineState, hook: AsyncHook<'_>) -> Result<(), EngineError> {
        let ctx = PluginCtx::new(self, engine);
        for plugin in &self.plugins {
            let result = match hook {
                AsyncHook::Open(order) => plugin.on_open(&ctx, order).await,
                AsyncHook::Close(order, closing) => plugin.on_close(&ctx, order, closing).await,
                AsyncHook::Candle(candle) => plugin.on_candle(&ctx, candle).await,
                AsyncHook::AfterCandle(candle) => plugin.on_after_candle(&ctx, candle).await,
                AsyncHook::Start => plugin.on_start(&ctx).await,
                AsyncHook::Dispose => plugin.on_dispose(&ctx).await,
            };

            result.map_err(|source| EngineError::Hook {
                hook: hook.kind(),
                plugin: plugin.name().to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
