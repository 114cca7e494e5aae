// Per-span entry point for the renderer. draw_span prepares the state the way the span loop
// expects it, derives the configuration fingerprint from the live parameter block, and runs
// the cached routine for the scanline's parity. When the recompiler is switched off, or the
// cache could not produce a routine for the configuration (it did not fit its block, or the
// block could not be made writable or executable), the span goes to the reference
// interpreter instead. A simulator fault is returned to the caller.

//! Span dispatcher.

use log::warn;
use std::sync::Arc;

use crate::codegen::TextureFetch;
use crate::core::config::JitConfig;
use crate::core::error::JitResult;
use crate::core::fingerprint::PipelineConfig;
use crate::core::layout::{PipelineParams, PixelState};
use crate::reference::Interpreter;

use super::cache::BlockCache;
use super::memory::{ActiveBackend, ProtectionBackend};

/// Spans handled by each path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub jit_spans: u64,
    pub fallback_spans: u64,
    pub empty_spans: u64,
}

/// Routes spans to generated routines or the interpreter.
pub struct Dispatcher<B: ProtectionBackend = ActiveBackend> {
    cache: Option<BlockCache<B>>,
    interpreter: Interpreter,
    trex_init1: u32,
    stats: DispatchStats,
}

impl Dispatcher {
    /// A dispatcher for `config`. No executable memory is mapped when the recompiler is off.
    pub fn new(config: JitConfig) -> JitResult<Self> {
        Self::with_backend(config)
    }
}

impl<B: ProtectionBackend> Dispatcher<B> {
    /// Like [`Dispatcher::new`], with code blocks toggled through `B`.
    pub fn with_backend(config: JitConfig) -> JitResult<Self> {
        let cache = if config.enabled {
            Some(BlockCache::with_backend(config)?)
        } else {
            None
        };
        Ok(Self {
            cache,
            interpreter: Interpreter::new(config.dual_tmus),
            trex_init1: 0,
            stats: DispatchStats::default(),
        })
    }

    /// Use `texture` for both generated routines and the interpreter.
    pub fn with_texture_fetch(mut self, texture: Arc<dyn TextureFetch>) -> Self {
        self.cache = self.cache.map(|cache| cache.with_texture_fetch(texture.clone()));
        self.interpreter = self.interpreter.with_texture_fetch(texture);
        self
    }

    /// Latch the card's trexInit1 register.
    pub fn set_trex_init1(&mut self, value: u32) {
        self.trex_init1 = value;
    }

    pub fn cache(&self) -> Option<&BlockCache<B>> {
        self.cache.as_ref()
    }

    pub fn cache_mut(&mut self) -> Option<&mut BlockCache<B>> {
        self.cache.as_mut()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Draw pixels `x..=x2` of scanline `y` in the direction of `state.xdir`.
    ///
    /// # Safety
    ///
    /// `state.fb_mem` and `state.aux_mem` must be valid for every x (and tiled x) the span
    /// visits.
    pub unsafe fn draw_span(
        &mut self,
        params: &PipelineParams,
        state: &mut PixelState,
        x: i32,
        x2: i32,
        y: i32,
    ) -> JitResult<()> {
        // Non-negative xdir scans forward, matching the fingerprint's direction.
        if (state.xdir >= 0 && x2 < x) || (state.xdir < 0 && x2 > x) {
            self.stats.empty_spans += 1;
            return Ok(());
        }

        state.pixel_count = 0;
        state.texel_count = 0;
        state.x = x;
        state.x2 = x2;

        let config = PipelineConfig::from_params(params, state.xdir, self.trex_init1);

        if let Some(cache) = self.cache.as_mut() {
            match cache.lookup_or_generate(&config, (y & 1) as usize) {
                Ok(routine) => {
                    routine.invoke(state, params, x, y)?;
                    self.stats.jit_spans += 1;
                    return Ok(());
                }
                Err(err) if err.is_fallback() => {
                    if self.stats.fallback_spans == 0 {
                        warn!("falling back to the interpreter: {err}");
                    }
                }
                Err(err) => return Err(err),
            }
        }

        self.interpreter.draw_span(&config, state, params, x, y);
        self.stats.fallback_spans += 1;
        Ok(())
    }
}
