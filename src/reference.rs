// Span interpreter with the per-pixel semantics of a generated routine, stage for stage:
// stipple, tiled x, depth value, bias and store, depth test, texel alpha, increments,
// counters and the inclusive loop. Arithmetic wraps exactly where the 32- and 64-bit
// registers of the routine wrap. The dispatcher uses it when the recompiler is off or a
// configuration was rejected, and the integration tests use it as the oracle for the
// generated code.

//! Reference span interpreter.

use std::sync::Arc;

use crate::codegen::{StagedTexel, TextureFetch};
use crate::core::fingerprint::{DepthOp, PipelineConfig, ScanDirection, StippleMode, TextureUnit};
use crate::core::layout::{PipelineParams, PixelState};

/// Depth derived from the 48-bit fixed-point W.
pub fn w_depth(w: i64) -> u32 {
    let w = w as u64;
    if (w >> 32) & 0xffff != 0 {
        return 0;
    }
    let low = w as u32;
    let top = low >> 16;
    if top == 0 {
        return 0xf001;
    }
    let exp = top.leading_zeros() - 16;
    let mant = (!low >> (19 - exp)) & 0xfff;
    ((exp << 12) + mant + 1).min(0xffff)
}

/// Depth derived from the 20.12 fixed-point Z, clamped to 16 bits.
pub fn z_depth(z: i32) -> u32 {
    (z >> 12).clamp(0, 0xffff) as u32
}

/// Tiled column address of `x`.
pub fn tiled_x(x: i32) -> i32 {
    let x = x as u32;
    ((x & 63).wrapping_add((x >> 6) << 11)) as i32
}

/// Whether the stipple test lets the current pixel through. Advances the rotating pattern.
pub fn stipple_passes(mode: StippleMode, state: &mut PixelState, y: i32) -> bool {
    match mode {
        StippleMode::Rotating => {
            state.stipple = state.stipple.rotate_right(1);
            state.stipple & 0x8000_0000 != 0
        }
        StippleMode::Pattern => {
            let bit = (((y as u32) & 3) << 3) | (!(state.x as u32) & 7);
            state.stipple & (1 << bit) != 0
        }
    }
}

/// Interprets spans for one card.
#[derive(Clone)]
pub struct Interpreter {
    dual_tmus: bool,
    texture: Arc<dyn TextureFetch>,
}

impl Interpreter {
    pub fn new(dual_tmus: bool) -> Self {
        Self {
            dual_tmus,
            texture: Arc::new(StagedTexel),
        }
    }

    pub fn with_texture_fetch(mut self, texture: Arc<dyn TextureFetch>) -> Self {
        self.texture = texture;
        self
    }

    /// Draw the span from `x` to `state.x2` inclusive on scanline `y`.
    ///
    /// # Safety
    ///
    /// When the depth test reads the auxiliary surface, `state.aux_mem` must be valid for
    /// every x (or tiled x) the span visits.
    pub unsafe fn draw_span(
        &self,
        config: &PipelineConfig,
        state: &mut PixelState,
        params: &PipelineParams,
        x: i32,
        y: i32,
    ) {
        let forward = config.xdir() == ScanDirection::Forward;
        state.x = x;
        loop {
            if !self.pixel(config, state, params, y) {
                return;
            }
            self.increments(config, state, params, forward);

            let old = state.x;
            state.x = if forward {
                old.wrapping_add(1)
            } else {
                old.wrapping_sub(1)
            };
            if old == state.x2 {
                return;
            }
        }
    }

    /// Stages up to the convergence point. Returns false when the routine would leave
    /// the span immediately.
    unsafe fn pixel(
        &self,
        config: &PipelineConfig,
        state: &mut PixelState,
        params: &PipelineParams,
        y: i32,
    ) -> bool {
        if let Some(mode) = config.stipple() {
            if !stipple_passes(mode, state, y) {
                return true;
            }
        }

        if config.tiled() {
            state.x_tiled = tiled_x(state.x);
        }

        let mut depth = 0;
        if config.w_buffer() || config.fog_needs_w_depth() {
            depth = w_depth(state.w);
            if config.fog_needs_w_depth() {
                state.w_depth = depth as i32;
            }
        }
        if !config.w_buffer() {
            depth = z_depth(state.z);
        }
        if config.depth_bias() {
            depth = depth.wrapping_add(params.za_color) & 0xffff;
        }
        state.new_depth = depth as i32;

        if config.depth_enabled() {
            match config.depth_op() {
                DepthOp::Always => {}
                DepthOp::Never => {
                    state.z_func_fail = state.z_func_fail.wrapping_add(1);
                    return false;
                }
                op => {
                    let index = if config.tiled() { state.x_tiled } else { state.x };
                    let old = *state.aux_mem.add(index as u32 as usize);
                    let new = if config.depth_source() {
                        params.za_color as u16
                    } else {
                        depth as u16
                    };
                    if !op.passes(new, old) {
                        state.z_func_fail = state.z_func_fail.wrapping_add(1);
                        return true;
                    }
                }
            }
        }

        if config.texture_enabled() {
            let units = config.texture_units(self.dual_tmus);
            let mut alpha = 0;
            for &unit in units {
                alpha = self.texture.fetch(state, params, unit) >> 24;
                state.tex_a[unit.index()] = alpha;
            }
            if matches!(units, [TextureUnit::Tmu1]) {
                state.tex_a[0] = alpha;
            }
        }
        true
    }

    fn increments(
        &self,
        config: &PipelineConfig,
        state: &mut PixelState,
        params: &PipelineParams,
        forward: bool,
    ) {
        let step32 = |acc: &mut i32, d: i32| {
            *acc = if forward {
                acc.wrapping_add(d)
            } else {
                acc.wrapping_sub(d)
            }
        };
        let step64 = |acc: &mut i64, d: i64| {
            *acc = if forward {
                acc.wrapping_add(d)
            } else {
                acc.wrapping_sub(d)
            }
        };

        step32(&mut state.ib, params.d_bdx);
        step32(&mut state.ig, params.d_gdx);
        step32(&mut state.ir, params.d_rdx);
        step32(&mut state.ia, params.d_adx);
        step32(&mut state.z, params.d_zdx);

        let units = if self.dual_tmus { 2 } else { 1 };
        for (coords, grads) in state.tmu.iter_mut().zip(&params.tmu).take(units) {
            step64(&mut coords.s, grads.d_sdx);
            step64(&mut coords.t, grads.d_tdx);
            step64(&mut coords.w, grads.d_wdx);
        }
        step64(&mut state.w, params.d_wdx);

        state.pixel_count = state.pixel_count.wrapping_add(1);
        if config.texture_enabled() {
            state.texel_count = state.texel_count.wrapping_add(config.texels_per_pixel());
        }
    }
}
