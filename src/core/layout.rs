// The generated routine addresses two structures owned by the emulator: the interpolator
// state of the triangle being drawn (PixelState) and the parameter block holding gradients
// and mode registers (PipelineParams). Both are #[repr(C)] so their field offsets are stable,
// and the generator never sees the structures themselves, only the StateLayout and
// ParamsLayout descriptors computed here with offset_of!. Accumulators that the routine
// steps with one vector instruction (the four colour channels, a texture unit's S and T) are
// kept adjacent.

//! Field layout of the emulator-state and pipeline-parameter structures.

use std::mem::{offset_of, size_of};
use std::ptr;

/// Per-unit texture coordinate accumulators.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TmuCoords {
    pub s: i64,
    pub t: i64,
    pub w: i64,
}

/// Per-unit texture coordinate gradients along x.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TmuGradients {
    pub d_sdx: i64,
    pub d_tdx: i64,
    pub d_wdx: i64,
}

/// Interpolator state for the span being drawn.
///
/// `fb_mem` and `aux_mem` point at the current row of the colour and depth surfaces; the
/// routine indexes them with x (or the tiled x) in 16-bit units.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelState {
    pub fb_mem: *mut u16,
    pub aux_mem: *mut u16,
    pub ib: i32,
    pub ig: i32,
    pub ir: i32,
    pub ia: i32,
    pub z: i32,
    pub new_depth: i32,
    pub tmu: [TmuCoords; 2],
    pub w: i64,
    pub pixel_count: u32,
    pub texel_count: u32,
    pub x: i32,
    pub x2: i32,
    pub x_tiled: i32,
    pub w_depth: i32,
    pub stipple: u32,
    pub xdir: i32,
    pub tex_a: [u32; 2],
    /// Texels staged by the host texture unit model, one per unit.
    pub texel: [u32; 2],
    pub z_func_fail: u32,
}

impl Default for PixelState {
    fn default() -> Self {
        Self {
            fb_mem: ptr::null_mut(),
            aux_mem: ptr::null_mut(),
            ib: 0,
            ig: 0,
            ir: 0,
            ia: 0,
            z: 0,
            new_depth: 0,
            tmu: [TmuCoords::default(); 2],
            w: 0,
            pixel_count: 0,
            texel_count: 0,
            x: 0,
            x2: 0,
            x_tiled: 0,
            w_depth: 0,
            stipple: 0,
            xdir: 1,
            tex_a: [0; 2],
            texel: [0; 2],
            z_func_fail: 0,
        }
    }
}

/// Gradients and mode registers of the triangle being drawn.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineParams {
    pub d_bdx: i32,
    pub d_gdx: i32,
    pub d_rdx: i32,
    pub d_adx: i32,
    pub d_zdx: i32,
    pub d_wdx: i64,
    pub tmu: [TmuGradients; 2],
    pub alpha_mode: u32,
    pub fbz_mode: u32,
    pub fog_mode: u32,
    pub fbz_color_path: u32,
    pub texture_mode: [u32; 2],
    pub tlod: [u32; 2],
    pub za_color: u32,
    /// Read by the colour-combine stage, which span routines do not emit.
    pub chroma_key: u32,
    pub col_tiled: u32,
    pub aux_tiled: u32,
}

/// Byte offsets into the emulator-state structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLayout {
    pub fb_mem: u32,
    pub aux_mem: u32,
    /// Start of the four adjacent 32-bit colour accumulators (b, g, r, a).
    pub color: u32,
    pub z: u32,
    pub new_depth: u32,
    /// Start of the adjacent 64-bit S and T accumulators, per unit.
    pub tmu_st: [u32; 2],
    pub tmu_w: [u32; 2],
    pub w: u32,
    pub pixel_count: u32,
    pub texel_count: u32,
    pub x: u32,
    pub x2: u32,
    pub x_tiled: u32,
    pub w_depth: u32,
    pub stipple: u32,
    pub tex_a: [u32; 2],
    pub texel: [u32; 2],
    pub z_func_fail: u32,
}

const fn tmu_field(unit: usize, field: usize) -> u32 {
    (offset_of!(PixelState, tmu) + unit * size_of::<TmuCoords>() + field) as u32
}

const fn word_at(base: usize, index: usize) -> u32 {
    (base + index * 4) as u32
}

impl StateLayout {
    /// Offsets of [`PixelState`].
    pub const fn native() -> Self {
        Self {
            fb_mem: offset_of!(PixelState, fb_mem) as u32,
            aux_mem: offset_of!(PixelState, aux_mem) as u32,
            color: offset_of!(PixelState, ib) as u32,
            z: offset_of!(PixelState, z) as u32,
            new_depth: offset_of!(PixelState, new_depth) as u32,
            tmu_st: [
                tmu_field(0, offset_of!(TmuCoords, s)),
                tmu_field(1, offset_of!(TmuCoords, s)),
            ],
            tmu_w: [
                tmu_field(0, offset_of!(TmuCoords, w)),
                tmu_field(1, offset_of!(TmuCoords, w)),
            ],
            w: offset_of!(PixelState, w) as u32,
            pixel_count: offset_of!(PixelState, pixel_count) as u32,
            texel_count: offset_of!(PixelState, texel_count) as u32,
            x: offset_of!(PixelState, x) as u32,
            x2: offset_of!(PixelState, x2) as u32,
            x_tiled: offset_of!(PixelState, x_tiled) as u32,
            w_depth: offset_of!(PixelState, w_depth) as u32,
            stipple: offset_of!(PixelState, stipple) as u32,
            tex_a: [
                word_at(offset_of!(PixelState, tex_a), 0),
                word_at(offset_of!(PixelState, tex_a), 1),
            ],
            texel: [
                word_at(offset_of!(PixelState, texel), 0),
                word_at(offset_of!(PixelState, texel), 1),
            ],
            z_func_fail: offset_of!(PixelState, z_func_fail) as u32,
        }
    }
}

/// Byte offsets into the pipeline-parameter structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamsLayout {
    /// Start of the four adjacent 32-bit colour gradients (dB, dG, dR, dA).
    pub color_gradients: u32,
    pub d_zdx: u32,
    pub d_wdx: u32,
    /// Start of the adjacent 64-bit dS and dT gradients, per unit.
    pub tmu_st_gradients: [u32; 2],
    pub tmu_d_wdx: [u32; 2],
    pub za_color: u32,
}

const fn tmu_gradient(unit: usize, field: usize) -> u32 {
    (offset_of!(PipelineParams, tmu) + unit * size_of::<TmuGradients>() + field) as u32
}

impl ParamsLayout {
    /// Offsets of [`PipelineParams`].
    pub const fn native() -> Self {
        Self {
            color_gradients: offset_of!(PipelineParams, d_bdx) as u32,
            d_zdx: offset_of!(PipelineParams, d_zdx) as u32,
            d_wdx: offset_of!(PipelineParams, d_wdx) as u32,
            tmu_st_gradients: [
                tmu_gradient(0, offset_of!(TmuGradients, d_sdx)),
                tmu_gradient(1, offset_of!(TmuGradients, d_sdx)),
            ],
            tmu_d_wdx: [
                tmu_gradient(0, offset_of!(TmuGradients, d_wdx)),
                tmu_gradient(1, offset_of!(TmuGradients, d_wdx)),
            ],
            za_color: offset_of!(PipelineParams, za_color) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_groups_are_adjacent() {
        assert_eq!(offset_of!(PixelState, ia) - offset_of!(PixelState, ib), 12);
        assert_eq!(offset_of!(PipelineParams, d_adx) - offset_of!(PipelineParams, d_bdx), 12);
        assert_eq!(offset_of!(TmuCoords, t) - offset_of!(TmuCoords, s), 8);
        assert_eq!(offset_of!(TmuGradients, d_tdx) - offset_of!(TmuGradients, d_sdx), 8);
    }

    #[test]
    fn wide_fields_are_aligned_for_scaled_loads() {
        let state = StateLayout::native();
        let params = ParamsLayout::native();
        for off in [state.w, state.tmu_w[0], state.tmu_w[1], state.fb_mem, state.aux_mem] {
            assert_eq!(off % 8, 0);
        }
        for off in [params.d_wdx, params.tmu_d_wdx[0], params.tmu_d_wdx[1]] {
            assert_eq!(off % 8, 0);
        }
        assert_eq!(state.x % 4, 0);
        assert_eq!(params.za_color % 4, 0);
    }

    #[test]
    fn unit_offsets_step_by_struct_size() {
        let state = StateLayout::native();
        assert_eq!(state.tmu_st[1] - state.tmu_st[0], size_of::<TmuCoords>() as u32);
        assert_eq!(state.texel[1] - state.texel[0], 4);
    }
}
