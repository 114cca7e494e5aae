// Seam for the texture-fetch sub-generator. The pixel routine calls emit_fetch() once per
// texture unit it samples and expects the fetched texel, packed as BGRA8888 with alpha in the
// top byte, in the first scratch register afterwards. The sampler itself (coordinate
// arithmetic, LOD selection, filtering) is supplied by the host through this trait;
// fetch() is the interpreter-side twin that must return the texel the emitted code would
// have produced, so the reference interpreter and the generated routine stay in step.

//! Texture-fetch sub-generator interface.

use crate::arm64::abi::{self, scratch::T0};
use crate::arm64::assembler::{CodeBuffer, CodeOffset};
use crate::arm64::encoder as enc;
use crate::core::fingerprint::TextureUnit;
use crate::core::layout::{ParamsLayout, PipelineParams, PixelState, StateLayout};

/// Emits the texel fetch for one texture unit.
pub trait TextureFetch: Send + Sync {
    /// Append instructions that leave the texel for `unit` in w4, and return the cursor
    /// after them. Registers x4-x7, x10, x11, x16 and x17 may be clobbered.
    fn emit_fetch(
        &self,
        buf: &mut CodeBuffer<'_>,
        unit: TextureUnit,
        state: &StateLayout,
        params: &ParamsLayout,
    ) -> CodeOffset;

    /// The texel the emitted code produces for the current pixel.
    fn fetch(&self, state: &PixelState, params: &PipelineParams, unit: TextureUnit) -> u32;
}

/// Reads the texel the host staged in `PixelState::texel` for each unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct StagedTexel;

impl TextureFetch for StagedTexel {
    fn emit_fetch(
        &self,
        buf: &mut CodeBuffer<'_>,
        unit: TextureUnit,
        state: &StateLayout,
        _params: &ParamsLayout,
    ) -> CodeOffset {
        buf.emit(enc::ldr_w(T0, abi::STATE, state.texel[unit.index()]));
        buf.mark()
    }

    fn fetch(&self, state: &PixelState, _params: &PipelineParams, unit: TextureUnit) -> u32 {
        state.texel[unit.index()]
    }
}
