// The code generator turns one pipeline configuration into a complete span routine. A pass
// walks a fixed skeleton: prologue, loop header, stipple test, tiled address, depth value,
// depth bias and store, depth test, texture fetch, convergence point, attribute increments,
// loop control, epilogue. Every stage is resolved against the configuration at generation
// time, so a stage that is switched off emits nothing and a depth function is reduced to one
// branch condition. Pixels rejected by the stipple or depth test branch forward to the
// convergence point, so the increments and the pixel counter still run for them; the only
// backward branch closes the loop. Stage emitters live in the depth, stipple and texture
// submodules as methods on the per-pass state.

//! Pixel-pipeline code generator.

mod depth;
mod stipple;
pub mod texture;

pub use depth::skip_condition;
pub use texture::{StagedTexel, TextureFetch};

use log::debug;
use std::mem::offset_of;
use std::sync::Arc;

use crate::arm64::abi::{self, scratch::*, SavedPair, FRAME_SIZE, SAVED_PAIRS};
use crate::arm64::assembler::{CodeBuffer, CodeOffset, ForwardPatch, GenerationReport};
use crate::arm64::encoder::{self as enc, regs::SP, Cond};
use crate::core::config::JitConfig;
use crate::core::error::JitResult;
use crate::core::fingerprint::{PipelineConfig, ScanDirection, TextureUnit};
use crate::core::layout::{ParamsLayout, StateLayout};
use crate::core::tables::{self, VectorConstants};

/// Generates span routines for pipeline configurations.
pub struct CodeGenerator {
    state: StateLayout,
    params: ParamsLayout,
    dual_tmus: bool,
    texture: Arc<dyn TextureFetch>,
}

impl CodeGenerator {
    /// Generator for the native structure layouts and the staged-texel fetch.
    pub fn new(config: &JitConfig) -> Self {
        Self {
            state: StateLayout::native(),
            params: ParamsLayout::native(),
            dual_tmus: config.dual_tmus,
            texture: Arc::new(StagedTexel),
        }
    }

    pub fn with_layouts(mut self, state: StateLayout, params: ParamsLayout) -> Self {
        self.state = state;
        self.params = params;
        self
    }

    pub fn with_texture_fetch(mut self, texture: Arc<dyn TextureFetch>) -> Self {
        self.set_texture_fetch(texture);
        self
    }

    pub fn set_texture_fetch(&mut self, texture: Arc<dyn TextureFetch>) {
        self.texture = texture;
    }

    pub fn dual_tmus(&self) -> bool {
        self.dual_tmus
    }

    pub fn texture_fetch(&self) -> &Arc<dyn TextureFetch> {
        &self.texture
    }

    /// Emit the routine for `config` into `code`.
    ///
    /// Fails with [`JitError::BlockOverflow`](crate::JitError::BlockOverflow) when the
    /// routine does not fit; nothing past the end of `code` is written.
    pub fn generate(&self, config: &PipelineConfig, code: &mut [u32]) -> JitResult<GenerationReport> {
        let pass = Pass {
            gen: self,
            config,
            buf: CodeBuffer::new(code),
            skips: Vec::new(),
            exits: Vec::new(),
        };
        let report = pass.run()?;
        debug!(
            "generated {} words ({} forward branches) for {:?}",
            report.words, report.resolved_patches, config
        );
        Ok(report)
    }

    /// Emit the routine into a fresh buffer of `capacity` words.
    pub fn generate_to_vec(&self, config: &PipelineConfig, capacity: usize) -> JitResult<Vec<u32>> {
        let mut code = vec![0u32; capacity];
        let report = self.generate(config, &mut code)?;
        code.truncate(report.words);
        Ok(code)
    }
}

/// State of one generation pass.
struct Pass<'g, 'b> {
    gen: &'g CodeGenerator,
    config: &'g PipelineConfig,
    buf: CodeBuffer<'b>,
    /// Branches to the convergence point.
    skips: Vec<ForwardPatch>,
    /// Branches to the epilogue.
    exits: Vec<ForwardPatch>,
}

impl Pass<'_, '_> {
    fn run(mut self) -> JitResult<GenerationReport> {
        self.prologue();
        let head = self.buf.mark();
        self.stipple();
        self.tiled_x();
        self.depth_value();
        self.depth_bias_and_store();
        self.depth_test();
        self.texture();
        self.converge();
        self.increments();
        self.loop_control(head);
        self.epilogue();
        self.buf.finish()
    }

    fn emit(&mut self, word: u32) {
        self.buf.emit(word);
    }

    fn forward(&self) -> bool {
        self.config.xdir() == ScanDirection::Forward
    }

    fn prologue(&mut self) {
        self.emit(enc::stp_x_pre(enc::regs::X29, enc::regs::X30, SP, -FRAME_SIZE));
        for (pair, offset) in SAVED_PAIRS {
            self.emit(match pair {
                SavedPair::Gpr(a, b) => enc::stp_x(a, b, SP, offset),
                SavedPair::Fpr(a, b) => enc::stp_d(a, b, SP, offset),
            });
        }
        self.emit(enc::add_imm_x(enc::regs::X29, SP, 0));

        let state = self.gen.state;
        self.emit(enc::str_w(abi::ARG_X, abi::STATE, state.x));
        self.emit(enc::mov_x(abi::Y, abi::ARG_Y));

        // Table bases and vector constants are pinned for the blend and filter stages; the
        // stages emitted here do not read them.
        let tables = tables::shared();
        self.buf.emit_imm64(abi::ALOOKUP, tables.alookup_addr());
        self.buf.emit_imm64(abi::AMINUSLOOKUP, tables.aminuslookup_addr());
        self.buf.emit_imm64(abi::BILINEAR, tables.bilinear_addr());
        self.buf.emit_imm64(abi::CONSTANTS, tables.constants_addr());
        self.emit(enc::ldr_q(abi::ONE_W, abi::CONSTANTS, offset_of!(VectorConstants, one_w) as u32));
        self.emit(enc::ldr_q(abi::FF_W, abi::CONSTANTS, offset_of!(VectorConstants, ff_w) as u32));

        self.emit(enc::ldr_x(abi::FB_MEM, abi::STATE, state.fb_mem));
        self.emit(enc::ldr_x(abi::AUX_MEM, abi::STATE, state.aux_mem));
    }

    fn tiled_x(&mut self) {
        if !self.config.tiled() {
            return;
        }
        let state = self.gen.state;
        self.emit(enc::ldr_w(T0, abi::STATE, state.x));
        self.emit(enc::and_mask_w(T1, T0, 6));
        self.emit(enc::lsr_imm_w(T0, T0, 6));
        self.emit(enc::add_w_lsl(T0, T1, T0, 11));
        self.emit(enc::str_w(T0, abi::STATE, state.x_tiled));
    }

    fn texture(&mut self) {
        if !self.config.texture_enabled() {
            return;
        }
        let gen = self.gen;
        let units = self.config.texture_units(gen.dual_tmus);
        let state = gen.state;
        for &unit in units {
            gen.texture.emit_fetch(&mut self.buf, unit, &gen.state, &gen.params);
            self.emit(enc::lsr_imm_w(T1, T0, 24));
            self.emit(enc::str_w(T1, abi::STATE, state.tex_a[unit.index()]));
        }
        // A pass-through unit 0 forwards unit 1's result.
        if matches!(units, [TextureUnit::Tmu1]) {
            self.emit(enc::str_w(T1, abi::STATE, state.tex_a[0]));
        }
    }

    fn converge(&mut self) {
        for skip in std::mem::take(&mut self.skips) {
            self.buf.patch(skip);
        }
    }

    fn step_vector_4s(&mut self, state_off: u32, grad_off: u32) {
        self.emit(enc::add_imm_x(ADDR0, abi::STATE, state_off));
        self.emit(enc::ld1_4s(VACC, ADDR0));
        self.emit(enc::add_imm_x(ADDR1, abi::PARAMS, grad_off));
        self.emit(enc::ld1_4s(VGRAD, ADDR1));
        self.emit(if self.forward() {
            enc::add_4s(VACC, VACC, VGRAD)
        } else {
            enc::sub_4s(VACC, VACC, VGRAD)
        });
        self.emit(enc::st1_4s(VACC, ADDR0));
    }

    fn step_vector_2d(&mut self, state_off: u32, grad_off: u32) {
        self.emit(enc::add_imm_x(ADDR0, abi::STATE, state_off));
        self.emit(enc::ld1_4s(VACC, ADDR0));
        self.emit(enc::add_imm_x(ADDR1, abi::PARAMS, grad_off));
        self.emit(enc::ld1_4s(VGRAD, ADDR1));
        self.emit(if self.forward() {
            enc::add_2d(VACC, VACC, VGRAD)
        } else {
            enc::sub_2d(VACC, VACC, VGRAD)
        });
        self.emit(enc::st1_4s(VACC, ADDR0));
    }

    fn step_w(&mut self, state_off: u32, grad_off: u32) {
        self.emit(enc::ldr_w(T0, abi::STATE, state_off));
        self.emit(enc::ldr_w(T1, abi::PARAMS, grad_off));
        self.emit(if self.forward() {
            enc::add_w(T0, T0, T1)
        } else {
            enc::sub_w(T0, T0, T1)
        });
        self.emit(enc::str_w(T0, abi::STATE, state_off));
    }

    fn step_x(&mut self, state_off: u32, grad_off: u32) {
        self.emit(enc::ldr_x(T0, abi::STATE, state_off));
        self.emit(enc::ldr_x(T1, abi::PARAMS, grad_off));
        self.emit(if self.forward() {
            enc::add_x(T0, T0, T1)
        } else {
            enc::sub_x(T0, T0, T1)
        });
        self.emit(enc::str_x(T0, abi::STATE, state_off));
    }

    fn bump_counter(&mut self, offset: u32, amount: u32) {
        self.emit(enc::ldr_w(T0, abi::STATE, offset));
        self.emit(enc::add_imm_w(T0, T0, amount));
        self.emit(enc::str_w(T0, abi::STATE, offset));
    }

    fn increments(&mut self) {
        let (state, params) = (self.gen.state, self.gen.params);

        self.step_vector_4s(state.color, params.color_gradients);
        self.step_w(state.z, params.d_zdx);

        let units: &[usize] = if self.gen.dual_tmus { &[0, 1] } else { &[0] };
        for &unit in units {
            self.step_vector_2d(state.tmu_st[unit], params.tmu_st_gradients[unit]);
            self.step_x(state.tmu_w[unit], params.tmu_d_wdx[unit]);
        }
        self.step_x(state.w, params.d_wdx);

        self.bump_counter(state.pixel_count, 1);
        if self.config.texture_enabled() {
            self.bump_counter(state.texel_count, self.config.texels_per_pixel());
        }
    }

    fn loop_control(&mut self, head: CodeOffset) {
        let state = self.gen.state;
        self.emit(enc::ldr_w(T0, abi::STATE, state.x));
        self.emit(if self.forward() {
            enc::add_imm_w(T1, T0, 1)
        } else {
            enc::sub_imm_w(T1, T0, 1)
        });
        self.emit(enc::str_w(T1, abi::STATE, state.x));
        self.emit(enc::ldr_w(T2, abi::STATE, state.x2));
        self.emit(enc::cmp_w(T0, T2));
        self.buf.branch_back(Cond::Ne, head);
    }

    fn epilogue(&mut self) {
        for exit in std::mem::take(&mut self.exits) {
            self.buf.patch(exit);
        }
        for (pair, offset) in SAVED_PAIRS.into_iter().rev() {
            self.emit(match pair {
                SavedPair::Gpr(a, b) => enc::ldp_x(a, b, SP, offset),
                SavedPair::Fpr(a, b) => enc::ldp_d(a, b, SP, offset),
            });
        }
        self.emit(enc::ldp_x_post(enc::regs::X29, enc::regs::X30, SP, FRAME_SIZE));
        self.emit(enc::ret());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::{modes::*, DepthOp};

    fn generator() -> CodeGenerator {
        CodeGenerator::new(&JitConfig::default())
    }

    #[test]
    fn minimal_routine_shape() {
        let config = PipelineConfig::new(ScanDirection::Forward);
        let code = generator().generate_to_vec(&config, 4096).unwrap();
        assert_eq!(code[0], enc::stp_x_pre(enc::regs::X29, enc::regs::X30, SP, -FRAME_SIZE));
        assert_eq!(*code.last().unwrap(), enc::ret());
    }

    #[test]
    fn disabled_stages_emit_nothing() {
        let plain = PipelineConfig::new(ScanDirection::Forward);
        let busy = plain
            .with_fbz_mode(FBZ_STIPPLE | FBZ_W_BUFFER | FBZ_DEPTH_ENABLE | FBZ_DEPTH_BIAS)
            .with_depth_op(DepthOp::Less)
            .with_tiled(true);
        let gen = generator();
        let small = gen.generate_to_vec(&plain, 4096).unwrap();
        let large = gen.generate_to_vec(&busy, 4096).unwrap();
        assert!(large.len() > small.len() + 30);
    }

    #[test]
    fn branches_are_all_resolved() {
        let config = PipelineConfig::new(ScanDirection::Backward)
            .with_fbz_mode(FBZ_STIPPLE | FBZ_STIPPLE_PATT | FBZ_W_BUFFER | FBZ_DEPTH_ENABLE)
            .with_depth_op(DepthOp::GreaterEqual);
        let mut code = vec![0u32; 4096];
        let report = generator().generate(&config, &mut code).unwrap();
        assert_eq!(report.reserved_patches, report.resolved_patches);
        // stipple skip, depth skip, two W-depth early outs
        assert_eq!(report.reserved_patches, 4);
    }

    #[test]
    fn small_block_overflows() {
        let config = PipelineConfig::new(ScanDirection::Forward);
        let mut code = vec![0u32; 16];
        let err = generator().generate(&config, &mut code).unwrap_err();
        assert!(matches!(err, crate::JitError::BlockOverflow { capacity: 64, .. }));
    }
}
