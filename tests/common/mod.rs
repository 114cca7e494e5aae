//! Helpers shared by the integration tests.

#![allow(dead_code)]

pub mod strategies;

use voodoo_jit::core::layout::TmuGradients;
use voodoo_jit::{
    CodeGenerator, GeneratedRoutine, Interpreter, JitConfig, PipelineConfig, PipelineParams,
    PixelState,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Rows wide enough for any tiled x below 128.
pub const ROW_WORDS: usize = 4096;

/// Colour and depth rows the routine can address.
pub struct Surface {
    pub fb: Vec<u16>,
    pub aux: Vec<u16>,
}

impl Surface {
    pub fn new(depth: u16) -> Self {
        Self {
            fb: vec![0; ROW_WORDS],
            aux: vec![depth; ROW_WORDS],
        }
    }

    /// A zeroed state pointing at this surface.
    pub fn state(&mut self) -> PixelState {
        PixelState {
            fb_mem: self.fb.as_mut_ptr(),
            aux_mem: self.aux.as_mut_ptr(),
            ..PixelState::default()
        }
    }
}

/// Every gradient set to one.
pub fn unit_gradients() -> PipelineParams {
    let tmu = TmuGradients {
        d_sdx: 1,
        d_tdx: 1,
        d_wdx: 1,
    };
    PipelineParams {
        d_bdx: 1,
        d_gdx: 1,
        d_rdx: 1,
        d_adx: 1,
        d_zdx: 1,
        d_wdx: 1,
        tmu: [tmu; 2],
        ..PipelineParams::default()
    }
}

pub fn generate(config: &PipelineConfig, dual_tmus: bool) -> Vec<u32> {
    let jit = JitConfig::default().with_dual_tmus(dual_tmus);
    CodeGenerator::new(&jit)
        .generate_to_vec(config, jit.block_words())
        .expect("routine fits the default block")
}

/// Generate and simulate the routine for `config` over the span already set up in `state`.
pub fn run_generated(
    config: &PipelineConfig,
    dual_tmus: bool,
    state: &mut PixelState,
    params: &PipelineParams,
    x: i32,
    y: i32,
) {
    let words = generate(config, dual_tmus);
    unsafe { GeneratedRoutine::from_words(&words).invoke(state, params, x, y) }
        .expect("simulated routine runs to completion");
}

pub fn run_reference(
    config: &PipelineConfig,
    dual_tmus: bool,
    state: &mut PixelState,
    params: &PipelineParams,
    x: i32,
    y: i32,
) {
    unsafe { Interpreter::new(dual_tmus).draw_span(config, state, params, x, y) };
}
