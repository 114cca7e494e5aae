//! voodoo-jit - a recompiler for the pixel pipeline of a Voodoo-class 3-D accelerator.
//!
//! The renderer of the emulated card walks every triangle one horizontal span at a time.
//! Each span runs the same per-pixel stages (stipple, depth, texture, increments) whose
//! behaviour is selected by a handful of mode registers. This crate specializes that loop:
//! for each distinct combination of mode registers it emits one AArch64 routine with every
//! disabled stage left out, keeps it in a small cache of executable code blocks, and calls it
//! for every span drawn under that configuration.
//!
//! # Primary Usage
//!
//! ```no_run
//! use voodoo_jit::{Dispatcher, JitConfig, PipelineParams, PixelState};
//!
//! let mut dispatcher = Dispatcher::new(JitConfig::from_env())?;
//! let params = PipelineParams::default();
//! let mut state = PixelState::default();
//! // fb_mem/aux_mem point at the rows of the scanline being drawn.
//! unsafe { dispatcher.draw_span(&params, &mut state, 0, 63, 10)? };
//! # Ok::<(), voodoo_jit::JitError>(())
//! ```
//!
//! # Architecture
//!
//! - [`core`] - configuration fingerprint, structure layouts, shared tables, errors
//! - [`arm64`] - instruction encoder, code buffer with forward patches, register
//!   convention, and an instruction simulator for non-AArch64 hosts
//! - [`codegen`] - the span-routine generator
//! - [`runtime`] - executable memory with scoped W^X publication, the block cache and the
//!   span dispatcher
//! - [`reference`] - the span interpreter used as fallback and test oracle
//! - [`dump`] - ELF and hex views of a routine

pub mod arm64;
pub mod codegen;
pub mod core;
pub mod dump;
pub mod reference;
pub mod runtime;

pub use crate::codegen::{CodeGenerator, StagedTexel, TextureFetch};
pub use crate::core::{
    DepthOp, JitConfig, JitError, JitResult, PipelineConfig, PipelineParams, PixelState,
    ScanDirection, StippleMode, TextureUnit, BLOCK_NUM, PARITY_COUNT,
};
pub use crate::reference::Interpreter;
pub use crate::runtime::{BlockCache, CacheStats, Dispatcher, GeneratedRoutine, SlotStatus};
