//! Architecture-neutral infrastructure.
//!
//! This module contains the pieces shared by the generator, the runtime and the
//! interpreter: the configuration fingerprint, the layout of the two external
//! structures, the shared lookup tables, runtime configuration and errors.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod layout;
pub mod tables;

pub use config::{JitConfig, BLOCK_NUM, PARITY_COUNT};
pub use error::{JitError, JitResult};
pub use fingerprint::{modes, DepthOp, PipelineConfig, ScanDirection, StippleMode, TextureUnit};
pub use layout::{ParamsLayout, PipelineParams, PixelState, StateLayout, TmuCoords, TmuGradients};
pub use tables::SharedTables;
