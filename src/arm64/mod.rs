// AArch64 backend of the pixel-pipeline recompiler. encoder turns typed operands into A64
// instruction words, assembler appends them to a code block and resolves forward branches,
// abi fixes which registers a generated routine pins and how its frame is laid out, and sim
// interprets the emitted subset so routines can run on hosts without native AArch64.

//! AArch64 backend.

pub mod abi;
pub mod assembler;
pub mod encoder;
pub mod sim;

pub use assembler::{CodeBuffer, CodeOffset, ForwardPatch, GenerationReport};
pub use encoder::{BranchKind, Cond, Reg, VReg};
pub use sim::{Machine, SimError};
