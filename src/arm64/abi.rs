// Register convention of generated routines, on top of AAPCS64. A routine is entered as
// `fn(state: *mut PixelState, params: *const PipelineParams, x: i32, y: i32)`, so the two
// structure pointers arrive in x0/x1 and stay there for the whole call. The frame keeps the
// frame record plus every callee-saved register the routine pins: four table bases, the
// scanline, and two vector constants (only the low 64 bits of v8-v15 are callee-saved, which
// is what STP/LDP of D registers cover). SAVED_PAIRS drives both the prologue stores and the
// epilogue loads so the two can never disagree.

//! Pinned registers and frame layout of generated routines.

use crate::arm64::encoder::{regs::*, Reg, VReg};

/// Emulator-state pointer (argument 0).
pub const STATE: Reg = X0;
/// Pipeline-parameter pointer (argument 1).
pub const PARAMS: Reg = X1;
/// Starting x (argument 2).
pub const ARG_X: Reg = X2;
/// Scanline (argument 3).
pub const ARG_Y: Reg = X3;

/// Colour surface row.
pub const FB_MEM: Reg = X8;
/// Depth surface row.
pub const AUX_MEM: Reg = X9;

pub const ALOOKUP: Reg = X19;
pub const AMINUSLOOKUP: Reg = X20;
pub const BILINEAR: Reg = X21;
pub const CONSTANTS: Reg = X22;
/// Scanline, kept for the stipple pattern.
pub const Y: Reg = X24;

pub const ONE_W: VReg = V8;
pub const FF_W: VReg = V9;

/// Scratch registers, caller-saved.
pub mod scratch {
    use crate::arm64::encoder::{regs::*, Reg, VReg};

    pub const T0: Reg = X4;
    pub const T1: Reg = X5;
    pub const T2: Reg = X6;
    pub const T3: Reg = X7;
    /// Depth value being computed.
    pub const DEPTH: Reg = X10;
    pub const T5: Reg = X11;
    pub const ADDR0: Reg = X16;
    pub const ADDR1: Reg = X17;
    pub const VACC: VReg = V0;
    pub const VGRAD: VReg = V1;
}

/// A register pair stored in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedPair {
    Gpr(Reg, Reg),
    Fpr(VReg, VReg),
}

/// Pairs below the frame record, in store order, with their frame offsets.
pub const SAVED_PAIRS: [(SavedPair, i32); 4] = [
    (SavedPair::Gpr(X19, X20), 16),
    (SavedPair::Gpr(X21, X22), 32),
    (SavedPair::Gpr(X23, X24), 48),
    (SavedPair::Fpr(V8, V9), 64),
];

/// Frame size in bytes, a multiple of 16.
pub const FRAME_SIZE: i32 = 80;
