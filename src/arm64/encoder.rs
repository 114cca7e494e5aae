// This module encodes the AArch64 (A64) instructions used by the pixel-pipeline generator.
// Every function is pure: it takes typed operands (Reg, VReg, Cond, immediates and byte
// offsets) and returns one 32-bit instruction word. Field packing is spelled out per
// instruction class with named helpers for the register slots and the scaled offset fields,
// and operand ranges are checked with debug assertions since all operands are generation-time
// constants chosen by the generator itself. Register number 31 means the zero register or the
// stack pointer depending on the instruction class, exactly as in the architecture. Branch
// offset fields are described by BranchKind, which the assembler also uses to patch forward
// branches after their target becomes known.

//! AArch64 instruction encoding.
//!
//! Only the instruction subset emitted by the code generator is covered. Widths are part of
//! the function name (`_w` for 32-bit, `_x` for 64-bit forms).

/// General-purpose register, 0..=31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(u8);

impl Reg {
    pub const fn new(id: u8) -> Self {
        assert!(id < 32, "general-purpose register out of range");
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0 as u32
    }
}

/// SIMD and floating-point register, 0..=31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VReg(u8);

impl VReg {
    pub const fn new(id: u8) -> Self {
        assert!(id < 32, "vector register out of range");
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0 as u32
    }
}

/// Register names used by the generator.
pub mod regs {
    use super::{Reg, VReg};

    pub const X0: Reg = Reg::new(0);
    pub const X1: Reg = Reg::new(1);
    pub const X2: Reg = Reg::new(2);
    pub const X3: Reg = Reg::new(3);
    pub const X4: Reg = Reg::new(4);
    pub const X5: Reg = Reg::new(5);
    pub const X6: Reg = Reg::new(6);
    pub const X7: Reg = Reg::new(7);
    pub const X8: Reg = Reg::new(8);
    pub const X9: Reg = Reg::new(9);
    pub const X10: Reg = Reg::new(10);
    pub const X11: Reg = Reg::new(11);
    pub const X16: Reg = Reg::new(16);
    pub const X17: Reg = Reg::new(17);
    pub const X19: Reg = Reg::new(19);
    pub const X20: Reg = Reg::new(20);
    pub const X21: Reg = Reg::new(21);
    pub const X22: Reg = Reg::new(22);
    pub const X23: Reg = Reg::new(23);
    pub const X24: Reg = Reg::new(24);
    pub const X29: Reg = Reg::new(29);
    pub const X30: Reg = Reg::new(30);
    /// Register 31 in data-processing instructions.
    pub const ZR: Reg = Reg::new(31);
    /// Register 31 as a base or in add/sub immediate.
    pub const SP: Reg = Reg::new(31);

    pub const V0: VReg = VReg::new(0);
    pub const V1: VReg = VReg::new(1);
    pub const V8: VReg = VReg::new(8);
    pub const V9: VReg = VReg::new(9);
}

/// Condition codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Eq = 0x0,
    Ne = 0x1,
    /// Unsigned higher or same (carry set).
    Hs = 0x2,
    /// Unsigned lower (carry clear).
    Lo = 0x3,
    Mi = 0x4,
    Pl = 0x5,
    Vs = 0x6,
    Vc = 0x7,
    Hi = 0x8,
    Ls = 0x9,
    Ge = 0xa,
    Lt = 0xb,
    Gt = 0xc,
    Le = 0xd,
    Al = 0xe,
}

impl Cond {
    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub fn from_bits(bits: u32) -> Self {
        match bits & 0xf {
            0x0 => Cond::Eq,
            0x1 => Cond::Ne,
            0x2 => Cond::Hs,
            0x3 => Cond::Lo,
            0x4 => Cond::Mi,
            0x5 => Cond::Pl,
            0x6 => Cond::Vs,
            0x7 => Cond::Vc,
            0x8 => Cond::Hi,
            0x9 => Cond::Ls,
            0xa => Cond::Ge,
            0xb => Cond::Lt,
            0xc => Cond::Gt,
            0xd => Cond::Le,
            _ => Cond::Al,
        }
    }

    /// The opposite condition. `Al` has none.
    pub fn invert(self) -> Self {
        debug_assert!(self != Cond::Al, "AL cannot be inverted");
        Cond::from_bits(self.bits() ^ 1)
    }
}

/// Branch classes, by width of their offset field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    /// `B`, imm26.
    Uncond,
    /// `B.cond`, imm19.
    Cond,
    /// `CBZ`/`CBNZ`, imm19.
    CompareZero,
    /// `TBZ`/`TBNZ`, imm14.
    TestBit,
}

impl BranchKind {
    pub const fn field_bits(self) -> u32 {
        match self {
            BranchKind::Uncond => 26,
            BranchKind::Cond | BranchKind::CompareZero => 19,
            BranchKind::TestBit => 14,
        }
    }

    /// Whether a byte offset is encodable in this branch's field.
    pub fn fits(self, offset: i64) -> bool {
        let limit = 1i64 << (self.field_bits() - 1);
        offset & 3 == 0 && (-limit..limit).contains(&(offset >> 2))
    }

    /// The offset field for a byte offset, ready to be OR-ed into the instruction.
    pub fn encode_offset(self, offset: i32) -> u32 {
        debug_assert!(
            self.fits(offset as i64),
            "branch offset {offset} does not fit {self:?}"
        );
        let words = (offset >> 2) as u32;
        match self {
            BranchKind::Uncond => words & 0x03ff_ffff,
            BranchKind::Cond | BranchKind::CompareZero => (words << 5) & 0x00ff_ffe0,
            BranchKind::TestBit => (words << 5) & 0x0007_ffe0,
        }
    }
}

#[inline]
const fn rd(r: Reg) -> u32 {
    r.id()
}

#[inline]
const fn rn(r: Reg) -> u32 {
    r.id() << 5
}

#[inline]
const fn rm(r: Reg) -> u32 {
    r.id() << 16
}

#[inline]
const fn rt2(r: Reg) -> u32 {
    r.id() << 10
}

#[inline]
const fn vd(r: VReg) -> u32 {
    r.id()
}

#[inline]
const fn vn(r: VReg) -> u32 {
    r.id() << 5
}

#[inline]
const fn vm(r: VReg) -> u32 {
    r.id() << 16
}

fn imm12(imm: u32) -> u32 {
    debug_assert!(imm < 4096, "imm12 {imm:#x} out of range");
    imm << 10
}

/// Unsigned offset scaled by the access size.
fn scaled_offset(offset: u32, size: u32) -> u32 {
    debug_assert!(offset % size == 0, "offset {offset} not a multiple of {size}");
    imm12(offset / size)
}

/// Signed 7-bit pair offset scaled by 8.
fn pair_offset(offset: i32) -> u32 {
    debug_assert!(offset % 8 == 0 && (-512..=504).contains(&offset), "pair offset {offset}");
    (((offset >> 3) as u32) & 0x7f) << 15
}

fn shift_amount(shift: u32) -> u32 {
    debug_assert!(shift < 32, "shift {shift} out of range");
    shift
}

// Moves

pub fn mov_w(d: Reg, m: Reg) -> u32 {
    0x2A00_03E0 | rm(m) | rd(d)
}

pub fn mov_x(d: Reg, m: Reg) -> u32 {
    0xAA00_03E0 | rm(m) | rd(d)
}

pub fn movz_w(d: Reg, imm16: u32, hw: u32) -> u32 {
    debug_assert!(imm16 <= 0xffff && hw < 2);
    0x5280_0000 | (hw << 21) | (imm16 << 5) | rd(d)
}

pub fn movz_x(d: Reg, imm16: u32, hw: u32) -> u32 {
    debug_assert!(imm16 <= 0xffff && hw < 4);
    0xD280_0000 | (hw << 21) | (imm16 << 5) | rd(d)
}

pub fn movk_x(d: Reg, imm16: u32, hw: u32) -> u32 {
    debug_assert!(imm16 <= 0xffff && hw < 4);
    0xF280_0000 | (hw << 21) | (imm16 << 5) | rd(d)
}

pub fn mvn_w(d: Reg, m: Reg) -> u32 {
    0x2A20_03E0 | rm(m) | rd(d)
}

// Arithmetic, shifted register

pub fn add_w(d: Reg, n: Reg, m: Reg) -> u32 {
    0x0B00_0000 | rm(m) | rn(n) | rd(d)
}

pub fn add_w_lsl(d: Reg, n: Reg, m: Reg, shift: u32) -> u32 {
    add_w(d, n, m) | (shift_amount(shift) << 10)
}

pub fn add_x(d: Reg, n: Reg, m: Reg) -> u32 {
    0x8B00_0000 | rm(m) | rn(n) | rd(d)
}

pub fn sub_w(d: Reg, n: Reg, m: Reg) -> u32 {
    0x4B00_0000 | rm(m) | rn(n) | rd(d)
}

pub fn sub_x(d: Reg, n: Reg, m: Reg) -> u32 {
    0xCB00_0000 | rm(m) | rn(n) | rd(d)
}

pub fn cmp_w(n: Reg, m: Reg) -> u32 {
    0x6B00_001F | rm(m) | rn(n)
}

// Arithmetic, immediate. Register 31 is SP here.

pub fn add_imm_w(d: Reg, n: Reg, imm: u32) -> u32 {
    0x1100_0000 | imm12(imm) | rn(n) | rd(d)
}

pub fn add_imm_x(d: Reg, n: Reg, imm: u32) -> u32 {
    0x9100_0000 | imm12(imm) | rn(n) | rd(d)
}

pub fn sub_imm_w(d: Reg, n: Reg, imm: u32) -> u32 {
    0x5100_0000 | imm12(imm) | rn(n) | rd(d)
}

pub fn cmp_imm_w(n: Reg, imm: u32) -> u32 {
    0x7100_001F | imm12(imm) | rn(n)
}

// Logical

pub fn orr_w(d: Reg, n: Reg, m: Reg) -> u32 {
    0x2A00_0000 | rm(m) | rn(n) | rd(d)
}

pub fn tst_w(n: Reg, m: Reg) -> u32 {
    0x6A00_001F | rm(m) | rn(n)
}

/// `AND Wd, Wn, #((1 << width) - 1)`.
pub fn and_mask_w(d: Reg, n: Reg, width: u32) -> u32 {
    debug_assert!((1..32).contains(&width), "mask width {width}");
    0x1200_0000 | ((width - 1) << 10) | rn(n) | rd(d)
}

// Shifts and bitfields

pub fn lsl_w(d: Reg, n: Reg, m: Reg) -> u32 {
    0x1AC0_2000 | rm(m) | rn(n) | rd(d)
}

pub fn lsr_w(d: Reg, n: Reg, m: Reg) -> u32 {
    0x1AC0_2400 | rm(m) | rn(n) | rd(d)
}

pub fn lsl_imm_w(d: Reg, n: Reg, shift: u32) -> u32 {
    let shift = shift_amount(shift);
    0x5300_0000 | ((shift.wrapping_neg() & 31) << 16) | ((31 - shift) << 10) | rn(n) | rd(d)
}

pub fn lsr_imm_w(d: Reg, n: Reg, shift: u32) -> u32 {
    0x5300_0000 | (shift_amount(shift) << 16) | (31 << 10) | rn(n) | rd(d)
}

pub fn asr_imm_w(d: Reg, n: Reg, shift: u32) -> u32 {
    0x1300_7C00 | (shift_amount(shift) << 16) | rn(n) | rd(d)
}

/// `ROR Wd, Ws, #shift`, encoded as `EXTR Wd, Ws, Ws, #shift`.
pub fn ror_imm_w(d: Reg, s: Reg, shift: u32) -> u32 {
    0x1380_0000 | rm(s) | (shift_amount(shift) << 10) | rn(s) | rd(d)
}

pub fn uxth_w(d: Reg, n: Reg) -> u32 {
    0x5300_3C00 | rn(n) | rd(d)
}

pub fn clz_w(d: Reg, n: Reg) -> u32 {
    0x5AC0_1000 | rn(n) | rd(d)
}

// Conditional select

/// `Wd = cond ? Wn : Wm`.
pub fn csel_w(d: Reg, n: Reg, m: Reg, cond: Cond) -> u32 {
    0x1A80_0000 | (cond.bits() << 12) | rm(m) | rn(n) | rd(d)
}

/// `Wd = cond ? 1 : 0`.
pub fn cset_w(d: Reg, cond: Cond) -> u32 {
    0x1A9F_07E0 | (cond.invert().bits() << 12) | rd(d)
}

// Loads and stores, unsigned scaled offset

pub fn ldrh(t: Reg, n: Reg, offset: u32) -> u32 {
    0x7940_0000 | scaled_offset(offset, 2) | rn(n) | rd(t)
}

pub fn ldr_w(t: Reg, n: Reg, offset: u32) -> u32 {
    0xB940_0000 | scaled_offset(offset, 4) | rn(n) | rd(t)
}

pub fn ldr_x(t: Reg, n: Reg, offset: u32) -> u32 {
    0xF940_0000 | scaled_offset(offset, 8) | rn(n) | rd(t)
}

pub fn str_w(t: Reg, n: Reg, offset: u32) -> u32 {
    0xB900_0000 | scaled_offset(offset, 4) | rn(n) | rd(t)
}

pub fn str_x(t: Reg, n: Reg, offset: u32) -> u32 {
    0xF900_0000 | scaled_offset(offset, 8) | rn(n) | rd(t)
}

/// `LDRH Wt, [Xn, Xm, LSL #1]`.
pub fn ldrh_reg_lsl1(t: Reg, n: Reg, m: Reg) -> u32 {
    0x7860_7800 | rm(m) | rn(n) | rd(t)
}

pub fn ldr_q(t: VReg, n: Reg, offset: u32) -> u32 {
    0x3DC0_0000 | scaled_offset(offset, 16) | rn(n) | vd(t)
}

/// `LD1 {Vt.4S}, [Xn]`, no alignment requirement beyond the element size.
pub fn ld1_4s(t: VReg, n: Reg) -> u32 {
    0x4C40_7800 | rn(n) | vd(t)
}

pub fn st1_4s(t: VReg, n: Reg) -> u32 {
    0x4C00_7800 | rn(n) | vd(t)
}

// Register pairs

pub fn stp_x_pre(t: Reg, t2: Reg, n: Reg, offset: i32) -> u32 {
    0xA980_0000 | pair_offset(offset) | rt2(t2) | rn(n) | rd(t)
}

pub fn ldp_x_post(t: Reg, t2: Reg, n: Reg, offset: i32) -> u32 {
    0xA8C0_0000 | pair_offset(offset) | rt2(t2) | rn(n) | rd(t)
}

pub fn stp_x(t: Reg, t2: Reg, n: Reg, offset: i32) -> u32 {
    0xA900_0000 | pair_offset(offset) | rt2(t2) | rn(n) | rd(t)
}

pub fn ldp_x(t: Reg, t2: Reg, n: Reg, offset: i32) -> u32 {
    0xA940_0000 | pair_offset(offset) | rt2(t2) | rn(n) | rd(t)
}

pub fn stp_d(t: VReg, t2: VReg, n: Reg, offset: i32) -> u32 {
    0x6D00_0000 | pair_offset(offset) | (t2.id() << 10) | rn(n) | vd(t)
}

pub fn ldp_d(t: VReg, t2: VReg, n: Reg, offset: i32) -> u32 {
    0x6D40_0000 | pair_offset(offset) | (t2.id() << 10) | rn(n) | vd(t)
}

// Vector integer arithmetic

pub fn add_4s(d: VReg, n: VReg, m: VReg) -> u32 {
    0x4EA0_8400 | vm(m) | vn(n) | vd(d)
}

pub fn sub_4s(d: VReg, n: VReg, m: VReg) -> u32 {
    0x6EA0_8400 | vm(m) | vn(n) | vd(d)
}

pub fn add_2d(d: VReg, n: VReg, m: VReg) -> u32 {
    0x4EE0_8400 | vm(m) | vn(n) | vd(d)
}

pub fn sub_2d(d: VReg, n: VReg, m: VReg) -> u32 {
    0x6EE0_8400 | vm(m) | vn(n) | vd(d)
}

// Branches. Offsets are in bytes relative to the branch itself.

pub fn b(offset: i32) -> u32 {
    0x1400_0000 | BranchKind::Uncond.encode_offset(offset)
}

pub fn b_cond(cond: Cond, offset: i32) -> u32 {
    0x5400_0000 | BranchKind::Cond.encode_offset(offset) | cond.bits()
}

pub fn cbz_w(t: Reg, offset: i32) -> u32 {
    0x3400_0000 | BranchKind::CompareZero.encode_offset(offset) | rd(t)
}

pub fn cbnz_w(t: Reg, offset: i32) -> u32 {
    0x3500_0000 | BranchKind::CompareZero.encode_offset(offset) | rd(t)
}

fn test_bit(bit: u32) -> u32 {
    debug_assert!(bit < 64, "test bit {bit}");
    ((bit & 0x1f) << 19) | if bit & 0x20 != 0 { 1 << 31 } else { 0 }
}

pub fn tbz(t: Reg, bit: u32, offset: i32) -> u32 {
    0x3600_0000 | test_bit(bit) | BranchKind::TestBit.encode_offset(offset) | rd(t)
}

pub fn ret() -> u32 {
    0xD65F_03C0
}

pub fn nop() -> u32 {
    0xD503_201F
}

/// Instructions that load a 64-bit constant, four halfwords at a time.
pub fn mov_imm64(d: Reg, value: u64) -> [u32; 4] {
    [
        movz_x(d, (value & 0xffff) as u32, 0),
        movk_x(d, ((value >> 16) & 0xffff) as u32, 1),
        movk_x(d, ((value >> 32) & 0xffff) as u32, 2),
        movk_x(d, ((value >> 48) & 0xffff) as u32, 3),
    ]
}
