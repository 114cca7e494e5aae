// A small AArch64 interpreter covering the instruction classes the pixel-pipeline generator
// emits: wide moves, add/sub (immediate and shifted register, with flags), logical immediate
// and shifted register, bitfield moves and EXTR, variable shifts, CLZ, conditional select,
// scalar loads and stores (unsigned offset and register offset), register pairs, single
// register LD1/ST1, vector ADD/SUB, and the branch family. It runs generated routines on
// hosts that cannot execute AArch64 code natively and lets tests execute a routine on every
// host. Memory operands are raw host addresses, exactly as the native routine would see them;
// the machine only owns its registers and a private stack. A call ends when the routine
// returns to a sentinel link address.

//! AArch64 instruction-subset simulator.

use log::trace;
use std::ptr;
use thiserror::Error;

use crate::arm64::encoder::Cond;

/// Link address that ends a simulated call.
pub const RETURN_SENTINEL: u64 = 0xffff_ffff_ffff_fff0;

const DEFAULT_STEP_LIMIT: u64 = 50_000_000;
const STACK_WORDS: usize = 8192;

/// Faults raised while simulating.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("unsupported instruction {word:#010x} at {pc:#x}")]
    Unsupported { pc: u64, word: u32 },

    #[error("step limit exceeded at {pc:#x}")]
    StepLimit { pc: u64 },

    #[error("stack pointer {sp:#x} not restored on return")]
    UnbalancedStack { pc: u64, sp: u64 },
}

/// Condition flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub n: bool,
    pub z: bool,
    pub c: bool,
    pub v: bool,
}

impl Flags {
    pub fn holds(&self, cond: Cond) -> bool {
        match cond {
            Cond::Eq => self.z,
            Cond::Ne => !self.z,
            Cond::Hs => self.c,
            Cond::Lo => !self.c,
            Cond::Mi => self.n,
            Cond::Pl => !self.n,
            Cond::Vs => self.v,
            Cond::Vc => !self.v,
            Cond::Hi => self.c && !self.z,
            Cond::Ls => !(self.c && !self.z),
            Cond::Ge => self.n == self.v,
            Cond::Lt => self.n != self.v,
            Cond::Gt => !self.z && self.n == self.v,
            Cond::Le => !(!self.z && self.n == self.v),
            Cond::Al => true,
        }
    }
}

/// Architectural state of one simulated core.
pub struct Machine {
    x: [u64; 31],
    sp: u64,
    v: [u128; 32],
    flags: Flags,
    pc: u64,
    stack: Vec<u64>,
    step_limit: u64,
    steps: u64,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

fn ones(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn width_mask(sf: bool) -> u64 {
    if sf {
        u64::MAX
    } else {
        u32::MAX as u64
    }
}

fn sign_extend(value: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

fn field(word: u32, lo: u32, bits: u32) -> u32 {
    (word >> lo) & ((1u32 << bits) - 1)
}

/// `(result, flags)` of `a + b + carry` at the given width.
fn add_with_carry(a: u64, b: u64, carry: bool, sf: bool) -> (u64, Flags) {
    let mask = width_mask(sf);
    let bits = if sf { 64 } else { 32 };
    let (a, b) = (a & mask, b & mask);
    let wide = a as u128 + b as u128 + carry as u128;
    let result = (wide as u64) & mask;
    let signed = sign_extend(a, bits) as i128 + sign_extend(b, bits) as i128 + carry as i128;
    let flags = Flags {
        n: (result >> (bits - 1)) & 1 == 1,
        z: result == 0,
        c: wide > mask as u128,
        v: signed != sign_extend(result, bits) as i128,
    };
    (result, flags)
}

fn shift_value(value: u64, kind: u32, amount: u32, sf: bool) -> u64 {
    let bits = if sf { 64 } else { 32 };
    let mask = width_mask(sf);
    let value = value & mask;
    let amount = amount % bits;
    match kind {
        0 => (value << amount) & mask,
        1 => value >> amount,
        2 => (sign_extend(value, bits) >> amount) as u64 & mask,
        _ => {
            if amount == 0 {
                value
            } else {
                ((value >> amount) | (value << (bits - amount))) & mask
            }
        }
    }
}

fn decode_bit_mask(n: u32, imms: u32, immr: u32, sf: bool) -> Option<u64> {
    let combined = (n << 6) | (!imms & 0x3f);
    if combined == 0 {
        return None;
    }
    let len = 31 - combined.leading_zeros();
    if len < 1 || (!sf && n == 1) {
        return None;
    }
    let esize = 1u32 << len;
    let levels = esize - 1;
    let s = imms & levels;
    let r = immr & levels;
    if s == levels {
        return None;
    }
    let welem = ones(s + 1);
    let elem = if r == 0 {
        welem
    } else {
        ((welem >> r) | (welem << (esize - r))) & ones(esize)
    };
    let width = if sf { 64 } else { 32 };
    let mut mask = 0u64;
    let mut pos = 0;
    while pos < width {
        mask |= elem << pos;
        pos += esize;
    }
    Some(mask & width_mask(sf))
}

impl Machine {
    pub fn new() -> Self {
        let stack = vec![0u64; STACK_WORDS];
        let top = (stack.as_ptr() as u64 + (STACK_WORDS * 8) as u64) & !15;
        Self {
            x: [0; 31],
            sp: top,
            v: [0; 32],
            flags: Flags::default(),
            pc: 0,
            stack,
            step_limit: DEFAULT_STEP_LIMIT,
            steps: 0,
        }
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Read a general register; 31 reads as zero.
    pub fn reg(&self, n: u32) -> u64 {
        if n == 31 {
            0
        } else {
            self.x[n as usize]
        }
    }

    /// Write a general register; writes to 31 are discarded.
    pub fn set_reg(&mut self, n: u32, value: u64) {
        if n != 31 {
            self.x[n as usize] = value;
        }
    }

    pub fn vreg(&self, n: u32) -> u128 {
        self.v[n as usize]
    }

    pub fn set_vreg(&mut self, n: u32, value: u128) {
        self.v[n as usize] = value;
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn sp(&self) -> u64 {
        self.sp
    }

    /// Instructions executed by the last call.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn reg_sp(&self, n: u32) -> u64 {
        if n == 31 {
            self.sp
        } else {
            self.x[n as usize]
        }
    }

    fn set_reg_sp(&mut self, n: u32, value: u64) {
        if n == 31 {
            self.sp = value;
        } else {
            self.x[n as usize] = value;
        }
    }

    fn set_reg_width(&mut self, n: u32, value: u64, sf: bool) {
        self.set_reg(n, value & width_mask(sf));
    }

    /// Call the routine at `entry` with up to eight integer arguments and run until it
    /// returns. Returns x0.
    ///
    /// # Safety
    ///
    /// `entry` must point at readable AArch64 code, and every address the code loads from or
    /// stores to must be valid for that access.
    pub unsafe fn call(&mut self, entry: *const u32, args: &[u64]) -> Result<u64, SimError> {
        debug_assert!(args.len() <= 8);
        for (i, &arg) in args.iter().enumerate() {
            self.x[i] = arg;
        }
        self.x[30] = RETURN_SENTINEL;
        self.pc = entry as u64;
        self.steps = 0;
        let stack_top = (self.stack.as_ptr() as u64 + (STACK_WORDS * 8) as u64) & !15;
        self.sp = stack_top;

        while self.pc != RETURN_SENTINEL {
            if self.steps >= self.step_limit {
                return Err(SimError::StepLimit { pc: self.pc });
            }
            self.step()?;
            self.steps += 1;
        }

        if self.sp != stack_top {
            return Err(SimError::UnbalancedStack { pc: self.pc, sp: self.sp });
        }
        trace!("simulated call finished after {} steps", self.steps);
        Ok(self.x[0])
    }

    /// Execute the instruction at pc.
    ///
    /// # Safety
    ///
    /// Same contract as [`Machine::call`].
    pub unsafe fn step(&mut self) -> Result<(), SimError> {
        let pc = self.pc;
        let word = ptr::read_unaligned(pc as *const u32);
        let unsupported = SimError::Unsupported { pc, word };
        let mut next = pc.wrapping_add(4);

        let rd = field(word, 0, 5);
        let rn = field(word, 5, 5);
        let rm = field(word, 16, 5);
        let sf = word >> 31 == 1;

        if word & 0xFFFF_FC1F == 0xD65F_0000 {
            // RET
            next = self.reg(rn);
        } else if word == 0xD503_201F {
            // NOP
        } else if word & 0xFC00_0000 == 0x1400_0000 {
            // B
            let off = sign_extend(field(word, 0, 26) as u64, 26) << 2;
            next = pc.wrapping_add(off as u64);
        } else if word & 0xFF00_0010 == 0x5400_0000 {
            // B.cond
            if self.flags.holds(Cond::from_bits(word & 0xf)) {
                let off = sign_extend(field(word, 5, 19) as u64, 19) << 2;
                next = pc.wrapping_add(off as u64);
            }
        } else if word & 0x7E00_0000 == 0x3400_0000 {
            // CBZ / CBNZ
            let value = self.reg(rd) & width_mask(sf);
            let nonzero = word & (1 << 24) != 0;
            if (value != 0) == nonzero {
                let off = sign_extend(field(word, 5, 19) as u64, 19) << 2;
                next = pc.wrapping_add(off as u64);
            }
        } else if word & 0x7E00_0000 == 0x3600_0000 {
            // TBZ / TBNZ
            let bit = (field(word, 31, 1) << 5) | field(word, 19, 5);
            let set = (self.reg(rd) >> bit) & 1 == 1;
            let nonzero = word & (1 << 24) != 0;
            if set == nonzero {
                let off = sign_extend(field(word, 5, 14) as u64, 14) << 2;
                next = pc.wrapping_add(off as u64);
            }
        } else if word & 0x1F80_0000 == 0x1280_0000 {
            // MOVN / MOVZ / MOVK
            let hw = field(word, 21, 2);
            let imm = (field(word, 5, 16) as u64) << (hw * 16);
            let value = match field(word, 29, 2) {
                0 => !imm,
                2 => imm,
                3 => (self.reg(rd) & !(0xffffu64 << (hw * 16))) | imm,
                _ => return Err(unsupported),
            };
            self.set_reg_width(rd, value, sf);
        } else if word & 0x1F00_0000 == 0x1100_0000 {
            // ADD / SUB (immediate)
            let mut imm = field(word, 10, 12) as u64;
            if word & (1 << 22) != 0 {
                imm <<= 12;
            }
            let sub = word & (1 << 30) != 0;
            let set_flags = word & (1 << 29) != 0;
            let a = self.reg_sp(rn);
            let (result, flags) = if sub {
                add_with_carry(a, !imm, true, sf)
            } else {
                add_with_carry(a, imm, false, sf)
            };
            if set_flags {
                self.flags = flags;
                self.set_reg(rd, result);
            } else {
                self.set_reg_sp(rd, result);
            }
        } else if word & 0x1F80_0000 == 0x1200_0000 {
            // Logical (immediate)
            let imm = decode_bit_mask(
                field(word, 22, 1),
                field(word, 10, 6),
                field(word, 16, 6),
                sf,
            )
            .ok_or(unsupported.clone())?;
            let a = self.reg(rn);
            let result = match field(word, 29, 2) {
                0 | 3 => a & imm,
                1 => a | imm,
                _ => a ^ imm,
            } & width_mask(sf);
            if field(word, 29, 2) == 3 {
                self.set_logical_flags(result, sf);
                self.set_reg(rd, result);
            } else {
                self.set_reg_sp(rd, result);
            }
        } else if word & 0x1F80_0000 == 0x1300_0000 {
            // SBFM / BFM / UBFM
            let immr = field(word, 16, 6);
            let imms = field(word, 10, 6);
            let bits = if sf { 64 } else { 32 };
            let src = self.reg(rn) & width_mask(sf);
            let result = match field(word, 29, 2) {
                0 => {
                    if imms >= immr {
                        let len = imms - immr + 1;
                        sign_extend((src >> immr) & ones(len), len) as u64
                    } else {
                        let len = imms + 1;
                        (sign_extend(src & ones(len), len) as u64) << (bits - immr)
                    }
                }
                2 => {
                    if imms >= immr {
                        (src >> immr) & ones(imms - immr + 1)
                    } else {
                        (src & ones(imms + 1)) << (bits - immr)
                    }
                }
                _ => return Err(unsupported),
            };
            self.set_reg_width(rd, result, sf);
        } else if word & 0x1F80_0000 == 0x1380_0000 {
            // EXTR
            let lsb = field(word, 10, 6);
            let result = if sf {
                let wide = ((self.reg(rn) as u128) << 64) | self.reg(rm) as u128;
                (wide >> lsb) as u64
            } else {
                let wide = ((self.reg(rn) & 0xffff_ffff) << 32) | (self.reg(rm) & 0xffff_ffff);
                wide >> lsb
            };
            self.set_reg_width(rd, result, sf);
        } else if word & 0x1F00_0000 == 0x0A00_0000 {
            // Logical (shifted register)
            let mut b = shift_value(self.reg(rm), field(word, 22, 2), field(word, 10, 6), sf);
            if word & (1 << 21) != 0 {
                b = !b;
            }
            let a = self.reg(rn);
            let opc = field(word, 29, 2);
            let result = match opc {
                0 | 3 => a & b,
                1 => a | b,
                _ => a ^ b,
            } & width_mask(sf);
            if opc == 3 {
                self.set_logical_flags(result, sf);
            }
            self.set_reg(rd, result);
        } else if word & 0x1F20_0000 == 0x0B00_0000 {
            // ADD / SUB (shifted register)
            let b = shift_value(self.reg(rm), field(word, 22, 2), field(word, 10, 6), sf);
            let a = self.reg(rn);
            let (result, flags) = if word & (1 << 30) != 0 {
                add_with_carry(a, !b, true, sf)
            } else {
                add_with_carry(a, b, false, sf)
            };
            if word & (1 << 29) != 0 {
                self.flags = flags;
            }
            self.set_reg(rd, result);
        } else if word & 0x7FE0_F000 == 0x1AC0_2000 {
            // LSLV / LSRV / ASRV / RORV
            let amount = self.reg(rm) as u32;
            let result = shift_value(self.reg(rn), field(word, 10, 2), amount, sf);
            self.set_reg_width(rd, result, sf);
        } else if word & 0x7FFF_FC00 == 0x5AC0_1000 {
            // CLZ
            let result = if sf {
                self.reg(rn).leading_zeros() as u64
            } else {
                (self.reg(rn) as u32).leading_zeros() as u64
            };
            self.set_reg(rd, result);
        } else if word & 0x3FE0_0800 == 0x1A80_0000 {
            // CSEL / CSINC / CSINV / CSNEG
            let cond = Cond::from_bits(field(word, 12, 4));
            let result = if self.flags.holds(cond) {
                self.reg(rn)
            } else {
                let m = self.reg(rm);
                match (field(word, 30, 1), field(word, 10, 1)) {
                    (0, 0) => m,
                    (0, _) => m.wrapping_add(1),
                    (_, 0) => !m,
                    _ => m.wrapping_neg(),
                }
            };
            self.set_reg_width(rd, result, sf);
        } else if word & 0x3B00_0000 == 0x3900_0000 {
            // LDR / STR (unsigned offset)
            let (bytes, load) = Self::access_shape(word).ok_or(unsupported.clone())?;
            let addr = self.reg_sp(rn).wrapping_add(field(word, 10, 12) as u64 * bytes);
            self.transfer(word, rd, addr, bytes, load);
        } else if word & 0x3B20_0C00 == 0x3820_0800 {
            // LDR / STR (register offset)
            let (bytes, load) = Self::access_shape(word).ok_or(unsupported.clone())?;
            let option = field(word, 13, 3);
            let mut offset = match option {
                2 => self.reg(rm) & 0xffff_ffff,
                6 => sign_extend(self.reg(rm) & 0xffff_ffff, 32) as u64,
                3 | 7 => self.reg(rm),
                _ => return Err(unsupported),
            };
            if word & (1 << 12) != 0 {
                offset <<= bytes.trailing_zeros();
            }
            let addr = self.reg_sp(rn).wrapping_add(offset);
            self.transfer(word, rd, addr, bytes, load);
        } else if word & 0x3A00_0000 == 0x2800_0000 {
            // LDP / STP
            let simd = word & (1 << 26) != 0;
            let opc = field(word, 30, 2);
            let bytes: u64 = match (simd, opc) {
                (false, 0) | (true, 0) => 4,
                (false, 2) | (true, 1) => 8,
                (true, 2) => 16,
                _ => return Err(unsupported),
            };
            let offset = sign_extend(field(word, 15, 7) as u64, 7) * bytes as i64;
            let base = self.reg_sp(rn);
            let (addr, writeback) = match field(word, 23, 2) {
                1 => (base, Some(base.wrapping_add(offset as u64))),
                2 => (base.wrapping_add(offset as u64), None),
                3 => {
                    let addr = base.wrapping_add(offset as u64);
                    (addr, Some(addr))
                }
                _ => return Err(unsupported),
            };
            let rt2 = field(word, 10, 5);
            let load = word & (1 << 22) != 0;
            self.transfer_reg(simd, rd, addr, bytes, load);
            self.transfer_reg(simd, rt2, addr.wrapping_add(bytes), bytes, load);
            if let Some(base) = writeback {
                self.set_reg_sp(rn, base);
            }
        } else if word & 0xBFBF_F000 == 0x0C00_7000 {
            // LD1 / ST1, one register
            let bytes = if word & (1 << 30) != 0 { 16 } else { 8 };
            let addr = self.reg_sp(rn);
            self.transfer_reg(true, rd, addr, bytes, word & (1 << 22) != 0);
        } else if word & 0x9F20_FC00 == 0x0E20_8400 {
            // ADD / SUB (vector)
            let lane_bits = 8u32 << field(word, 22, 2);
            let total = if word & (1 << 30) != 0 { 128 } else { 64 };
            let sub = word & (1 << 29) != 0;
            let (a, b) = (self.vreg(rn), self.vreg(rm));
            let lane_mask = if lane_bits == 64 { u64::MAX as u128 } else { (1u128 << lane_bits) - 1 };
            let mut result = 0u128;
            let mut pos = 0;
            while pos < total {
                let x = (a >> pos) & lane_mask;
                let y = (b >> pos) & lane_mask;
                let lane = if sub { x.wrapping_sub(y) } else { x.wrapping_add(y) } & lane_mask;
                result |= lane << pos;
                pos += lane_bits;
            }
            self.set_vreg(rd, result);
        } else {
            return Err(unsupported);
        }

        self.pc = next;
        Ok(())
    }

    fn set_logical_flags(&mut self, result: u64, sf: bool) {
        let bits = if sf { 64 } else { 32 };
        self.flags = Flags {
            n: (result >> (bits - 1)) & 1 == 1,
            z: result == 0,
            c: false,
            v: false,
        };
    }

    /// Access size in bytes and direction of a single-register load or store.
    fn access_shape(word: u32) -> Option<(u64, bool)> {
        let size = field(word, 30, 2);
        let opc = field(word, 22, 2);
        if word & (1 << 26) != 0 {
            match (size, opc) {
                (0, 2) => Some((16, false)),
                (0, 3) => Some((16, true)),
                (_, 0) => Some((1 << size, false)),
                (_, 1) => Some((1 << size, true)),
                _ => None,
            }
        } else {
            match opc {
                0 => Some((1 << size, false)),
                1 => Some((1 << size, true)),
                _ => None,
            }
        }
    }

    unsafe fn transfer(&mut self, word: u32, rt: u32, addr: u64, bytes: u64, load: bool) {
        self.transfer_reg(word & (1 << 26) != 0, rt, addr, bytes, load);
    }

    unsafe fn transfer_reg(&mut self, simd: bool, rt: u32, addr: u64, bytes: u64, load: bool) {
        if load {
            let value = read_mem(addr, bytes);
            if simd {
                self.set_vreg(rt, value);
            } else {
                self.set_reg(rt, value as u64);
            }
        } else {
            let value = if simd {
                self.vreg(rt)
            } else {
                self.reg(rt) as u128
            };
            write_mem(addr, bytes, value);
        }
    }
}

unsafe fn read_mem(addr: u64, bytes: u64) -> u128 {
    match bytes {
        1 => ptr::read_unaligned(addr as *const u8) as u128,
        2 => ptr::read_unaligned(addr as *const u16) as u128,
        4 => ptr::read_unaligned(addr as *const u32) as u128,
        8 => ptr::read_unaligned(addr as *const u64) as u128,
        _ => ptr::read_unaligned(addr as *const u128),
    }
}

unsafe fn write_mem(addr: u64, bytes: u64, value: u128) {
    match bytes {
        1 => ptr::write_unaligned(addr as *mut u8, value as u8),
        2 => ptr::write_unaligned(addr as *mut u16, value as u16),
        4 => ptr::write_unaligned(addr as *mut u32, value as u32),
        8 => ptr::write_unaligned(addr as *mut u64, value as u64),
        _ => ptr::write_unaligned(addr as *mut u128, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm64::encoder::{self as enc, regs::*};

    fn run(code: &[u32], args: &[u64]) -> (Machine, u64) {
        let mut machine = Machine::new();
        let result = unsafe { machine.call(code.as_ptr(), args) }.unwrap();
        (machine, result)
    }

    #[test]
    fn arithmetic_and_return() {
        let code = [
            enc::add_w(X0, X0, X1),
            enc::sub_imm_w(X0, X0, 1),
            enc::ret(),
        ];
        let (_, result) = run(&code, &[40, 3]);
        assert_eq!(result, 42);
    }

    #[test]
    fn thirty_two_bit_results_zero_extend() {
        let code = [enc::sub_w(X0, X0, X1), enc::ret()];
        let (_, result) = run(&code, &[0, 1]);
        assert_eq!(result, 0xffff_ffff);
    }

    #[test]
    fn shifts_and_bitfields() {
        let code = [
            enc::lsl_imm_w(X1, X0, 3),
            enc::lsr_imm_w(X2, X0, 4),
            enc::asr_imm_w(X3, X0, 4),
            enc::uxth_w(X4, X0),
            enc::ror_imm_w(X5, X0, 1),
            enc::and_mask_w(X6, X0, 12),
            enc::clz_w(X7, X0),
            enc::ret(),
        ];
        let (m, _) = run(&code, &[0x8001_2345]);
        assert_eq!(m.reg(1), 0x0009_1a28);
        assert_eq!(m.reg(2), 0x0800_1234);
        assert_eq!(m.reg(3), 0xf800_1234);
        assert_eq!(m.reg(4), 0x2345);
        assert_eq!(m.reg(5), 0xc000_91a2);
        assert_eq!(m.reg(6), 0x345);
        assert_eq!(m.reg(7), 0);
    }

    #[test]
    fn compare_and_select() {
        let code = [
            enc::cmp_w(X0, X1),
            enc::cset_w(X2, Cond::Hi),
            enc::csel_w(X3, X0, X1, Cond::Lo),
            enc::mov_w(X0, X2),
            enc::ret(),
        ];
        let (m, hi) = run(&code, &[5, 3]);
        assert_eq!(hi, 1);
        assert_eq!(m.reg(3), 3);
        let (m, hi) = run(&code, &[3, 5]);
        assert_eq!(hi, 0);
        assert_eq!(m.reg(3), 3);
    }

    #[test]
    fn loop_with_backward_branch() {
        // x0 counts down to zero, x1 accumulates.
        let code = [
            enc::add_imm_w(X1, X1, 2),
            enc::sub_imm_w(X0, X0, 1),
            enc::cmp_imm_w(X0, 0),
            enc::b_cond(Cond::Ne, -12),
            enc::mov_w(X0, X1),
            enc::ret(),
        ];
        let (m, result) = run(&code, &[10, 0]);
        assert_eq!(result, 20);
        assert_eq!(m.steps(), 10 * 4 + 2);
    }

    #[test]
    fn memory_and_pairs() {
        let mut data = [0u64; 4];
        let code = [
            enc::stp_x_pre(X29, X30, SP, -16),
            enc::movz_w(X4, 0xbeef, 0),
            enc::str_w(X4, X0, 8),
            enc::ldrh(X5, X0, 8),
            enc::str_x(X5, X0, 16),
            enc::ldp_x_post(X29, X30, SP, 16),
            enc::ret(),
        ];
        let (_, _) = run(&code, &[data.as_mut_ptr() as u64]);
        assert_eq!(data[1], 0xbeef);
        assert_eq!(data[2], 0xbeef);
    }

    #[test]
    fn vector_lanes_wrap_independently() {
        let mut acc = [u32::MAX, 1, 2, 3];
        let grad = [1u32, 1, 1, 1];
        let code = [
            enc::ld1_4s(V0, X0),
            enc::ld1_4s(V1, X1),
            enc::add_4s(V0, V0, V1),
            enc::st1_4s(V0, X0),
            enc::ret(),
        ];
        run(&code, &[acc.as_mut_ptr() as u64, grad.as_ptr() as u64]);
        assert_eq!(acc, [0, 2, 3, 4]);
    }

    #[test]
    fn unsupported_word_is_an_error() {
        let code = [0x0000_0000u32];
        let mut machine = Machine::new();
        let err = unsafe { machine.call(code.as_ptr(), &[]) }.unwrap_err();
        assert!(matches!(err, SimError::Unsupported { word: 0, .. }));
    }

    #[test]
    fn runaway_loop_hits_step_limit() {
        let code = [enc::b(0)];
        let mut machine = Machine::new().with_step_limit(100);
        let err = unsafe { machine.call(code.as_ptr(), &[]) }.unwrap_err();
        assert!(matches!(err, SimError::StepLimit { .. }));
    }
}
