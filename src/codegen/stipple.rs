// Stipple test. The rotating mode shifts the 32-bit stipple register right by one position
// per pixel (bit 0 wraps to bit 31) and draws the pixel when the bit that lands in position
// 31 is set. The pattern mode treats the register as a 4x8 bit pattern and tests bit
// ((y & 3) << 3) | (~x & 7). A pixel that fails branches to the convergence point.

use crate::arm64::abi::{self, scratch::*};
use crate::arm64::encoder as enc;
use crate::core::fingerprint::StippleMode;

use super::Pass;

impl Pass<'_, '_> {
    pub(super) fn stipple(&mut self) {
        let state = self.gen.state;
        let skip = match self.config.stipple() {
            None => return,
            Some(StippleMode::Rotating) => {
                self.emit(enc::ldr_w(T0, abi::STATE, state.stipple));
                self.emit(enc::ror_imm_w(T0, T0, 1));
                self.emit(enc::str_w(T0, abi::STATE, state.stipple));
                self.buf.reserve_tbz(T0, 31)
            }
            Some(StippleMode::Pattern) => {
                self.emit(enc::and_mask_w(T0, abi::Y, 2));
                self.emit(enc::lsl_imm_w(T0, T0, 3));
                self.emit(enc::ldr_w(T1, abi::STATE, state.x));
                self.emit(enc::mvn_w(T1, T1));
                self.emit(enc::and_mask_w(T1, T1, 3));
                self.emit(enc::orr_w(T0, T0, T1));
                self.emit(enc::movz_w(T2, 1, 0));
                self.emit(enc::lsl_w(T2, T2, T0));
                self.emit(enc::ldr_w(T3, abi::STATE, state.stipple));
                self.emit(enc::tst_w(T3, T2));
                self.buf.reserve_b_cond(enc::Cond::Eq)
            }
        };
        self.skips.push(skip);
    }
}
