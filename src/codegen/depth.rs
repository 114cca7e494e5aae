// Depth stages of the pixel routine. depth_value() produces the 16-bit depth of the current
// pixel in the DEPTH scratch register, either from the interpolated W (a leading-zero count
// turns the 48-bit fixed-point reciprocal into a 4.12 floating-point-like value) or from the
// interpolated Z (shifted down by 12 and clamped). depth_bias_and_store() applies the optional
// bias and always stores the result as the pixel's new depth. depth_test() compares against
// the auxiliary surface and branches to the convergence point on failure, counting the
// failure first; the comparison is picked once per routine through skip_condition().

use crate::arm64::abi::{self, scratch::*};
use crate::arm64::encoder::{self as enc, regs::ZR, Cond};
use crate::core::fingerprint::DepthOp;

use super::Pass;

/// Branch condition that skips a pixel after `CMP new, old`, or `None` for the two
/// functions that need no comparison.
pub fn skip_condition(op: DepthOp) -> Option<Cond> {
    match op {
        DepthOp::Less => Some(Cond::Hs),
        DepthOp::Equal => Some(Cond::Ne),
        DepthOp::LessEqual => Some(Cond::Hi),
        DepthOp::Greater => Some(Cond::Ls),
        DepthOp::NotEqual => Some(Cond::Eq),
        DepthOp::GreaterEqual => Some(Cond::Lo),
        DepthOp::Never | DepthOp::Always => None,
    }
}

impl Pass<'_, '_> {
    pub(super) fn depth_value(&mut self) {
        let state = self.gen.state;

        if self.config.w_buffer() || self.config.fog_needs_w_depth() {
            self.emit(enc::movz_w(DEPTH, 0, 0));
            self.emit(enc::ldr_w(T0, abi::STATE, state.w + 4));
            self.emit(enc::uxth_w(T1, T0));
            // Bits 32..47 set: depth 0.
            let far = self.buf.reserve_cbnz(T1);

            self.emit(enc::ldr_w(T0, abi::STATE, state.w));
            self.emit(enc::movz_w(DEPTH, 0xf001, 0));
            self.emit(enc::mov_w(T1, T0));
            self.emit(enc::lsr_imm_w(T0, T0, 16));
            // Bits 16..31 clear: depth 0xf001.
            let near = self.buf.reserve_cbz(T0);

            self.emit(enc::clz_w(T2, T0));
            self.emit(enc::sub_imm_w(T3, T2, 16));
            self.emit(enc::movz_w(T5, 19, 0));
            self.emit(enc::sub_w(T5, T5, T3));
            self.emit(enc::mvn_w(T1, T1));
            self.emit(enc::lsr_w(T1, T1, T5));
            self.emit(enc::and_mask_w(T1, T1, 12));
            self.emit(enc::lsl_imm_w(T3, T3, 12));
            self.emit(enc::add_w(DEPTH, T3, T1));
            self.emit(enc::add_imm_w(DEPTH, DEPTH, 1));
            self.emit(enc::movz_w(T5, 0xffff, 0));
            self.emit(enc::cmp_w(DEPTH, T5));
            self.emit(enc::csel_w(DEPTH, T5, DEPTH, Cond::Hi));

            self.buf.patch(far);
            self.buf.patch(near);

            if self.config.fog_needs_w_depth() {
                self.emit(enc::str_w(DEPTH, abi::STATE, state.w_depth));
            }
        }

        if !self.config.w_buffer() {
            self.emit(enc::ldr_w(T0, abi::STATE, state.z));
            self.emit(enc::asr_imm_w(DEPTH, T0, 12));
            self.emit(enc::cmp_imm_w(DEPTH, 0));
            self.emit(enc::csel_w(DEPTH, ZR, DEPTH, Cond::Lt));
            self.emit(enc::movz_w(T5, 0xffff, 0));
            self.emit(enc::cmp_w(DEPTH, T5));
            self.emit(enc::csel_w(DEPTH, T5, DEPTH, Cond::Gt));
        }
    }

    pub(super) fn depth_bias_and_store(&mut self) {
        if self.config.depth_bias() {
            self.emit(enc::ldr_w(T0, abi::PARAMS, self.gen.params.za_color));
            self.emit(enc::add_w(DEPTH, DEPTH, T0));
            self.emit(enc::uxth_w(DEPTH, DEPTH));
        }
        self.emit(enc::str_w(DEPTH, abi::STATE, self.gen.state.new_depth));
    }

    pub(super) fn depth_test(&mut self) {
        if !self.config.depth_enabled() {
            return;
        }
        let (state, params) = (self.gen.state, self.gen.params);
        let op = self.config.depth_op();

        let Some(fail) = skip_condition(op) else {
            if op == DepthOp::Never {
                self.count_depth_failure(None);
                let exit = self.buf.reserve_b();
                self.exits.push(exit);
            }
            return;
        };

        // One fingerprint bit covers colour and aux tiling, so either one selects tiled x.
        let x = if self.config.tiled() { state.x_tiled } else { state.x };
        self.emit(enc::ldr_w(T0, abi::STATE, x));
        self.emit(enc::ldrh_reg_lsl1(T1, abi::AUX_MEM, T0));
        if self.config.depth_source() {
            self.emit(enc::ldrh(DEPTH, abi::PARAMS, params.za_color));
        }
        self.emit(enc::cmp_w(DEPTH, T1));
        self.count_depth_failure(Some(fail));
        let skip = self.buf.reserve_b_cond(fail);
        self.skips.push(skip);
    }

    /// Add one to the failure counter, or the outcome of `fail` on the current flags.
    fn count_depth_failure(&mut self, fail: Option<Cond>) {
        let counter = self.gen.state.z_func_fail;
        self.emit(enc::ldr_w(T3, abi::STATE, counter));
        match fail {
            Some(cond) => {
                self.emit(enc::cset_w(T2, cond));
                self.emit(enc::add_w(T3, T3, T2));
            }
            None => self.emit(enc::add_imm_w(T3, T3, 1)),
        }
        self.emit(enc::str_w(T3, abi::STATE, counter));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_relational_op_has_a_condition() {
        for op in DepthOp::ALL {
            let relational = !matches!(op, DepthOp::Never | DepthOp::Always);
            assert_eq!(skip_condition(op).is_some(), relational);
        }
    }

    #[test]
    fn skip_is_negation_of_pass() {
        assert_eq!(skip_condition(DepthOp::Less), Some(Cond::Hs));
        assert_eq!(skip_condition(DepthOp::GreaterEqual), Some(Cond::Lo));
        assert_eq!(skip_condition(DepthOp::Equal).map(Cond::invert), Some(Cond::Eq));
    }
}
