// The code buffer is the assembler the generator drives: an append-only cursor over a
// caller-supplied slice of instruction words (normally one code block inside executable
// memory). emit() appends an encoded word and returns the offset it landed at. Branches whose
// target is not known yet are emitted with a zero offset field through reserve_branch(),
// which hands back a ForwardPatch record; patch() later resolves the record against the
// current cursor by OR-ing the encoded offset into the word already in the buffer. The only
// backward branch in a routine, the loop-closing one, targets an offset taken earlier with
// mark(). Words past the end of the slice are counted but never stored, so an oversized
// routine is reported by finish() with the size it would have needed instead of overrunning
// the block.

//! Code buffer with forward-branch patching.

use log::trace;
use std::fmt;

use crate::arm64::encoder::{self, BranchKind, Cond, Reg};
use crate::core::error::{JitError, JitResult};

/// Byte offset from the start of the code buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodeOffset(pub u32);

impl CodeOffset {
    fn word_index(self) -> usize {
        (self.0 / 4) as usize
    }

    fn distance_to(self, target: CodeOffset) -> i64 {
        target.0 as i64 - self.0 as i64
    }
}

impl fmt::Display for CodeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// A branch emitted before its target was known.
///
/// Must be handed back to [`CodeBuffer::patch`] exactly once; dropping an unresolved record
/// is a generator bug and asserts in debug builds.
#[must_use = "a reserved branch has to be patched"]
#[derive(Debug)]
pub struct ForwardPatch {
    at: CodeOffset,
    kind: BranchKind,
}

impl ForwardPatch {
    pub fn offset(&self) -> CodeOffset {
        self.at
    }

    pub fn kind(&self) -> BranchKind {
        self.kind
    }
}

impl Drop for ForwardPatch {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(false, "forward branch at {} was never patched", self.at);
        }
    }
}

/// Summary of one finished generation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationReport {
    /// Instruction words emitted.
    pub words: usize,
    pub reserved_patches: usize,
    pub resolved_patches: usize,
}

impl GenerationReport {
    pub fn bytes(&self) -> usize {
        self.words * 4
    }
}

/// Append-only instruction buffer.
pub struct CodeBuffer<'a> {
    words: &'a mut [u32],
    cursor: usize,
    reserved: usize,
    resolved: usize,
}

impl<'a> CodeBuffer<'a> {
    pub fn new(words: &'a mut [u32]) -> Self {
        Self {
            words,
            cursor: 0,
            reserved: 0,
            resolved: 0,
        }
    }

    /// Capacity in instruction words.
    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    /// Words emitted so far, including any that did not fit.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    pub fn overflowed(&self) -> bool {
        self.cursor > self.words.len()
    }

    pub fn reserved_patches(&self) -> usize {
        self.reserved
    }

    pub fn resolved_patches(&self) -> usize {
        self.resolved
    }

    /// The current cursor.
    pub fn mark(&self) -> CodeOffset {
        CodeOffset((self.cursor * 4) as u32)
    }

    /// Append one instruction word.
    pub fn emit(&mut self, word: u32) -> CodeOffset {
        let at = self.mark();
        if let Some(slot) = self.words.get_mut(self.cursor) {
            *slot = word;
        }
        self.cursor += 1;
        at
    }

    pub fn emit_all(&mut self, words: &[u32]) {
        for &word in words {
            self.emit(word);
        }
    }

    /// Load a 64-bit constant into `reg`.
    pub fn emit_imm64(&mut self, reg: Reg, value: u64) {
        self.emit_all(&encoder::mov_imm64(reg, value));
    }

    /// Emit a branch with an empty offset field. `word` is the fully encoded branch with a
    /// zero offset, e.g. `encoder::b_cond(cond, 0)`.
    pub fn reserve_branch(&mut self, kind: BranchKind, word: u32) -> ForwardPatch {
        debug_assert_eq!(word & kind.encode_offset(-4), 0, "placeholder already has an offset");
        let at = self.emit(word);
        self.reserved += 1;
        ForwardPatch { at, kind }
    }

    pub fn reserve_b(&mut self) -> ForwardPatch {
        self.reserve_branch(BranchKind::Uncond, encoder::b(0))
    }

    pub fn reserve_b_cond(&mut self, cond: Cond) -> ForwardPatch {
        self.reserve_branch(BranchKind::Cond, encoder::b_cond(cond, 0))
    }

    pub fn reserve_cbz(&mut self, reg: Reg) -> ForwardPatch {
        self.reserve_branch(BranchKind::CompareZero, encoder::cbz_w(reg, 0))
    }

    pub fn reserve_cbnz(&mut self, reg: Reg) -> ForwardPatch {
        self.reserve_branch(BranchKind::CompareZero, encoder::cbnz_w(reg, 0))
    }

    pub fn reserve_tbz(&mut self, reg: Reg, bit: u32) -> ForwardPatch {
        self.reserve_branch(BranchKind::TestBit, encoder::tbz(reg, bit, 0))
    }

    /// Resolve `record` so that it branches to the current cursor.
    pub fn patch(&mut self, record: ForwardPatch) {
        let target = self.mark();
        self.patch_to(record, target);
    }

    /// Resolve `record` so that it branches to `target`.
    pub fn patch_to(&mut self, record: ForwardPatch, target: CodeOffset) {
        let (at, kind) = (record.at, record.kind);
        std::mem::forget(record);

        let distance = at.distance_to(target);
        assert!(
            distance > 0 && kind.fits(distance),
            "{kind:?} at {at} cannot reach {target}"
        );

        if let Some(word) = self.words.get_mut(at.word_index()) {
            debug_assert_eq!(*word & kind.encode_offset(-4), 0, "branch at {at} patched twice");
            *word |= kind.encode_offset(distance as i32);
        }
        self.resolved += 1;
        trace!("patched {kind:?} at {at} -> {target}");
    }

    /// Emit a conditional branch back to an earlier offset.
    pub fn branch_back(&mut self, cond: Cond, target: CodeOffset) {
        let distance = self.mark().distance_to(target);
        assert!(
            distance <= 0 && BranchKind::Cond.fits(distance),
            "loop branch at {} cannot reach {target}",
            self.mark()
        );
        self.emit(encoder::b_cond(cond, distance as i32));
    }

    /// Close the pass: every reserved branch must have been resolved and the routine must
    /// have fit.
    pub fn finish(self) -> JitResult<GenerationReport> {
        debug_assert_eq!(
            self.reserved, self.resolved,
            "{} forward branches left unpatched",
            self.reserved - self.resolved
        );
        if self.overflowed() {
            return Err(JitError::BlockOverflow {
                needed: self.cursor * 4,
                capacity: self.words.len() * 4,
            });
        }
        Ok(GenerationReport {
            words: self.cursor,
            reserved_patches: self.reserved,
            resolved_patches: self.resolved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm64::encoder::regs::*;

    #[test]
    fn emit_returns_offsets() {
        let mut words = [0u32; 4];
        let mut buf = CodeBuffer::new(&mut words);
        assert_eq!(buf.emit(encoder::nop()), CodeOffset(0));
        assert_eq!(buf.emit(encoder::ret()), CodeOffset(4));
        assert_eq!(buf.mark(), CodeOffset(8));
        let report = buf.finish().unwrap();
        assert_eq!(report.words, 2);
        assert_eq!(words[1], encoder::ret());
    }

    #[test]
    fn forward_patch_ors_offset() {
        let mut words = [0u32; 8];
        let mut buf = CodeBuffer::new(&mut words);
        let skip = buf.reserve_b_cond(Cond::Eq);
        let bit = buf.reserve_tbz(X4, 31);
        buf.emit(encoder::nop());
        buf.patch(skip);
        buf.patch(bit);
        assert_eq!(buf.reserved_patches(), 2);
        assert_eq!(buf.resolved_patches(), 2);
        buf.finish().unwrap();
        assert_eq!(words[0], encoder::b_cond(Cond::Eq, 12));
        assert_eq!(words[1], encoder::tbz(X4, 31, 8));
    }

    #[test]
    fn backward_branch_targets_mark() {
        let mut words = [0u32; 8];
        let mut buf = CodeBuffer::new(&mut words);
        buf.emit(encoder::nop());
        let head = buf.mark();
        buf.emit(encoder::nop());
        buf.emit(encoder::nop());
        buf.branch_back(Cond::Ne, head);
        buf.finish().unwrap();
        assert_eq!(words[3], encoder::b_cond(Cond::Ne, -8));
    }

    #[test]
    fn overflow_is_reported_not_written() {
        let mut words = [0u32; 2];
        let mut buf = CodeBuffer::new(&mut words);
        let exit = buf.reserve_b();
        buf.emit(encoder::nop());
        buf.emit(encoder::nop());
        buf.patch(exit);
        buf.emit(encoder::ret());
        match buf.finish() {
            Err(JitError::BlockOverflow { needed, capacity }) => {
                assert_eq!(needed, 16);
                assert_eq!(capacity, 8);
            }
            other => panic!("expected overflow, got {other:?}"),
        }
        assert_eq!(words[0], encoder::b(12));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "never patched")]
    fn dropped_patch_asserts() {
        let mut words = [0u32; 2];
        let mut buf = CodeBuffer::new(&mut words);
        let _lost = buf.reserve_b();
    }
}
