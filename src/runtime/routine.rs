// Call view over a generated span routine. The routine follows the AAPCS64 convention with
// four arguments: the state pointer, the params pointer, the first x and the scanline y.
// Routines that live in a published code block run natively on AArch64 hosts; everything
// else (plain word buffers, or any routine on another host architecture) runs through the
// instruction simulator, which gives the same observable effect on both structures.

use std::fmt;

use crate::arm64::sim::Machine;
use crate::core::error::JitResult;
use crate::core::layout::{PipelineParams, PixelState};

/// Signature of a published routine.
pub type SpanFn = unsafe extern "C" fn(*mut PixelState, *const PipelineParams, i32, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backing {
    /// Inside an executable code block.
    Published,
    /// Ordinary memory; only the simulator may run it.
    Plain,
}

/// A generated routine, borrowed from the block that holds it.
#[derive(Clone, Copy)]
pub struct GeneratedRoutine<'a> {
    words: &'a [u32],
    backing: Backing,
}

impl<'a> GeneratedRoutine<'a> {
    pub(crate) fn published(words: &'a [u32]) -> Self {
        Self {
            words,
            backing: Backing::Published,
        }
    }

    /// View over words produced by [`CodeGenerator::generate_to_vec`](crate::CodeGenerator::generate_to_vec)
    /// or any other buffer. Such a routine is always simulated.
    pub fn from_words(words: &'a [u32]) -> Self {
        Self {
            words,
            backing: Backing::Plain,
        }
    }

    pub fn words(&self) -> &'a [u32] {
        self.words
    }

    pub fn as_ptr(&self) -> *const u32 {
        self.words.as_ptr()
    }

    pub fn is_published(&self) -> bool {
        self.backing == Backing::Published
    }

    /// Draw the span described by `state`, starting at `x` on scanline `y`.
    ///
    /// # Safety
    ///
    /// `state.fb_mem` and `state.aux_mem` must point at rows wide enough for every x the span
    /// visits (and every tiled x when the configuration is tiled), and the routine must have
    /// been generated for the layouts of [`PixelState`] and [`PipelineParams`].
    pub unsafe fn invoke(
        &self,
        state: &mut PixelState,
        params: &PipelineParams,
        x: i32,
        y: i32,
    ) -> JitResult<()> {
        #[cfg(target_arch = "aarch64")]
        if self.backing == Backing::Published {
            let entry: SpanFn = std::mem::transmute(self.words.as_ptr());
            entry(state, params, x, y);
            return Ok(());
        }
        self.invoke_simulated(&mut Machine::new(), state, params, x, y)
    }

    /// Run the routine on `machine` regardless of the host.
    ///
    /// # Safety
    ///
    /// Same contract as [`GeneratedRoutine::invoke`].
    pub unsafe fn invoke_simulated(
        &self,
        machine: &mut Machine,
        state: &mut PixelState,
        params: &PipelineParams,
        x: i32,
        y: i32,
    ) -> JitResult<()> {
        let args = [
            state as *mut PixelState as u64,
            params as *const PipelineParams as u64,
            x as u32 as u64,
            y as u32 as u64,
        ];
        machine.call(self.words.as_ptr(), &args)?;
        Ok(())
    }
}

impl fmt::Debug for GeneratedRoutine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedRoutine")
            .field("entry", &self.words.as_ptr())
            .field("words", &self.words.len())
            .field("backing", &self.backing)
            .finish()
    }
}
