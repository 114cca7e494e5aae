// This module defines the error types of the recompiler using the thiserror crate. JitError
// covers the runtime conditions a caller can observe: a generated routine that does not fit
// its code block, a cache slot that was rejected, failures to map or re-protect executable
// memory, faults raised by the instruction simulator on hosts that cannot run AArch64 code
// natively, and object-file emission failures in the dump path. A recompiler switched off by
// configuration is not an error; the dispatcher simply never builds a cache. Configuration-domain problems (an operand that cannot
// be encoded, a mode value outside its field) are programming defects and panic instead of
// appearing here. JitResult<T> is the usual alias.

//! Error types for the pixel-pipeline recompiler.

use std::io;
use thiserror::Error;

use crate::arm64::sim::SimError;

/// Main error type for code generation, caching and publication.
#[derive(Error, Debug)]
pub enum JitError {
    #[error("generated routine needs {needed} bytes but a code block holds {capacity}")]
    BlockOverflow { needed: usize, capacity: usize },

    #[error("slot {slot} of parity {parity} holds a configuration that failed to generate")]
    Rejected { parity: usize, slot: usize },

    #[error("failed to map {size} bytes of executable memory: {source}")]
    MapFailed {
        size: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to change code block protection: {0}")]
    Protection(#[source] io::Error),

    #[error("simulated routine faulted: {0}")]
    Simulation(#[from] SimError),

    #[error("failed to write object file: {0}")]
    Object(#[from] object::write::Error),
}

impl JitError {
    /// Whether the dispatcher should quietly fall back to the interpreter. These are the
    /// failures a cache lookup records in the slot before reporting them.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            JitError::Rejected { .. } | JitError::BlockOverflow { .. } | JitError::Protection(_)
        )
    }
}

/// Result type alias for recompiler operations.
pub type JitResult<T> = Result<T, JitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_failures_fall_back() {
        assert!(JitError::BlockOverflow { needed: 8, capacity: 4 }.is_fallback());
        assert!(JitError::Rejected { parity: 1, slot: 3 }.is_fallback());
        assert!(JitError::Protection(io::Error::from(io::ErrorKind::PermissionDenied)).is_fallback());
        let map = JitError::MapFailed {
            size: 4096,
            source: io::Error::from(io::ErrorKind::OutOfMemory),
        };
        assert!(!map.is_fallback());
    }
}
