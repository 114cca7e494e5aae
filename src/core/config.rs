// Runtime knobs for the recompiler. JitConfig is a plain value with defaults that match the
// emulated hardware: the recompiler on, a single texture unit, and 16 KiB code blocks. The
// number of slots per scanline parity is a fixed constant, not a knob, because the eviction
// order of the block cache is part of its observable behaviour. from_env() layers two
// environment variables over the defaults so the emulator can be steered without a rebuild.

//! Recompiler configuration.

use log::warn;
use std::env;

/// Slots per scanline parity in the block cache.
pub const BLOCK_NUM: usize = 8;

/// Number of scanline parities (even and odd).
pub const PARITY_COUNT: usize = 2;

/// Default size of one code block in bytes.
pub const DEFAULT_BLOCK_CAPACITY: usize = 16384;

/// Configuration shared by the block cache, the code generator and the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitConfig {
    /// Use generated routines at all. When false every span goes to the interpreter.
    pub enabled: bool,
    /// The card carries two texture units.
    pub dual_tmus: bool,
    /// Bytes available to one generated routine.
    pub block_capacity: usize,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dual_tmus: false,
            block_capacity: DEFAULT_BLOCK_CAPACITY,
        }
    }
}

impl JitConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_dual_tmus(mut self, dual_tmus: bool) -> Self {
        self.dual_tmus = dual_tmus;
        self
    }

    /// Set the block capacity, rounded down to whole instruction words.
    pub fn with_block_capacity(mut self, bytes: usize) -> Self {
        self.block_capacity = bytes & !3;
        self
    }

    /// Capacity of one block in instruction words.
    pub fn block_words(&self) -> usize {
        self.block_capacity / 4
    }

    /// Defaults overridden by `VOODOO_JIT` and `VOODOO_JIT_BLOCK_SIZE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = env::var("VOODOO_JIT") {
            match parse_switch(&value) {
                Some(enabled) => config.enabled = enabled,
                None => warn!("ignoring VOODOO_JIT={value:?}: expected on/off"),
            }
        }

        if let Ok(value) = env::var("VOODOO_JIT_BLOCK_SIZE") {
            match value.trim().parse::<usize>() {
                Ok(bytes) if bytes >= 4 => config = config.with_block_capacity(bytes),
                _ => warn!("ignoring VOODOO_JIT_BLOCK_SIZE={value:?}: expected a byte count"),
            }
        }

        config
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Some(true),
        "0" | "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_hardware() {
        let config = JitConfig::default();
        assert!(config.enabled);
        assert!(!config.dual_tmus);
        assert_eq!(config.block_words(), 4096);
    }

    #[test]
    fn capacity_rounds_to_words() {
        let config = JitConfig::default().with_block_capacity(1027);
        assert_eq!(config.block_capacity, 1024);
        assert_eq!(config.block_words(), 256);
    }

    #[test]
    fn switch_values() {
        assert_eq!(parse_switch("OFF"), Some(false));
        assert_eq!(parse_switch(" 1 "), Some(true));
        assert_eq!(parse_switch("maybe"), None);
    }
}
