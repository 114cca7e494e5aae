// The block cache keeps BLOCK_NUM generated routines per scanline parity. A lookup probes
// the slots of its parity starting at the slot that hit last, wrapping around, and compares
// full configuration fingerprints. A miss regenerates the slot under the parity's write
// cursor inside a writable scope and advances the cursor, so replacement follows generation
// order and a slot that is hit often can still be the next one evicted. A routine that does
// not fit its block, or a block whose protection cannot be toggled, leaves the slot Rejected
// with the configuration recorded; later lookups of that configuration report the rejection
// without regenerating.

//! Per-parity cache of generated span routines.

use log::{debug, info, trace, warn};
use std::fmt;
use std::sync::Arc;

use crate::codegen::{CodeGenerator, TextureFetch};
use crate::core::config::{JitConfig, BLOCK_NUM, PARITY_COUNT};
use crate::core::error::{JitError, JitResult};
use crate::core::fingerprint::PipelineConfig;

use super::memory::{ActiveBackend, ExecutableRegion, ProtectionBackend};
use super::routine::GeneratedRoutine;

/// State of one code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Empty,
    Valid,
    /// The configuration was recorded but its routine did not fit.
    Rejected,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    config: Option<PipelineConfig>,
    status: SlotStatus,
    words: usize,
}

impl Slot {
    const EMPTY: Slot = Slot {
        config: None,
        status: SlotStatus::Empty,
        words: 0,
    };
}

/// Counters kept by a [`BlockCache`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub generated: u64,
    /// Generations that replaced a valid routine.
    pub recompiles: u64,
    pub rejected: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hits, {} generated, {} recompiles, {} rejected",
            self.hits, self.generated, self.recompiles, self.rejected
        )
    }
}

/// Two parities of [`BLOCK_NUM`] code blocks each, backed by one executable mapping.
pub struct BlockCache<B: ProtectionBackend = ActiveBackend> {
    generator: CodeGenerator,
    region: ExecutableRegion<B>,
    slots: [[Slot; BLOCK_NUM]; PARITY_COUNT],
    last_hit: [usize; PARITY_COUNT],
    next_write: [usize; PARITY_COUNT],
    stats: CacheStats,
}

impl BlockCache {
    /// Map the code blocks described by `config`.
    pub fn new(config: JitConfig) -> JitResult<Self> {
        Self::with_backend(config)
    }
}

impl<B: ProtectionBackend> BlockCache<B> {
    /// Like [`BlockCache::new`], toggling block protection through `B`.
    pub fn with_backend(config: JitConfig) -> JitResult<Self> {
        let region = ExecutableRegion::new(BLOCK_NUM * PARITY_COUNT, config.block_capacity)?;
        info!(
            "block cache: {} x {} blocks of {} bytes ({} bytes mapped)",
            PARITY_COUNT,
            BLOCK_NUM,
            region.capacity(),
            region.size()
        );
        Ok(Self {
            generator: CodeGenerator::new(&config),
            region,
            slots: [[Slot::EMPTY; BLOCK_NUM]; PARITY_COUNT],
            last_hit: [0; PARITY_COUNT],
            next_write: [0; PARITY_COUNT],
            stats: CacheStats::default(),
        })
    }

    /// Replace the texture-fetch sub-generator. Every cached routine is dropped.
    pub fn with_texture_fetch(mut self, texture: Arc<dyn TextureFetch>) -> Self {
        self.generator.set_texture_fetch(texture);
        self.invalidate();
        self
    }

    pub fn generator(&self) -> &CodeGenerator {
        &self.generator
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn slot_status(&self, parity: usize, slot: usize) -> SlotStatus {
        self.slots[parity][slot].status
    }

    /// Configuration recorded in a slot, valid or rejected.
    pub fn slot_config(&self, parity: usize, slot: usize) -> Option<&PipelineConfig> {
        self.slots[parity][slot].config.as_ref()
    }

    /// Slot holding `config` in `parity`, if any. Does not move the last-hit cursor.
    pub fn find(&self, config: &PipelineConfig, parity: usize) -> Option<usize> {
        let start = self.last_hit[parity];
        (0..BLOCK_NUM)
            .map(|c| (start + c) % BLOCK_NUM)
            .find(|&slot| self.slots[parity][slot].config.as_ref() == Some(config))
    }

    /// Return the routine for `config`, generating it into the next FIFO slot on a miss.
    pub fn lookup_or_generate(
        &mut self,
        config: &PipelineConfig,
        parity: usize,
    ) -> JitResult<GeneratedRoutine<'_>> {
        assert!(parity < PARITY_COUNT, "parity {parity} out of range");

        if let Some(slot) = self.find(config, parity) {
            self.last_hit[parity] = slot;
            let entry = self.slots[parity][slot];
            return match entry.status {
                SlotStatus::Valid => {
                    self.stats.hits += 1;
                    trace!("parity {parity} slot {slot} hit");
                    let index = block_index(parity, slot);
                    Ok(GeneratedRoutine::published(&self.region.block(index)[..entry.words]))
                }
                _ => Err(JitError::Rejected { parity, slot }),
            };
        }

        let slot = self.next_write[parity];
        self.next_write[parity] = (slot + 1) % BLOCK_NUM;
        self.regenerate(config, parity, slot)
    }

    fn regenerate(
        &mut self,
        config: &PipelineConfig,
        parity: usize,
        slot: usize,
    ) -> JitResult<GeneratedRoutine<'_>> {
        let index = block_index(parity, slot);
        let replaced = self.slots[parity][slot].status == SlotStatus::Valid;

        let mut scope = match self.region.writable(index) {
            Ok(scope) => scope,
            failed @ Err(_) => {
                let err = failed.err().expect("matched Err");
                return Err(self.reject(config, parity, slot, err));
            }
        };
        let outcome = self.generator.generate(config, &mut scope);
        let report = match outcome {
            Ok(report) => report,
            Err(err) => {
                drop(scope);
                return Err(self.reject(config, parity, slot, err));
            }
        };
        if let Err(err) = scope.publish() {
            return Err(self.reject(config, parity, slot, err));
        }

        self.slots[parity][slot] = Slot {
            config: Some(*config),
            status: SlotStatus::Valid,
            words: report.words,
        };

        self.stats.generated += 1;
        if replaced {
            self.stats.recompiles += 1;
        }
        debug!(
            "parity {parity} slot {slot}: {} bytes for {:?}",
            report.bytes(),
            config
        );
        Ok(GeneratedRoutine::published(&self.region.block(index)[..report.words]))
    }

    fn reject(
        &mut self,
        config: &PipelineConfig,
        parity: usize,
        slot: usize,
        err: JitError,
    ) -> JitError {
        self.slots[parity][slot] = Slot {
            config: Some(*config),
            status: SlotStatus::Rejected,
            words: 0,
        };
        self.stats.rejected += 1;
        warn!("parity {parity} slot {slot} rejected: {err}");
        err
    }

    /// Forget every routine and reset both cursors of both parities.
    pub fn invalidate(&mut self) {
        self.slots = [[Slot::EMPTY; BLOCK_NUM]; PARITY_COUNT];
        self.last_hit = [0; PARITY_COUNT];
        self.next_write = [0; PARITY_COUNT];
        debug!("block cache invalidated");
    }
}

impl<B: ProtectionBackend> Drop for BlockCache<B> {
    fn drop(&mut self) {
        info!("block cache dropped: {}", self.stats);
    }
}

fn block_index(parity: usize, slot: usize) -> usize {
    parity * BLOCK_NUM + slot
}
