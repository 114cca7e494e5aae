//! Writable windows over executable code blocks.

mod common;

use common::*;
use std::io;
use std::thread;
use voodoo_jit::arm64::encoder;
use voodoo_jit::runtime::memory::{page_size, Access, ExecutableRegion, ProtectionBackend, ToggleRestore};
use voodoo_jit::runtime::Dispatcher;
use voodoo_jit::{
    BlockCache, GeneratedRoutine, JitConfig, JitError, PipelineConfig, PipelineParams,
    ScanDirection, SlotStatus,
};

/// Opens blocks normally but cannot make them executable again.
#[derive(Debug, Default)]
struct StuckWritable;

impl ProtectionBackend for StuckWritable {
    const INITIAL: Access = ToggleRestore::INITIAL;

    unsafe fn open(&self, ptr: *mut u8, len: usize) -> io::Result<()> {
        ToggleRestore.open(ptr, len)
    }

    unsafe fn close(&self, _ptr: *mut u8, _len: usize) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::PermissionDenied))
    }
}

/// Never lets a block become writable.
#[derive(Debug, Default)]
struct Sealed;

impl ProtectionBackend for Sealed {
    const INITIAL: Access = ToggleRestore::INITIAL;

    unsafe fn open(&self, _ptr: *mut u8, _len: usize) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::PermissionDenied))
    }

    unsafe fn close(&self, _ptr: *mut u8, _len: usize) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn published_block_runs() {
    init_logging();
    let mut region = ExecutableRegion::<ToggleRestore>::new(2, 4096).unwrap();
    assert_eq!(region.stride() % page_size(), 0);

    let mut scope = region.writable(1).unwrap();
    scope[0] = encoder::movz_x(encoder::regs::X0, 42, 0);
    scope[1] = encoder::ret();
    scope.publish().unwrap();

    let words = &region.block(1)[..2];
    let mut machine = voodoo_jit::arm64::Machine::new();
    let result = unsafe { machine.call(words.as_ptr(), &[]) }.unwrap();
    assert_eq!(result, 42);
}

#[test]
fn abandoned_window_keeps_earlier_code() {
    init_logging();
    let mut region = ExecutableRegion::<ToggleRestore>::new(1, 64).unwrap();
    {
        let mut scope = region.writable(0).unwrap();
        scope[0] = encoder::ret();
        scope.publish().unwrap();
    }
    {
        // Dropped without publishing, as on a failed generation.
        let mut scope = region.writable(0).unwrap();
        scope[1] = encoder::nop();
    }
    assert_eq!(region.block(0)[0], encoder::ret());
    assert_eq!(region.block(0)[1], encoder::nop());
    region.writable(0).unwrap().publish().unwrap();
}

#[test]
fn caches_on_different_threads_generate_concurrently() {
    init_logging();
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            thread::spawn(move || {
                let mut dispatcher = Dispatcher::new(JitConfig::default()).unwrap();
                let params = PipelineParams {
                    d_bdx: worker + 1,
                    alpha_mode: worker as u32,
                    ..PipelineParams::default()
                };
                let mut surface = Surface::new(0);
                let mut total = 0;
                for y in 0..16 {
                    let mut state = surface.state();
                    unsafe { dispatcher.draw_span(&params, &mut state, 0, 9, y) }.unwrap();
                    assert_eq!(state.ib, 10 * (worker + 1));
                    total += state.pixel_count;
                }
                let cache = dispatcher.cache().unwrap().stats();
                (total, cache.generated, cache.hits)
            })
        })
        .collect();

    for worker in workers {
        let (pixels, generated, hits) = worker.join().unwrap();
        assert_eq!(pixels, 160);
        // One routine per parity, every other span a hit.
        assert_eq!(generated, 2);
        assert_eq!(hits, 14);
    }
}

#[test]
fn routine_from_plain_words_is_not_published() {
    init_logging();
    let words = generate(&voodoo_jit::PipelineConfig::new(voodoo_jit::ScanDirection::Forward), false);
    let routine = GeneratedRoutine::from_words(&words);
    assert!(!routine.is_published());
    assert_eq!(routine.as_ptr(), words.as_ptr());
}

#[test]
fn failed_publish_draws_the_span_with_the_interpreter() {
    init_logging();
    let mut dispatcher = Dispatcher::<StuckWritable>::with_backend(JitConfig::default()).unwrap();
    let params = PipelineParams {
        d_gdx: 2,
        ..PipelineParams::default()
    };
    let mut surface = Surface::new(0);

    for round in 1..=2 {
        let mut state = surface.state();
        unsafe { dispatcher.draw_span(&params, &mut state, 0, 3, 0) }.unwrap();
        assert_eq!(state.pixel_count, 4);
        assert_eq!(state.ig, 8);
        assert_eq!(dispatcher.stats().fallback_spans, round);
        assert_eq!(dispatcher.stats().jit_spans, 0);
    }

    let cache = dispatcher.cache().unwrap();
    assert_eq!(cache.slot_status(0, 0), SlotStatus::Rejected);
    assert!(cache.slot_config(0, 0).is_some());
    // The second span found the rejected slot instead of generating again.
    assert_eq!(cache.stats().rejected, 1);
    assert_eq!(cache.stats().generated, 0);
}

#[test]
fn block_that_cannot_open_is_rejected() {
    init_logging();
    let mut cache = BlockCache::<Sealed>::with_backend(JitConfig::default()).unwrap();
    let first = PipelineConfig::new(ScanDirection::Forward);
    let second = first.with_alpha_mode(1);

    let err = cache.lookup_or_generate(&first, 1).unwrap_err();
    assert!(matches!(err, JitError::Protection(_)));
    assert!(err.is_fallback());
    assert_eq!(cache.slot_status(1, 0), SlotStatus::Rejected);
    assert_eq!(cache.slot_config(1, 0), Some(&first));

    // The write cursor moved on.
    cache.lookup_or_generate(&second, 1).unwrap_err();
    assert_eq!(cache.slot_config(1, 1), Some(&second));
    assert!(matches!(
        cache.lookup_or_generate(&first, 1),
        Err(JitError::Rejected { parity: 1, slot: 0 })
    ));
}
