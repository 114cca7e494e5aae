//! Generated routines against the reference interpreter.
//!
//! For random configurations, interpolator values, gradients and depth surfaces, simulating
//! the generated routine must leave the state exactly as the interpreter does.

mod common;

use common::strategies::{gradients, interpolators, pipeline_config};
use common::*;
use proptest::prelude::*;
use voodoo_jit::{PipelineConfig, PixelState, ScanDirection};

fn fill(surface: &mut Surface, seed: u64) {
    for (i, depth) in surface.aux.iter_mut().enumerate() {
        *depth = (seed.wrapping_mul(i as u64 * 2 + 1) >> 24) as u16;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn routine_matches_interpreter(
        (config, dual) in pipeline_config(),
        values in interpolators(),
        params in gradients(),
        start in 0i32..100,
        len in 0i32..12,
        y in 0i32..4,
        seed in any::<u64>(),
    ) {
        init_logging();
        let mut surface = Surface::new(0);
        fill(&mut surface, seed);

        let (x, x2) = match config.xdir() {
            ScanDirection::Forward => (start, start + len),
            ScanDirection::Backward => (start + len, start),
        };
        let rows = surface.state();
        let mut generated = PixelState {
            fb_mem: rows.fb_mem,
            aux_mem: rows.aux_mem,
            x2,
            ..values
        };
        let mut expected = generated;

        run_generated(&config, dual, &mut generated, &params, x, y);
        run_reference(&config, dual, &mut expected, &params, x, y);

        prop_assert_eq!(generated, expected);
    }
}

#[test]
fn long_span_in_both_directions() {
    init_logging();
    let params = unit_gradients();
    for xdir in [ScanDirection::Forward, ScanDirection::Backward] {
        let config = PipelineConfig::new(xdir);
        let mut surface = Surface::new(0);
        let mut generated = surface.state();
        let (x, x2) = match xdir {
            ScanDirection::Forward => (0, 999),
            ScanDirection::Backward => (999, 0),
        };
        generated.x2 = x2;
        let mut expected = generated;

        run_generated(&config, false, &mut generated, &params, x, 0);
        run_reference(&config, false, &mut expected, &params, x, 0);

        assert_eq!(generated, expected);
        assert_eq!(generated.pixel_count, 1000);
    }
}
