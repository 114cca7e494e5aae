//! Code generation passes: branch resolution, capacity handling and the ELF dump.

mod common;

use common::strategies::pipeline_config;
use common::*;
use object::{Architecture, File, Object, ObjectSection, ObjectSymbol};
use proptest::prelude::*;
use voodoo_jit::core::fingerprint::modes::*;
use voodoo_jit::{dump, CodeGenerator, DepthOp, JitConfig, JitError, PipelineConfig, ScanDirection};

proptest! {
    #[test]
    fn every_forward_branch_is_resolved((config, dual) in pipeline_config()) {
        let jit = JitConfig::default().with_dual_tmus(dual);
        let mut code = vec![0u32; jit.block_words()];
        let report = CodeGenerator::new(&jit).generate(&config, &mut code).unwrap();
        prop_assert_eq!(report.reserved_patches, report.resolved_patches);
        prop_assert!(report.words > 0 && report.words <= code.len());
        prop_assert_eq!(code[report.words - 1], voodoo_jit::arm64::encoder::ret());
    }

    #[test]
    fn generation_is_deterministic((config, dual) in pipeline_config()) {
        prop_assert_eq!(generate(&config, dual), generate(&config, dual));
    }
}

#[test]
fn overflow_reports_the_needed_size() {
    init_logging();
    let config = PipelineConfig::new(ScanDirection::Forward)
        .with_fbz_mode(FBZ_W_BUFFER | FBZ_DEPTH_ENABLE)
        .with_depth_op(DepthOp::Less);
    let full = generate(&config, false);

    let jit = JitConfig::default();
    let mut code = vec![0xdead_beefu32; 24];
    let err = CodeGenerator::new(&jit)
        .generate(&config, &mut code[..16])
        .unwrap_err();
    match err {
        JitError::BlockOverflow { needed, capacity } => {
            assert_eq!(needed, full.len() * 4);
            assert_eq!(capacity, 64);
        }
        other => panic!("unexpected error {other}"),
    }
    // Nothing past the block was touched.
    assert!(code[16..].iter().all(|&word| word == 0xdead_beef));
}

#[test]
fn configurations_differ_in_code() {
    init_logging();
    let plain = PipelineConfig::new(ScanDirection::Forward);
    let stippled = plain.with_fbz_mode(FBZ_STIPPLE);
    let backward = PipelineConfig::new(ScanDirection::Backward);
    let a = generate(&plain, false);
    assert_ne!(a, generate(&stippled, false));
    assert_ne!(a, generate(&backward, false));
    assert_eq!(a.len(), generate(&backward, false).len());
}

#[test]
fn elf_dump_parses_back() {
    init_logging();
    let config = PipelineConfig::new(ScanDirection::Forward)
        .with_fbz_mode(FBZ_STIPPLE | FBZ_DEPTH_ENABLE)
        .with_depth_op(DepthOp::GreaterEqual);
    let words = generate(&config, false);
    let obj = dump::routine_object(&words, "voodoo_span").unwrap();

    let file = File::parse(&*obj).unwrap();
    assert_eq!(file.architecture(), Architecture::Aarch64);
    assert!(file.is_little_endian());

    let text = file.section_by_name(".text").unwrap();
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    assert_eq!(text.data().unwrap(), &bytes[..]);

    let symbol = file.symbol_by_name("voodoo_span").unwrap();
    assert!(symbol.is_global());
    assert_eq!(symbol.size(), bytes.len() as u64);
    assert_eq!(symbol.address(), 0);
}
