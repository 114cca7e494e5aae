//! Generate the span routine for one set of mode registers and print it as a hex listing or
//! write it out as an AArch64 ELF object.

use clap::Parser;
use log::info;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use voodoo_jit::core::fingerprint::{PipelineConfig, ScanDirection, TextureUnit};
use voodoo_jit::{dump, CodeGenerator, JitConfig};

fn parse_word(value: &str) -> Result<u32, String> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    parsed.map_err(|err| format!("{value:?} is not a 32-bit register value: {err}"))
}

#[derive(Parser, Debug)]
#[command(
    name = "voodoo-jit-dump",
    about = "Dump the generated span routine for a pixel-pipeline configuration."
)]
struct Args {
    /// fbzMode register
    #[arg(long, value_parser = parse_word, default_value = "0")]
    fbz_mode: u32,

    /// alphaMode register
    #[arg(long, value_parser = parse_word, default_value = "0")]
    alpha_mode: u32,

    /// fogMode register
    #[arg(long, value_parser = parse_word, default_value = "0")]
    fog_mode: u32,

    /// fbzColorPath register
    #[arg(long, value_parser = parse_word, default_value = "0")]
    color_path: u32,

    /// textureMode of unit 0
    #[arg(long, value_parser = parse_word, default_value = "0")]
    texture_mode0: u32,

    /// textureMode of unit 1
    #[arg(long, value_parser = parse_word, default_value = "0")]
    texture_mode1: u32,

    /// tLOD of unit 0
    #[arg(long, value_parser = parse_word, default_value = "0")]
    tlod0: u32,

    /// tLOD of unit 1
    #[arg(long, value_parser = parse_word, default_value = "0")]
    tlod1: u32,

    /// trexInit1 register
    #[arg(long, value_parser = parse_word, default_value = "0")]
    trex_init1: u32,

    /// Scan direction, 1 or -1
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    xdir: i32,

    /// Colour or aux surface is tiled
    #[arg(long, action = clap::ArgAction::SetTrue)]
    tiled: bool,

    /// The card has two texture units
    #[arg(long, action = clap::ArgAction::SetTrue)]
    dual_tmus: bool,

    /// Code block capacity in bytes
    #[arg(long, value_name = "BYTES")]
    capacity: Option<usize>,

    /// Print a hex listing (the default when --elf is not given)
    #[arg(long, action = clap::ArgAction::SetTrue)]
    hex: bool,

    /// Write an ELF relocatable object to this path
    #[arg(long, value_name = "PATH")]
    elf: Option<PathBuf>,

    /// Symbol name of the routine in the ELF object
    #[arg(long, default_value = "voodoo_span")]
    symbol: String,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new(ScanDirection::from_xdir(self.xdir))
            .with_fbz_mode(self.fbz_mode)
            .with_alpha_mode(self.alpha_mode)
            .with_fog_mode(self.fog_mode)
            .with_color_path(self.color_path)
            .with_texture_mode(TextureUnit::Tmu0, self.texture_mode0)
            .with_texture_mode(TextureUnit::Tmu1, self.texture_mode1)
            .with_tlod(TextureUnit::Tmu0, self.tlod0)
            .with_tlod(TextureUnit::Tmu1, self.tlod1)
            .with_trex_init1(self.trex_init1)
            .with_tiled(self.tiled)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut jit = JitConfig::from_env().with_dual_tmus(args.dual_tmus);
    if let Some(bytes) = args.capacity {
        jit = jit.with_block_capacity(bytes);
    }
    let config = args.pipeline_config();

    let generator = CodeGenerator::new(&jit);
    let words = generator.generate_to_vec(&config, jit.block_words())?;
    info!("{} bytes for {:?}", words.len() * 4, config);

    if let Some(path) = &args.elf {
        let obj = dump::routine_object(&words, &args.symbol)?;
        fs::write(path, obj)?;
        info!("wrote {}", path.display());
    }
    if args.hex || args.elf.is_none() {
        io::stdout().write_all(dump::hex_listing(&words).as_bytes())?;
    }
    Ok(())
}
