// The pipeline configuration is the fingerprint that selects a generated routine. It is built
// fresh from the live mode registers before every cache lookup and compared field by field;
// equality is the whole cache key. The mode-bit constants below are the subset of the card's
// register model that the generator reads. DepthOp is the three-bit depth function decoded
// into a sum type so the generator resolves the comparison once, at generation time.

//! Pipeline configuration (cache fingerprint) and the mode bits it is made from.

use crate::core::layout::PipelineParams;

/// Mode-register bits read by the generator.
pub mod modes {
    pub const FBZ_STIPPLE: u32 = 1 << 2;
    pub const FBZ_W_BUFFER: u32 = 1 << 3;
    pub const FBZ_DEPTH_ENABLE: u32 = 1 << 4;
    pub const FBZ_DEPTH_OP_SHIFT: u32 = 5;
    pub const FBZ_STIPPLE_PATT: u32 = 1 << 12;
    pub const FBZ_DEPTH_BIAS: u32 = 1 << 16;
    pub const FBZ_DEPTH_SOURCE: u32 = 1 << 20;

    pub const FOG_ENABLE: u32 = 0x01;
    pub const FOG_ALPHA: u32 = 0x08;
    pub const FOG_Z: u32 = 0x10;
    pub const FOG_CONSTANT: u32 = 0x20;

    pub const FBZCP_TEXTURE_ENABLED: u32 = 1 << 27;

    pub const TEXTUREMODE_MASK: u32 = 0x3fff_f000;
    pub const TEXTUREMODE_PASSTHROUGH: u32 = 0;
    pub const TEXTUREMODE_LOCAL_MASK: u32 = 0x0064_3000;
    pub const TEXTUREMODE_LOCAL: u32 = 0x0024_1000;

    pub const LOD_TMIRROR_S: u32 = 1 << 28;
    pub const LOD_TMIRROR_T: u32 = 1 << 29;
    pub const LOD_MASK: u32 = LOD_TMIRROR_S | LOD_TMIRROR_T;

    pub const TREXINIT1_KEY_BIT: u32 = 1 << 18;
}

use modes::*;

/// Horizontal walk direction of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanDirection {
    Forward,
    Backward,
}

impl ScanDirection {
    /// Decode the interpolator's `xdir` field; any negative value walks backwards.
    pub fn from_xdir(xdir: i32) -> Self {
        if xdir < 0 {
            ScanDirection::Backward
        } else {
            ScanDirection::Forward
        }
    }

    pub fn step(self) -> i32 {
        match self {
            ScanDirection::Forward => 1,
            ScanDirection::Backward => -1,
        }
    }
}

/// Depth comparison function, bits 5..7 of fbzMode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthOp {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl DepthOp {
    pub const ALL: [DepthOp; 8] = [
        DepthOp::Never,
        DepthOp::Less,
        DepthOp::Equal,
        DepthOp::LessEqual,
        DepthOp::Greater,
        DepthOp::NotEqual,
        DepthOp::GreaterEqual,
        DepthOp::Always,
    ];

    /// Decode the three-bit field.
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            0 => DepthOp::Never,
            1 => DepthOp::Less,
            2 => DepthOp::Equal,
            3 => DepthOp::LessEqual,
            4 => DepthOp::Greater,
            5 => DepthOp::NotEqual,
            6 => DepthOp::GreaterEqual,
            7 => DepthOp::Always,
            _ => panic!("depth function {bits} is outside the three-bit field"),
        }
    }

    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Whether a pixel with depth `new` passes against the stored `old`.
    pub fn passes(self, new: u16, old: u16) -> bool {
        match self {
            DepthOp::Never => false,
            DepthOp::Less => new < old,
            DepthOp::Equal => new == old,
            DepthOp::LessEqual => new <= old,
            DepthOp::Greater => new > old,
            DepthOp::NotEqual => new != old,
            DepthOp::GreaterEqual => new >= old,
            DepthOp::Always => true,
        }
    }
}

/// Which stipple test a configuration runs, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StippleMode {
    /// One bit rotated through the stipple register every pixel.
    Rotating,
    /// Fixed 4x8 pattern indexed by scanline and x.
    Pattern,
}

/// A texture unit on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUnit {
    Tmu0,
    Tmu1,
}

impl TextureUnit {
    pub fn index(self) -> usize {
        match self {
            TextureUnit::Tmu0 => 0,
            TextureUnit::Tmu1 => 1,
        }
    }
}

/// Fingerprint of the mode state a generated routine is specialized for.
///
/// Fields are private and the value is `Copy`; the `with_*` builders return a new
/// fingerprint, so a configuration is never mutated once it has been used as a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineConfig {
    xdir: ScanDirection,
    alpha_mode: u32,
    fbz_mode: u32,
    fog_mode: u32,
    fbz_color_path: u32,
    texture_mode: [u32; 2],
    tlod: [u32; 2],
    trex_init1: u32,
    tiled: bool,
}

impl PipelineConfig {
    /// A configuration with every mode word zero.
    pub fn new(xdir: ScanDirection) -> Self {
        Self {
            xdir,
            alpha_mode: 0,
            fbz_mode: 0,
            fog_mode: 0,
            fbz_color_path: 0,
            texture_mode: [0; 2],
            tlod: [0; 2],
            trex_init1: 0,
            tiled: false,
        }
    }

    /// Derive the fingerprint from the live parameter block.
    pub fn from_params(params: &PipelineParams, xdir: i32, trex_init1: u32) -> Self {
        Self::new(ScanDirection::from_xdir(xdir))
            .with_alpha_mode(params.alpha_mode)
            .with_fbz_mode(params.fbz_mode)
            .with_fog_mode(params.fog_mode)
            .with_color_path(params.fbz_color_path)
            .with_texture_mode(TextureUnit::Tmu0, params.texture_mode[0])
            .with_texture_mode(TextureUnit::Tmu1, params.texture_mode[1])
            .with_tlod(TextureUnit::Tmu0, params.tlod[0])
            .with_tlod(TextureUnit::Tmu1, params.tlod[1])
            .with_trex_init1(trex_init1)
            .with_tiled(params.col_tiled != 0 || params.aux_tiled != 0)
    }

    pub fn with_alpha_mode(mut self, value: u32) -> Self {
        self.alpha_mode = value;
        self
    }

    pub fn with_fbz_mode(mut self, value: u32) -> Self {
        self.fbz_mode = value;
        self
    }

    pub fn with_fog_mode(mut self, value: u32) -> Self {
        self.fog_mode = value;
        self
    }

    pub fn with_color_path(mut self, value: u32) -> Self {
        self.fbz_color_path = value;
        self
    }

    pub fn with_texture_mode(mut self, unit: TextureUnit, value: u32) -> Self {
        self.texture_mode[unit.index()] = value;
        self
    }

    /// Only the mirror bits of the LOD register take part in the key.
    pub fn with_tlod(mut self, unit: TextureUnit, value: u32) -> Self {
        self.tlod[unit.index()] = value & LOD_MASK;
        self
    }

    pub fn with_trex_init1(mut self, value: u32) -> Self {
        self.trex_init1 = value & TREXINIT1_KEY_BIT;
        self
    }

    pub fn with_tiled(mut self, tiled: bool) -> Self {
        self.tiled = tiled;
        self
    }

    /// Set the depth function without disturbing the other fbzMode bits.
    pub fn with_depth_op(mut self, op: DepthOp) -> Self {
        self.fbz_mode = (self.fbz_mode & !(7 << FBZ_DEPTH_OP_SHIFT)) | (op.bits() << FBZ_DEPTH_OP_SHIFT);
        self
    }

    pub fn xdir(&self) -> ScanDirection {
        self.xdir
    }

    pub fn alpha_mode(&self) -> u32 {
        self.alpha_mode
    }

    pub fn fbz_mode(&self) -> u32 {
        self.fbz_mode
    }

    pub fn fog_mode(&self) -> u32 {
        self.fog_mode
    }

    pub fn color_path(&self) -> u32 {
        self.fbz_color_path
    }

    pub fn texture_mode(&self, unit: TextureUnit) -> u32 {
        self.texture_mode[unit.index()]
    }

    pub fn tlod(&self, unit: TextureUnit) -> u32 {
        self.tlod[unit.index()]
    }

    pub fn trex_init1(&self) -> u32 {
        self.trex_init1
    }

    pub fn tiled(&self) -> bool {
        self.tiled
    }

    pub fn stipple(&self) -> Option<StippleMode> {
        if self.fbz_mode & FBZ_STIPPLE == 0 {
            None
        } else if self.fbz_mode & FBZ_STIPPLE_PATT != 0 {
            Some(StippleMode::Pattern)
        } else {
            Some(StippleMode::Rotating)
        }
    }

    pub fn w_buffer(&self) -> bool {
        self.fbz_mode & FBZ_W_BUFFER != 0
    }

    /// Fog reads the W depth only in plain table-fog mode.
    pub fn fog_needs_w_depth(&self) -> bool {
        self.fog_mode & (FOG_ENABLE | FOG_CONSTANT | FOG_Z | FOG_ALPHA) == FOG_ENABLE
    }

    pub fn depth_enabled(&self) -> bool {
        self.fbz_mode & FBZ_DEPTH_ENABLE != 0
    }

    pub fn depth_op(&self) -> DepthOp {
        DepthOp::from_bits((self.fbz_mode >> FBZ_DEPTH_OP_SHIFT) & 7)
    }

    pub fn depth_bias(&self) -> bool {
        self.fbz_mode & FBZ_DEPTH_BIAS != 0
    }

    pub fn depth_source(&self) -> bool {
        self.fbz_mode & FBZ_DEPTH_SOURCE != 0
    }

    pub fn texture_enabled(&self) -> bool {
        self.fbz_color_path & FBZCP_TEXTURE_ENABLED != 0
    }

    fn tmu0_local(&self) -> bool {
        self.texture_mode[0] & TEXTUREMODE_LOCAL_MASK == TEXTUREMODE_LOCAL
    }

    fn tmu0_passthrough(&self) -> bool {
        self.texture_mode[0] & TEXTUREMODE_MASK == TEXTUREMODE_PASSTHROUGH
    }

    /// Units fetched per pixel, in fetch order.
    pub fn texture_units(&self, dual_tmus: bool) -> &'static [TextureUnit] {
        if self.tmu0_local() || !dual_tmus {
            &[TextureUnit::Tmu0]
        } else if self.tmu0_passthrough() {
            &[TextureUnit::Tmu1]
        } else {
            &[TextureUnit::Tmu1, TextureUnit::Tmu0]
        }
    }

    /// Texel counter increment per textured pixel.
    pub fn texels_per_pixel(&self) -> u32 {
        if self.tmu0_passthrough() || self.tmu0_local() {
            1
        } else {
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lod_and_init_are_masked() {
        let a = PipelineConfig::new(ScanDirection::Forward)
            .with_tlod(TextureUnit::Tmu0, LOD_TMIRROR_S | 0x3f)
            .with_trex_init1(0xffff_ffff);
        let b = PipelineConfig::new(ScanDirection::Forward)
            .with_tlod(TextureUnit::Tmu0, LOD_TMIRROR_S)
            .with_trex_init1(TREXINIT1_KEY_BIT);
        assert_eq!(a, b);
        assert_eq!(a.trex_init1(), TREXINIT1_KEY_BIT);
    }

    #[test]
    fn direction_is_part_of_key() {
        let fwd = PipelineConfig::new(ScanDirection::Forward);
        let back = PipelineConfig::new(ScanDirection::Backward);
        assert_ne!(fwd, back);
        assert_eq!(ScanDirection::from_xdir(-1), ScanDirection::Backward);
        assert_eq!(ScanDirection::from_xdir(1).step(), 1);
    }

    #[test]
    fn depth_op_roundtrips_through_fbz_mode() {
        for op in DepthOp::ALL {
            let config = PipelineConfig::new(ScanDirection::Forward)
                .with_fbz_mode(FBZ_DEPTH_ENABLE | FBZ_STIPPLE)
                .with_depth_op(op);
            assert_eq!(config.depth_op(), op);
            assert!(config.depth_enabled());
            assert_eq!(config.stipple(), Some(StippleMode::Rotating));
        }
    }

    #[test]
    fn fog_w_depth_only_for_table_fog() {
        let table = PipelineConfig::new(ScanDirection::Forward).with_fog_mode(FOG_ENABLE);
        let z_fog = table.with_fog_mode(FOG_ENABLE | FOG_Z);
        assert!(table.fog_needs_w_depth());
        assert!(!z_fog.fog_needs_w_depth());
    }

    #[test]
    fn texture_unit_selection() {
        let base = PipelineConfig::new(ScanDirection::Forward)
            .with_color_path(FBZCP_TEXTURE_ENABLED);
        let passthrough = base;
        let local = base.with_texture_mode(TextureUnit::Tmu0, TEXTUREMODE_LOCAL);
        let combine = base.with_texture_mode(TextureUnit::Tmu0, 0x0000_1000);

        assert_eq!(passthrough.texture_units(false), &[TextureUnit::Tmu0]);
        assert_eq!(passthrough.texture_units(true), &[TextureUnit::Tmu1]);
        assert_eq!(local.texture_units(true), &[TextureUnit::Tmu0]);
        assert_eq!(combine.texture_units(true), &[TextureUnit::Tmu1, TextureUnit::Tmu0]);

        assert_eq!(passthrough.texels_per_pixel(), 1);
        assert_eq!(local.texels_per_pixel(), 1);
        assert_eq!(combine.texels_per_pixel(), 2);
    }
}
