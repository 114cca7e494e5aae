// Lookup tables shared by every generated routine. They are built once per process on first
// use and never move afterwards, so the generator can bake their addresses into the prologue
// as immediates and pin them in callee-saved registers. Every row is one 128-bit vector of
// eight 16-bit lanes so the blend and filter stages can load a row with a single vector load.
// Those stages are generated elsewhere; the span routine only establishes the pinned bases
// so a routine that adds them keeps the same prologue and frame.

//! Shared lookup tables pinned by generated routines.

use once_cell::sync::Lazy;

/// One 128-bit table row.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lane8(pub [u16; 8]);

impl Lane8 {
    const fn splat4(value: u16) -> Self {
        Lane8([value, value, value, value, 0, 0, 0, 0])
    }

    const fn splat8(value: u16) -> Self {
        Lane8([value; 8])
    }
}

/// Blend and filter tables.
#[repr(C, align(16))]
pub struct SharedTables {
    /// `c` broadcast into the low four lanes, for c in 0..=256.
    pub alookup: [Lane8; 257],
    /// `255 - c` broadcast into the low four lanes.
    pub aminuslookup: [Lane8; 256],
    /// Bilinear weights for sub-texel position `c` (ds = c & 15, dt = c >> 4).
    pub bilinear: [[Lane8; 2]; 256],
    pub constants: VectorConstants,
}

/// Vector constants loaded into v8/v9 by the prologue.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorConstants {
    pub one_w: Lane8,
    pub ff_w: Lane8,
    pub ff_b: Lane8,
    pub minus_254: Lane8,
    pub zero_ff_w: [Lane8; 2],
}

impl SharedTables {
    fn build() -> Box<Self> {
        let mut alookup = [Lane8::default(); 257];
        for (c, row) in alookup.iter_mut().enumerate() {
            *row = Lane8::splat4(c as u16);
        }

        let mut aminuslookup = [Lane8::default(); 256];
        for (c, row) in aminuslookup.iter_mut().enumerate() {
            *row = Lane8::splat4(255 - c as u16);
        }

        let mut bilinear = [[Lane8::default(); 2]; 256];
        for (c, rows) in bilinear.iter_mut().enumerate() {
            let ds = (c & 0xf) as u16;
            let dt = (c >> 4) as u16;
            let d0 = (16 - ds) * (16 - dt);
            let d1 = ds * (16 - dt);
            let d2 = (16 - ds) * dt;
            let d3 = ds * dt;
            rows[0] = Lane8([d0, d0, d0, d0, d1, d1, d1, d1]);
            rows[1] = Lane8([d2, d2, d2, d2, d3, d3, d3, d3]);
        }

        Box::new(Self {
            alookup,
            aminuslookup,
            bilinear,
            constants: VectorConstants {
                one_w: Lane8::splat8(0x0001),
                ff_w: Lane8::splat8(0x00ff),
                ff_b: Lane8([0xffff, 0x00ff, 0, 0, 0, 0, 0, 0]),
                minus_254: Lane8::splat8(0xff02),
                zero_ff_w: [Lane8::splat4(0), Lane8::splat4(0xff)],
            },
        })
    }

    pub fn alookup_addr(&self) -> u64 {
        self.alookup.as_ptr() as u64
    }

    pub fn aminuslookup_addr(&self) -> u64 {
        self.aminuslookup.as_ptr() as u64
    }

    pub fn bilinear_addr(&self) -> u64 {
        self.bilinear.as_ptr() as u64
    }

    pub fn constants_addr(&self) -> u64 {
        &self.constants as *const VectorConstants as u64
    }
}

static TABLES: Lazy<Box<SharedTables>> = Lazy::new(SharedTables::build);

/// The process-wide tables, built on first call.
pub fn shared() -> &'static SharedTables {
    &TABLES
}
