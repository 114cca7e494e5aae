//! proptest strategies over configurations, states and parameter blocks.

use proptest::prelude::*;
use voodoo_jit::core::fingerprint::modes::*;
use voodoo_jit::core::layout::{TmuCoords, TmuGradients};
use voodoo_jit::{DepthOp, PipelineConfig, PipelineParams, PixelState, ScanDirection, TextureUnit};

/// A configuration together with the dual-unit flag of the card.
pub fn pipeline_config() -> impl Strategy<Value = (PipelineConfig, bool)> {
    let depth = (
        any::<bool>(),
        any::<bool>(),
        0u32..8,
        any::<bool>(),
        any::<bool>(),
    );
    let rest = (
        any::<bool>(),
        prop::sample::select(vec![0, FBZ_STIPPLE, FBZ_STIPPLE | FBZ_STIPPLE_PATT]),
        prop::sample::select(vec![0, FOG_ENABLE, FOG_ENABLE | FOG_Z, FOG_ENABLE | FOG_CONSTANT]),
        any::<bool>(),
        prop::sample::select(vec![TEXTUREMODE_PASSTHROUGH, TEXTUREMODE_LOCAL, 0x1000]),
        any::<bool>(),
        any::<bool>(),
    );
    (depth, rest).prop_map(
        |(
            (w_buffer, enabled, op, bias, source),
            (backward, stipple, fog, texture, tmu0_mode, tiled, dual),
        )| {
            let mut fbz = stipple;
            if w_buffer {
                fbz |= FBZ_W_BUFFER;
            }
            if enabled {
                fbz |= FBZ_DEPTH_ENABLE;
            }
            if bias {
                fbz |= FBZ_DEPTH_BIAS;
            }
            if source {
                fbz |= FBZ_DEPTH_SOURCE;
            }
            let xdir = if backward {
                ScanDirection::Backward
            } else {
                ScanDirection::Forward
            };
            let config = PipelineConfig::new(xdir)
                .with_fbz_mode(fbz)
                .with_depth_op(DepthOp::from_bits(op))
                .with_fog_mode(fog)
                .with_color_path(if texture { FBZCP_TEXTURE_ENABLED } else { 0 })
                .with_texture_mode(TextureUnit::Tmu0, tmu0_mode)
                .with_tiled(tiled);
            (config, dual)
        },
    )
}

fn tmu_coords() -> impl Strategy<Value = TmuCoords> {
    (any::<i64>(), any::<i64>(), any::<i64>()).prop_map(|(s, t, w)| TmuCoords { s, t, w })
}

fn tmu_gradients() -> impl Strategy<Value = TmuGradients> {
    (any::<i64>(), any::<i64>(), any::<i64>()).prop_map(|(d_sdx, d_tdx, d_wdx)| TmuGradients {
        d_sdx,
        d_tdx,
        d_wdx,
    })
}

/// Interpolator values of a state; the caller fills in pointers and the span.
pub fn interpolators() -> impl Strategy<Value = PixelState> {
    (
        (any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>()),
        any::<i32>(),
        prop_oneof![0i64..(1 << 48), any::<i64>()],
        [tmu_coords(), tmu_coords()],
        any::<u32>(),
        [any::<u32>(), any::<u32>()],
    )
        .prop_map(|((ib, ig, ir, ia), z, w, tmu, stipple, texel)| PixelState {
            ib,
            ig,
            ir,
            ia,
            z,
            w,
            tmu,
            stipple,
            texel,
            ..PixelState::default()
        })
}

pub fn gradients() -> impl Strategy<Value = PipelineParams> {
    (
        (any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>()),
        any::<i32>(),
        any::<i64>(),
        [tmu_gradients(), tmu_gradients()],
        any::<u32>(),
    )
        .prop_map(|((d_bdx, d_gdx, d_rdx, d_adx), d_zdx, d_wdx, tmu, za_color)| {
            PipelineParams {
                d_bdx,
                d_gdx,
                d_rdx,
                d_adx,
                d_zdx,
                d_wdx,
                tmu,
                za_color,
                ..PipelineParams::default()
            }
        })
}
