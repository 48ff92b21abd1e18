//! Grade state model.
//!
//! `GradeState` is the flattened record of all effect groups: the single
//! source of truth for what should currently be rendered. `GradeDelta` is a
//! partial snapshot carrying only the groups changed since the last flush.
//! Both are plain data; dirty tracking and device pushes live in the
//! renderer crate.

pub mod groups;

use serde::{Deserialize, Serialize};

pub use groups::{
    BackgroundDerived, BackgroundParams, BackgroundStyle, BloomParams, BorderParams, CdlParams,
    ChannelMixerParams, ChromaticAberrationParams, ClarityParams, ColorWheelsParams, ContrastParams,
    CurvePoint, DehazeParams, DenoiseParams, ExposureParams, GrainParams, HslMixerParams,
    LensDistortionParams, LevelsParams, LutCube, LutParams, MaskOverlayParams, OrientationDerived,
    OrientationParams, PosterizeParams, SaturationParams, SharpenParams, SplitToningParams,
    TextureParams, TonalRangeParams, ToneCurveParams, ToneMappingOperator, ToneMappingParams,
    VignetteParams, WatermarkCorner, WatermarkImage, WatermarkParams, WhiteBalanceParams,
    CURVE_LUT_SIZE,
};

/// Lower bound substituted for non-finite values that divide in a shader.
pub const DIVISOR_EPSILON: f32 = 1.0e-4;

/// Replace a non-finite scalar with zero.
pub fn sanitize_scalar(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}

/// Replace a non-finite value with `fallback`, then keep it clear of zero.
/// Used for parameters that end up as divisors or exponents on the device.
pub fn sanitize_divisor(value: f32, fallback: f32) -> f32 {
    let value = if value.is_finite() { value } else { fallback };
    if value.abs() < DIVISOR_EPSILON {
        DIVISOR_EPSILON.copysign(if value == 0.0 { 1.0 } else { value })
    } else {
        value
    }
}

/// Replace a non-finite value with `fallback` and clamp into [0, 1].
pub fn sanitize_unit(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

/// The complete grade: one field per effect group.
///
/// Mutated only through the renderer's setters or `apply_state`; never read
/// back partially mid-update. One instance per session, reset to defaults on
/// dispose.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GradeState {
    pub exposure: ExposureParams,
    pub white_balance: WhiteBalanceParams,
    pub contrast: ContrastParams,
    pub saturation: SaturationParams,
    pub tonal_range: TonalRangeParams,
    pub tone_curve: ToneCurveParams,
    pub hsl_mixer: HslMixerParams,
    pub cdl: CdlParams,
    pub color_wheels: ColorWheelsParams,
    pub clarity: ClarityParams,
    pub texture: TextureParams,
    pub dehaze: DehazeParams,
    pub sharpen: SharpenParams,
    pub denoise: DenoiseParams,
    pub vignette: VignetteParams,
    pub grain: GrainParams,
    pub chromatic_aberration: ChromaticAberrationParams,
    pub lens_distortion: LensDistortionParams,
    pub orientation: OrientationParams,
    pub tone_mapping: ToneMappingParams,
    pub lut: LutParams,
    pub background: BackgroundParams,
    pub split_toning: SplitToningParams,
    pub levels: LevelsParams,
    pub channel_mixer: ChannelMixerParams,
    pub watermark: WatermarkParams,
    pub bloom: BloomParams,
    pub posterize: PosterizeParams,
    pub border: BorderParams,
    pub mask_overlay: MaskOverlayParams,
}

/// A partial grade snapshot: `Some` per group changed since the last flush.
///
/// Repeated writes to the same group before a flush keep only the latest
/// value. A delta with every field present is a full snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GradeDelta {
    pub exposure: Option<ExposureParams>,
    pub white_balance: Option<WhiteBalanceParams>,
    pub contrast: Option<ContrastParams>,
    pub saturation: Option<SaturationParams>,
    pub tonal_range: Option<TonalRangeParams>,
    pub tone_curve: Option<ToneCurveParams>,
    pub hsl_mixer: Option<HslMixerParams>,
    pub cdl: Option<CdlParams>,
    pub color_wheels: Option<ColorWheelsParams>,
    pub clarity: Option<ClarityParams>,
    pub texture: Option<TextureParams>,
    pub dehaze: Option<DehazeParams>,
    pub sharpen: Option<SharpenParams>,
    pub denoise: Option<DenoiseParams>,
    pub vignette: Option<VignetteParams>,
    pub grain: Option<GrainParams>,
    pub chromatic_aberration: Option<ChromaticAberrationParams>,
    pub lens_distortion: Option<LensDistortionParams>,
    pub orientation: Option<OrientationParams>,
    pub tone_mapping: Option<ToneMappingParams>,
    pub lut: Option<LutParams>,
    pub background: Option<BackgroundParams>,
    pub split_toning: Option<SplitToningParams>,
    pub levels: Option<LevelsParams>,
    pub channel_mixer: Option<ChannelMixerParams>,
    pub watermark: Option<WatermarkParams>,
    pub bloom: Option<BloomParams>,
    pub posterize: Option<PosterizeParams>,
    pub border: Option<BorderParams>,
    pub mask_overlay: Option<MaskOverlayParams>,
}

impl GradeDelta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Full snapshot: every group present.
    pub fn from_state(state: &GradeState) -> Self {
        Self {
            exposure: Some(state.exposure),
            white_balance: Some(state.white_balance),
            contrast: Some(state.contrast),
            saturation: Some(state.saturation),
            tonal_range: Some(state.tonal_range),
            tone_curve: Some(state.tone_curve.clone()),
            hsl_mixer: Some(state.hsl_mixer),
            cdl: Some(state.cdl),
            color_wheels: Some(state.color_wheels),
            clarity: Some(state.clarity),
            texture: Some(state.texture),
            dehaze: Some(state.dehaze),
            sharpen: Some(state.sharpen),
            denoise: Some(state.denoise),
            vignette: Some(state.vignette),
            grain: Some(state.grain),
            chromatic_aberration: Some(state.chromatic_aberration),
            lens_distortion: Some(state.lens_distortion),
            orientation: Some(state.orientation),
            tone_mapping: Some(state.tone_mapping),
            lut: Some(state.lut.clone()),
            background: Some(state.background),
            split_toning: Some(state.split_toning),
            levels: Some(state.levels),
            channel_mixer: Some(state.channel_mixer),
            watermark: Some(state.watermark.clone()),
            bloom: Some(state.bloom),
            posterize: Some(state.posterize),
            border: Some(state.border),
            mask_overlay: Some(state.mask_overlay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delta_is_empty_and_full_snapshot_is_not() {
        assert!(GradeDelta::default().is_empty());
        assert!(!GradeDelta::from_state(&GradeState::default()).is_empty());
    }

    #[test]
    fn orientation_normalizes_full_rotations_away() {
        let zero = OrientationParams::default();
        let full_turn = OrientationParams {
            quarter_turns: 4,
            ..OrientationParams::default()
        };
        let negative = OrientationParams {
            quarter_turns: -3,
            ..OrientationParams::default()
        };

        assert_eq!(zero.derived(), full_turn.derived());
        assert_eq!(negative.derived().quarter_turns, 1);
        assert!(!full_turn.is_active());
    }

    #[test]
    fn background_colors_under_zero_alpha_derive_equal() {
        let red = BackgroundParams {
            style: BackgroundStyle::Solid,
            color_a: [255, 0, 0, 0],
            ..BackgroundParams::default()
        };
        let blue = BackgroundParams {
            style: BackgroundStyle::Solid,
            color_a: [0, 0, 255, 0],
            ..BackgroundParams::default()
        };

        assert_ne!(red, blue);
        assert_eq!(red.derived(), blue.derived());
    }

    #[test]
    fn solid_background_ignores_secondary_color() {
        let grey = BackgroundParams {
            style: BackgroundStyle::Solid,
            color_b: [10, 20, 30, 255],
            ..BackgroundParams::default()
        };
        let other = BackgroundParams {
            style: BackgroundStyle::Solid,
            color_b: [200, 100, 50, 255],
            ..BackgroundParams::default()
        };

        assert_eq!(grey.derived(), other.derived());
        assert!(!grey.derived().checker);
    }

    #[test]
    fn sanitize_replaces_non_finite_input() {
        let exposure = ExposureParams {
            ev: f32::NAN,
            black_level: f32::INFINITY,
        }
        .sanitized();
        assert_eq!(exposure.ev, 0.0);
        assert_eq!(exposure.black_level, 0.0);

        let distortion = LensDistortionParams {
            amount: 0.2,
            scale: f32::NAN,
        }
        .sanitized();
        assert_eq!(distortion.scale, 1.0);
    }

    #[test]
    fn divisor_sanitization_never_returns_zero() {
        assert!(sanitize_divisor(0.0, 1.0) >= DIVISOR_EPSILON);
        assert!(sanitize_divisor(-0.0, 1.0) >= DIVISOR_EPSILON);
        assert_eq!(sanitize_divisor(f32::NAN, 1.0), 1.0);
        assert_eq!(sanitize_divisor(2.5, 1.0), 2.5);
        assert!(sanitize_divisor(-1.0e-9, 1.0) <= -DIVISOR_EPSILON);
    }

    #[test]
    fn levels_input_range_stays_open_after_sanitization() {
        let degenerate = LevelsParams {
            input_black: 0.4,
            input_white: 0.4,
            ..LevelsParams::default()
        }
        .sanitized();
        assert!(degenerate.input_white > degenerate.input_black);
    }

    #[test]
    fn curve_rasterization_hits_endpoints_and_midpoints() {
        let identity = ToneCurveParams::default().rasterize();
        assert_eq!(identity.len(), CURVE_LUT_SIZE);
        assert_eq!(identity[0], 0.0);
        assert_eq!(identity[CURVE_LUT_SIZE - 1], 1.0);

        let lifted = ToneCurveParams {
            points: vec![
                CurvePoint { x: 0.0, y: 0.2 },
                CurvePoint { x: 1.0, y: 1.0 },
            ],
        };
        let lut = lifted.rasterize();
        assert_eq!(lut[0], 0.2);
        assert!(lifted.is_active());
    }

    #[test]
    fn malformed_lut_cube_is_discarded_by_sanitization() {
        let params = LutParams {
            enabled: true,
            strength: 1.0,
            cube: Some(LutCube {
                size: 8,
                rgb: vec![0.0; 7],
            }),
        }
        .sanitized();
        assert!(params.cube.is_none());
        assert!(!params.is_active());
    }

    #[test]
    fn grade_state_round_trips_through_serde() {
        let mut state = GradeState::default();
        state.cdl.slope = [1.1, 0.9, 1.0];
        state.clarity = ClarityParams {
            enabled: true,
            amount: 35.0,
        };

        let json = serde_json::to_string(&state).expect("serialize grade state");
        let back: GradeState = serde_json::from_str(&json).expect("deserialize grade state");
        assert_eq!(state, back);
    }
}
