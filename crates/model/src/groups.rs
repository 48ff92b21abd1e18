//! Per-group grade parameters.
//!
//! Every effect group is one independently toggleable unit of render state.
//! Each parameter struct carries its neutral values in `Default`, an
//! `is_active` condition (not always a literal flag), and a `sanitized`
//! form that replaces non-finite input with safe values so malformed
//! numbers never reach the device.

use serde::{Deserialize, Serialize};

use crate::{sanitize_divisor, sanitize_scalar, sanitize_unit};

/// Exposure compensation in EV stops plus black level offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureParams {
    /// Exposure compensation (-5.0 to 5.0 EV, 0.0 = no change)
    pub ev: f32,
    /// Black level offset (-0.5 to 0.5, 0.0 = no change)
    pub black_level: f32,
}

impl Default for ExposureParams {
    fn default() -> Self {
        Self {
            ev: 0.0,
            black_level: 0.0,
        }
    }
}

impl ExposureParams {
    pub fn is_active(&self) -> bool {
        self.ev != 0.0 || self.black_level != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            ev: sanitize_scalar(self.ev),
            black_level: sanitize_scalar(self.black_level),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WhiteBalanceParams {
    /// Color temperature (-1.0 cool to 1.0 warm, 0.0 = neutral)
    pub temperature: f32,
    /// Green/magenta tint (-1.0 to 1.0)
    pub tint: f32,
}

impl Default for WhiteBalanceParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            tint: 0.0,
        }
    }
}

impl WhiteBalanceParams {
    pub fn is_active(&self) -> bool {
        self.temperature != 0.0 || self.tint != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            temperature: sanitize_scalar(self.temperature),
            tint: sanitize_scalar(self.tint),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContrastParams {
    /// Contrast amount (-1.0 to 1.0, 0.0 = no change)
    pub amount: f32,
    /// Pivot luminance the curve rotates around
    pub pivot: f32,
}

impl Default for ContrastParams {
    fn default() -> Self {
        Self {
            amount: 0.0,
            pivot: 0.5,
        }
    }
}

impl ContrastParams {
    pub fn is_active(&self) -> bool {
        self.amount != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            amount: sanitize_scalar(self.amount),
            pivot: sanitize_unit(self.pivot, 0.5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaturationParams {
    /// Global saturation multiplier (0.0 to 3.0, 1.0 = no change)
    pub saturation: f32,
    /// Vibrance: saturation weighted toward muted colors (-1.0 to 1.0)
    pub vibrance: f32,
}

impl Default for SaturationParams {
    fn default() -> Self {
        Self {
            saturation: 1.0,
            vibrance: 0.0,
        }
    }
}

impl SaturationParams {
    pub fn is_active(&self) -> bool {
        self.saturation != 1.0 || self.vibrance != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            saturation: if self.saturation.is_finite() {
                self.saturation
            } else {
                1.0
            },
            vibrance: sanitize_scalar(self.vibrance),
        }
    }
}

/// Highlight/shadow recovery over the four tonal range bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TonalRangeParams {
    pub highlights: f32,
    pub shadows: f32,
    pub whites: f32,
    pub blacks: f32,
}

impl Default for TonalRangeParams {
    fn default() -> Self {
        Self {
            highlights: 0.0,
            shadows: 0.0,
            whites: 0.0,
            blacks: 0.0,
        }
    }
}

impl TonalRangeParams {
    pub fn is_active(&self) -> bool {
        self.highlights != 0.0
            || self.shadows != 0.0
            || self.whites != 0.0
            || self.blacks != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            highlights: sanitize_scalar(self.highlights),
            shadows: sanitize_scalar(self.shadows),
            whites: sanitize_scalar(self.whites),
            blacks: sanitize_scalar(self.blacks),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub x: f32,
    pub y: f32,
}

/// Luminance tone curve as sorted control points.
///
/// The curve is rasterized into a lookup table on flush; the raster is the
/// device-facing resource content, the points are the editable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneCurveParams {
    pub points: Vec<CurvePoint>,
}

/// Resolution of the rasterized curve lookup table.
pub const CURVE_LUT_SIZE: usize = 256;

impl Default for ToneCurveParams {
    fn default() -> Self {
        Self {
            points: vec![
                CurvePoint { x: 0.0, y: 0.0 },
                CurvePoint { x: 1.0, y: 1.0 },
            ],
        }
    }
}

impl ToneCurveParams {
    pub fn is_active(&self) -> bool {
        *self != Self::default()
    }

    pub fn sanitized(self) -> Self {
        let mut points: Vec<CurvePoint> = self
            .points
            .into_iter()
            .map(|p| CurvePoint {
                x: sanitize_unit(p.x, 0.0),
                y: sanitize_unit(p.y, 0.0),
            })
            .collect();
        points.sort_by(|a, b| a.x.total_cmp(&b.x));
        if points.is_empty() {
            return Self::default();
        }
        Self { points }
    }

    /// Rasterize the control points into a `CURVE_LUT_SIZE` lookup table
    /// using piecewise-linear interpolation.
    pub fn rasterize(&self) -> Vec<f32> {
        let mut lut = Vec::with_capacity(CURVE_LUT_SIZE);
        for i in 0..CURVE_LUT_SIZE {
            let x = i as f32 / (CURVE_LUT_SIZE - 1) as f32;
            lut.push(self.evaluate(x));
        }
        lut
    }

    fn evaluate(&self, x: f32) -> f32 {
        let points = &self.points;
        match points.first() {
            None => return x,
            Some(first) if x <= first.x => return first.y,
            Some(_) => {}
        }
        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if x <= b.x {
                let span = b.x - a.x;
                if span <= 0.0 {
                    return b.y;
                }
                let t = (x - a.x) / span;
                return a.y + (b.y - a.y) * t;
            }
        }
        points.last().map(|p| p.y).unwrap_or(x)
    }
}

/// Per-band hue/saturation/luminance mixer over eight hue bands
/// (red, orange, yellow, green, aqua, blue, purple, magenta).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HslMixerParams {
    pub hue_shift: [f32; 8],
    pub saturation_scale: [f32; 8],
    pub luminance_scale: [f32; 8],
}

impl Default for HslMixerParams {
    fn default() -> Self {
        Self {
            hue_shift: [0.0; 8],
            saturation_scale: [1.0; 8],
            luminance_scale: [1.0; 8],
        }
    }
}

impl HslMixerParams {
    pub fn is_active(&self) -> bool {
        *self != Self::default()
    }

    pub fn sanitized(self) -> Self {
        Self {
            hue_shift: self.hue_shift.map(sanitize_scalar),
            saturation_scale: self
                .saturation_scale
                .map(|v| if v.is_finite() { v } else { 1.0 }),
            luminance_scale: self
                .luminance_scale
                .map(|v| if v.is_finite() { v } else { 1.0 }),
        }
    }
}

/// ASC CDL primary grade: per-channel slope/offset/power plus saturation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CdlParams {
    pub slope: [f32; 3],
    pub offset: [f32; 3],
    pub power: [f32; 3],
    pub saturation: f32,
}

impl Default for CdlParams {
    fn default() -> Self {
        Self {
            slope: [1.0; 3],
            offset: [0.0; 3],
            power: [1.0; 3],
            saturation: 1.0,
        }
    }
}

impl CdlParams {
    pub fn is_active(&self) -> bool {
        *self != Self::default()
    }

    pub fn sanitized(self) -> Self {
        Self {
            slope: self.slope.map(|v| if v.is_finite() { v } else { 1.0 }),
            offset: self.offset.map(sanitize_scalar),
            // Power is an exponent denominator in the shader; keep it off zero.
            power: self.power.map(|v| sanitize_divisor(v, 1.0)),
            saturation: if self.saturation.is_finite() {
                self.saturation
            } else {
                1.0
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorWheelsParams {
    pub lift: [f32; 3],
    pub gamma: [f32; 3],
    pub gain: [f32; 3],
}

impl Default for ColorWheelsParams {
    fn default() -> Self {
        Self {
            lift: [0.0; 3],
            gamma: [1.0; 3],
            gain: [1.0; 3],
        }
    }
}

impl ColorWheelsParams {
    pub fn is_active(&self) -> bool {
        *self != Self::default()
    }

    pub fn sanitized(self) -> Self {
        Self {
            lift: self.lift.map(sanitize_scalar),
            gamma: self.gamma.map(|v| sanitize_divisor(v, 1.0)),
            gain: self.gain.map(|v| if v.is_finite() { v } else { 1.0 }),
        }
    }
}

/// Local contrast boost through the edge-aware detail filter.
///
/// Shares the detail filter scratch with denoise; see the flush ordering
/// contract in the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClarityParams {
    pub enabled: bool,
    /// -100.0 (soften) to 100.0 (boost)
    pub amount: f32,
}

impl Default for ClarityParams {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 0.0,
        }
    }
}

impl ClarityParams {
    pub fn is_active(&self) -> bool {
        self.enabled && self.amount != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            enabled: self.enabled,
            amount: sanitize_scalar(self.amount),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureParams {
    pub amount: f32,
}

impl Default for TextureParams {
    fn default() -> Self {
        Self { amount: 0.0 }
    }
}

impl TextureParams {
    pub fn is_active(&self) -> bool {
        self.amount != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            amount: sanitize_scalar(self.amount),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DehazeParams {
    pub amount: f32,
}

impl Default for DehazeParams {
    fn default() -> Self {
        Self { amount: 0.0 }
    }
}

impl DehazeParams {
    pub fn is_active(&self) -> bool {
        self.amount != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            amount: sanitize_scalar(self.amount),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharpenParams {
    /// Unsharp mask strength (0.0 to 3.0)
    pub amount: f32,
    /// Kernel radius in pixels; divides the sample offsets in the shader
    pub radius: f32,
    /// Edge threshold below which sharpening is suppressed
    pub threshold: f32,
}

impl Default for SharpenParams {
    fn default() -> Self {
        Self {
            amount: 0.0,
            radius: 1.0,
            threshold: 0.0,
        }
    }
}

impl SharpenParams {
    pub fn is_active(&self) -> bool {
        self.amount != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            amount: sanitize_scalar(self.amount),
            radius: sanitize_divisor(self.radius, 1.0),
            threshold: sanitize_scalar(self.threshold),
        }
    }
}

/// Edge-aware noise reduction. Shares the detail filter scratch with clarity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DenoiseParams {
    pub enabled: bool,
    pub luminance: f32,
    pub chroma: f32,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            enabled: false,
            luminance: 0.0,
            chroma: 0.0,
        }
    }
}

impl DenoiseParams {
    pub fn is_active(&self) -> bool {
        self.enabled && (self.luminance != 0.0 || self.chroma != 0.0)
    }

    pub fn sanitized(self) -> Self {
        Self {
            enabled: self.enabled,
            luminance: sanitize_scalar(self.luminance),
            chroma: sanitize_scalar(self.chroma),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VignetteParams {
    /// -1.0 (white) to 1.0 (black), 0.0 = off
    pub amount: f32,
    pub midpoint: f32,
    pub roundness: f32,
    pub feather: f32,
}

impl Default for VignetteParams {
    fn default() -> Self {
        Self {
            amount: 0.0,
            midpoint: 0.5,
            roundness: 0.0,
            feather: 0.5,
        }
    }
}

impl VignetteParams {
    pub fn is_active(&self) -> bool {
        self.amount != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            amount: sanitize_scalar(self.amount),
            midpoint: sanitize_unit(self.midpoint, 0.5),
            roundness: sanitize_scalar(self.roundness),
            feather: sanitize_unit(self.feather, 0.5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrainParams {
    pub amount: f32,
    pub size: f32,
    pub roughness: f32,
}

impl Default for GrainParams {
    fn default() -> Self {
        Self {
            amount: 0.0,
            size: 1.0,
            roughness: 0.5,
        }
    }
}

impl GrainParams {
    pub fn is_active(&self) -> bool {
        self.amount != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            amount: sanitize_scalar(self.amount),
            size: sanitize_divisor(self.size, 1.0),
            roughness: sanitize_unit(self.roughness, 0.5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChromaticAberrationParams {
    pub red_cyan: f32,
    pub blue_yellow: f32,
}

impl Default for ChromaticAberrationParams {
    fn default() -> Self {
        Self {
            red_cyan: 0.0,
            blue_yellow: 0.0,
        }
    }
}

impl ChromaticAberrationParams {
    pub fn is_active(&self) -> bool {
        self.red_cyan != 0.0 || self.blue_yellow != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            red_cyan: sanitize_scalar(self.red_cyan),
            blue_yellow: sanitize_scalar(self.blue_yellow),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LensDistortionParams {
    pub amount: f32,
    /// Post-distortion rescale; divides sample coordinates in the shader
    pub scale: f32,
}

impl Default for LensDistortionParams {
    fn default() -> Self {
        Self {
            amount: 0.0,
            scale: 1.0,
        }
    }
}

impl LensDistortionParams {
    pub fn is_active(&self) -> bool {
        self.amount != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            amount: sanitize_scalar(self.amount),
            scale: sanitize_divisor(self.scale, 1.0),
        }
    }
}

/// Whole-image orientation: quarter-turn rotation plus mirror flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrientationParams {
    /// Clockwise quarter turns; any integer is accepted and normalized mod 4
    pub quarter_turns: i32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl Default for OrientationParams {
    fn default() -> Self {
        Self {
            quarter_turns: 0,
            flip_horizontal: false,
            flip_vertical: false,
        }
    }
}

/// Observable orientation after normalization. Two inputs that normalize
/// to the same derived value render identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrientationDerived {
    pub quarter_turns: u8,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl OrientationParams {
    pub fn derived(&self) -> OrientationDerived {
        OrientationDerived {
            quarter_turns: self.quarter_turns.rem_euclid(4) as u8,
            flip_horizontal: self.flip_horizontal,
            flip_vertical: self.flip_vertical,
        }
    }

    pub fn is_active(&self) -> bool {
        self.derived() != Self::default().derived()
    }

    pub fn sanitized(self) -> Self {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToneMappingOperator {
    Off,
    Reinhard,
    Filmic,
    Aces,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneMappingParams {
    pub operator: ToneMappingOperator,
    pub intensity: f32,
}

impl Default for ToneMappingParams {
    fn default() -> Self {
        Self {
            operator: ToneMappingOperator::Off,
            intensity: 1.0,
        }
    }
}

impl ToneMappingParams {
    pub fn is_active(&self) -> bool {
        self.operator != ToneMappingOperator::Off
    }

    pub fn sanitized(self) -> Self {
        Self {
            operator: self.operator,
            intensity: sanitize_unit(self.intensity, 1.0),
        }
    }
}

/// An uploaded 3D lookup table cube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LutCube {
    /// Edge length; `rgb.len()` must equal `size^3 * 3`
    pub size: u32,
    pub rgb: Vec<f32>,
}

impl LutCube {
    pub fn is_well_formed(&self) -> bool {
        let edge = self.size as usize;
        self.size >= 2 && self.rgb.len() == edge * edge * edge * 3
    }
}

/// 3D LUT application. The cube is device resource content: re-uploaded
/// only when it changes, while strength/enabled edits stay uniform-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LutParams {
    pub enabled: bool,
    pub strength: f32,
    pub cube: Option<LutCube>,
}

impl Default for LutParams {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 1.0,
            cube: None,
        }
    }
}

impl LutParams {
    pub fn is_active(&self) -> bool {
        self.enabled && self.strength != 0.0 && self.cube.is_some()
    }

    pub fn sanitized(self) -> Self {
        Self {
            enabled: self.enabled,
            strength: sanitize_unit(self.strength, 1.0),
            cube: self.cube.filter(LutCube::is_well_formed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackgroundStyle {
    Solid,
    Checker,
}

/// Canvas background behind transparent regions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundParams {
    pub style: BackgroundStyle,
    /// sRGB bytes, straight alpha
    pub color_a: [u8; 4],
    pub color_b: [u8; 4],
    pub checker_size: f32,
}

impl Default for BackgroundParams {
    fn default() -> Self {
        Self {
            style: BackgroundStyle::Checker,
            color_a: [64, 64, 64, 255],
            color_b: [96, 96, 96, 255],
            checker_size: 8.0,
        }
    }
}

/// Device-facing background values: premultiplied linear colors plus a
/// clamped checker tile size. Distinct inputs that derive equal values
/// (e.g. different RGB under zero alpha) render identically.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundDerived {
    pub color_a: [f32; 4],
    pub color_b: [f32; 4],
    pub checker_size: f32,
    pub checker: bool,
}

fn premultiply(color: [u8; 4]) -> [f32; 4] {
    let alpha = color[3] as f32 / 255.0;
    [
        color[0] as f32 / 255.0 * alpha,
        color[1] as f32 / 255.0 * alpha,
        color[2] as f32 / 255.0 * alpha,
        alpha,
    ]
}

impl BackgroundParams {
    pub fn derived(&self) -> BackgroundDerived {
        let checker = self.style == BackgroundStyle::Checker;
        let color_a = premultiply(self.color_a);
        BackgroundDerived {
            color_a,
            color_b: if checker {
                premultiply(self.color_b)
            } else {
                color_a
            },
            checker_size: if self.checker_size.is_finite() {
                self.checker_size.max(1.0)
            } else {
                1.0
            },
            checker,
        }
    }

    pub fn is_active(&self) -> bool {
        true
    }

    pub fn sanitized(self) -> Self {
        Self {
            checker_size: sanitize_divisor(self.checker_size, 8.0),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitToningParams {
    /// Hues in degrees (0.0 to 360.0)
    pub shadow_hue: f32,
    pub shadow_saturation: f32,
    pub highlight_hue: f32,
    pub highlight_saturation: f32,
    pub balance: f32,
}

impl Default for SplitToningParams {
    fn default() -> Self {
        Self {
            shadow_hue: 0.0,
            shadow_saturation: 0.0,
            highlight_hue: 0.0,
            highlight_saturation: 0.0,
            balance: 0.0,
        }
    }
}

impl SplitToningParams {
    pub fn is_active(&self) -> bool {
        self.shadow_saturation != 0.0 || self.highlight_saturation != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            shadow_hue: sanitize_scalar(self.shadow_hue),
            shadow_saturation: sanitize_scalar(self.shadow_saturation),
            highlight_hue: sanitize_scalar(self.highlight_hue),
            highlight_saturation: sanitize_scalar(self.highlight_saturation),
            balance: sanitize_scalar(self.balance),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelsParams {
    pub input_black: f32,
    /// Input white point; `input_white - input_black` divides the remap
    pub input_white: f32,
    pub gamma: f32,
    pub output_black: f32,
    pub output_white: f32,
}

impl Default for LevelsParams {
    fn default() -> Self {
        Self {
            input_black: 0.0,
            input_white: 1.0,
            gamma: 1.0,
            output_black: 0.0,
            output_white: 1.0,
        }
    }
}

impl LevelsParams {
    pub fn is_active(&self) -> bool {
        *self != Self::default()
    }

    pub fn sanitized(self) -> Self {
        let input_black = sanitize_unit(self.input_black, 0.0);
        let mut input_white = sanitize_unit(self.input_white, 1.0);
        // The input range is a divisor in the remap; keep it open.
        if input_white - input_black < crate::DIVISOR_EPSILON {
            input_white = input_black + crate::DIVISOR_EPSILON;
        }
        Self {
            input_black,
            input_white,
            gamma: sanitize_divisor(self.gamma, 1.0),
            output_black: sanitize_unit(self.output_black, 0.0),
            output_white: sanitize_unit(self.output_white, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelMixerParams {
    pub red: [f32; 3],
    pub green: [f32; 3],
    pub blue: [f32; 3],
}

impl Default for ChannelMixerParams {
    fn default() -> Self {
        Self {
            red: [1.0, 0.0, 0.0],
            green: [0.0, 1.0, 0.0],
            blue: [0.0, 0.0, 1.0],
        }
    }
}

impl ChannelMixerParams {
    pub fn is_active(&self) -> bool {
        *self != Self::default()
    }

    pub fn sanitized(self) -> Self {
        let row = |r: [f32; 3], identity: [f32; 3]| {
            let mut out = r;
            for (value, fallback) in out.iter_mut().zip(identity) {
                if !value.is_finite() {
                    *value = fallback;
                }
            }
            out
        };
        Self {
            red: row(self.red, [1.0, 0.0, 0.0]),
            green: row(self.green, [0.0, 1.0, 0.0]),
            blue: row(self.blue, [0.0, 0.0, 1.0]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatermarkCorner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// An uploaded watermark overlay image (RGBA8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl WatermarkImage {
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgba.len() == self.width as usize * self.height as usize * 4
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkParams {
    pub enabled: bool,
    pub opacity: f32,
    pub corner: WatermarkCorner,
    /// Fraction of the frame's shorter edge the watermark occupies
    pub scale: f32,
    pub image: Option<WatermarkImage>,
}

impl Default for WatermarkParams {
    fn default() -> Self {
        Self {
            enabled: false,
            opacity: 1.0,
            corner: WatermarkCorner::BottomRight,
            scale: 0.2,
            image: None,
        }
    }
}

impl WatermarkParams {
    pub fn is_active(&self) -> bool {
        self.enabled && self.opacity != 0.0 && self.image.is_some()
    }

    pub fn sanitized(self) -> Self {
        Self {
            enabled: self.enabled,
            opacity: sanitize_unit(self.opacity, 1.0),
            corner: self.corner,
            scale: sanitize_divisor(self.scale, 0.2),
            image: self.image.filter(WatermarkImage::is_well_formed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BloomParams {
    pub enabled: bool,
    pub amount: f32,
    pub radius: f32,
    pub threshold: f32,
}

impl Default for BloomParams {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 0.0,
            radius: 4.0,
            threshold: 0.8,
        }
    }
}

impl BloomParams {
    pub fn is_active(&self) -> bool {
        self.enabled && self.amount != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            enabled: self.enabled,
            amount: sanitize_scalar(self.amount),
            radius: sanitize_divisor(self.radius, 4.0),
            threshold: sanitize_scalar(self.threshold),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PosterizeParams {
    /// Quantization level count; divides the color range, < 2.0 disables
    pub levels: f32,
}

impl Default for PosterizeParams {
    fn default() -> Self {
        Self { levels: 0.0 }
    }
}

impl PosterizeParams {
    pub fn is_active(&self) -> bool {
        self.levels >= 2.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            levels: sanitize_scalar(self.levels),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BorderParams {
    /// Border width as a fraction of the shorter frame edge
    pub size: f32,
    /// sRGB bytes, straight alpha
    pub color: [u8; 4],
}

impl Default for BorderParams {
    fn default() -> Self {
        Self {
            size: 0.0,
            color: [255, 255, 255, 255],
        }
    }
}

impl BorderParams {
    pub fn is_active(&self) -> bool {
        self.size > 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            size: sanitize_scalar(self.size).max(0.0),
            color: self.color,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskOverlayParams {
    pub enabled: bool,
    pub color: [f32; 4],
}

impl Default for MaskOverlayParams {
    fn default() -> Self {
        Self {
            enabled: false,
            color: [1.0, 0.0, 0.0, 0.5],
        }
    }
}

impl MaskOverlayParams {
    pub fn is_active(&self) -> bool {
        self.enabled && self.color[3] != 0.0
    }

    pub fn sanitized(self) -> Self {
        Self {
            enabled: self.enabled,
            color: self.color.map(sanitize_scalar),
        }
    }
}
