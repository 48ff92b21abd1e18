//! Dirty-group tracking.
//!
//! One bit per effect group plus a secondary content set for the
//! resource-bound groups. Marking is idempotent; the sets only shrink via
//! flush or reset.

use bitflags::bitflags;

/// One independently toggleable unit of render state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectGroup {
    Exposure,
    WhiteBalance,
    Contrast,
    Saturation,
    TonalRange,
    ToneCurve,
    HslMixer,
    Cdl,
    ColorWheels,
    Clarity,
    Texture,
    Dehaze,
    Sharpen,
    Denoise,
    Vignette,
    Grain,
    ChromaticAberration,
    LensDistortion,
    Orientation,
    ToneMapping,
    Lut,
    Background,
    SplitToning,
    Levels,
    ChannelMixer,
    Watermark,
    Bloom,
    Posterize,
    Border,
    MaskOverlay,
}

bitflags! {
    /// Set of groups whose device-facing values need a re-push.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GroupSet: u32 {
        const EXPOSURE = 1 << 0;
        const WHITE_BALANCE = 1 << 1;
        const CONTRAST = 1 << 2;
        const SATURATION = 1 << 3;
        const TONAL_RANGE = 1 << 4;
        const TONE_CURVE = 1 << 5;
        const HSL_MIXER = 1 << 6;
        const CDL = 1 << 7;
        const COLOR_WHEELS = 1 << 8;
        const CLARITY = 1 << 9;
        const TEXTURE = 1 << 10;
        const DEHAZE = 1 << 11;
        const SHARPEN = 1 << 12;
        const DENOISE = 1 << 13;
        const VIGNETTE = 1 << 14;
        const GRAIN = 1 << 15;
        const CHROMATIC_ABERRATION = 1 << 16;
        const LENS_DISTORTION = 1 << 17;
        const ORIENTATION = 1 << 18;
        const TONE_MAPPING = 1 << 19;
        const LUT = 1 << 20;
        const BACKGROUND = 1 << 21;
        const SPLIT_TONING = 1 << 22;
        const LEVELS = 1 << 23;
        const CHANNEL_MIXER = 1 << 24;
        const WATERMARK = 1 << 25;
        const BLOOM = 1 << 26;
        const POSTERIZE = 1 << 27;
        const BORDER = 1 << 28;
        const MASK_OVERLAY = 1 << 29;
    }
}

bitflags! {
    /// Secondary dirtiness for resource-bound groups: set only when the
    /// uploaded content itself changed, not when just the toggle did.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResourceContentSet: u8 {
        const TONE_CURVE_LUT = 1 << 0;
        const LUT_CUBE = 1 << 1;
        const WATERMARK_IMAGE = 1 << 2;
    }
}

impl EffectGroup {
    pub const fn bit(self) -> GroupSet {
        match self {
            EffectGroup::Exposure => GroupSet::EXPOSURE,
            EffectGroup::WhiteBalance => GroupSet::WHITE_BALANCE,
            EffectGroup::Contrast => GroupSet::CONTRAST,
            EffectGroup::Saturation => GroupSet::SATURATION,
            EffectGroup::TonalRange => GroupSet::TONAL_RANGE,
            EffectGroup::ToneCurve => GroupSet::TONE_CURVE,
            EffectGroup::HslMixer => GroupSet::HSL_MIXER,
            EffectGroup::Cdl => GroupSet::CDL,
            EffectGroup::ColorWheels => GroupSet::COLOR_WHEELS,
            EffectGroup::Clarity => GroupSet::CLARITY,
            EffectGroup::Texture => GroupSet::TEXTURE,
            EffectGroup::Dehaze => GroupSet::DEHAZE,
            EffectGroup::Sharpen => GroupSet::SHARPEN,
            EffectGroup::Denoise => GroupSet::DENOISE,
            EffectGroup::Vignette => GroupSet::VIGNETTE,
            EffectGroup::Grain => GroupSet::GRAIN,
            EffectGroup::ChromaticAberration => GroupSet::CHROMATIC_ABERRATION,
            EffectGroup::LensDistortion => GroupSet::LENS_DISTORTION,
            EffectGroup::Orientation => GroupSet::ORIENTATION,
            EffectGroup::ToneMapping => GroupSet::TONE_MAPPING,
            EffectGroup::Lut => GroupSet::LUT,
            EffectGroup::Background => GroupSet::BACKGROUND,
            EffectGroup::SplitToning => GroupSet::SPLIT_TONING,
            EffectGroup::Levels => GroupSet::LEVELS,
            EffectGroup::ChannelMixer => GroupSet::CHANNEL_MIXER,
            EffectGroup::Watermark => GroupSet::WATERMARK,
            EffectGroup::Bloom => GroupSet::BLOOM,
            EffectGroup::Posterize => GroupSet::POSTERIZE,
            EffectGroup::Border => GroupSet::BORDER,
            EffectGroup::MaskOverlay => GroupSet::MASK_OVERLAY,
        }
    }
}

/// Order in which dirty groups are flushed to the device.
///
/// Mostly this mirrors the pass order of the pipeline, but one constraint is
/// load-bearing: `Denoise` must precede `Clarity`. Both drive the shared
/// edge-aware detail filter, and the scratch uniforms for that filter are
/// derived and pushed at the clarity position from both groups' current
/// values, so denoise values must already be settled by then.
pub const FLUSH_ORDER: [EffectGroup; 30] = [
    EffectGroup::Orientation,
    EffectGroup::LensDistortion,
    EffectGroup::ChromaticAberration,
    EffectGroup::Exposure,
    EffectGroup::WhiteBalance,
    EffectGroup::Levels,
    EffectGroup::Contrast,
    EffectGroup::TonalRange,
    EffectGroup::ToneCurve,
    EffectGroup::Saturation,
    EffectGroup::HslMixer,
    EffectGroup::ChannelMixer,
    EffectGroup::Cdl,
    EffectGroup::ColorWheels,
    EffectGroup::SplitToning,
    EffectGroup::Denoise,
    EffectGroup::Clarity,
    EffectGroup::Texture,
    EffectGroup::Dehaze,
    EffectGroup::Sharpen,
    EffectGroup::ToneMapping,
    EffectGroup::Lut,
    EffectGroup::Posterize,
    EffectGroup::Bloom,
    EffectGroup::Grain,
    EffectGroup::Vignette,
    EffectGroup::Border,
    EffectGroup::Watermark,
    EffectGroup::MaskOverlay,
    EffectGroup::Background,
];
