//! Grade diffing engine.
//!
//! `GradePipeline` owns one `GradeState` plus the dirty-group markers and is
//! the only thing that mutates either. Setters are the cheap path: store and
//! mark, no comparison. `apply_state` is the expensive path: field-wise
//! comparison per group, marking only real changes. `flush` pushes dirty
//! groups to the device in a fixed order and clears the markers.
//!
//! The engine performs no I/O and cannot fail; malformed numeric input is
//! sanitized on the way in so the device never sees it.

pub mod device;
pub mod dirty;
mod flush;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

use model::{
    BackgroundParams, BloomParams, BorderParams, CdlParams, ChannelMixerParams,
    ChromaticAberrationParams, ClarityParams, ColorWheelsParams, ContrastParams, DehazeParams,
    DenoiseParams, ExposureParams, GradeDelta, GradeState, GrainParams, HslMixerParams,
    LensDistortionParams, LevelsParams, LutParams, MaskOverlayParams, OrientationParams,
    PosterizeParams, SaturationParams, SharpenParams, SplitToningParams, TextureParams,
    TonalRangeParams, ToneCurveParams, ToneMappingParams, VignetteParams, WatermarkParams,
    WhiteBalanceParams,
};

pub use device::{
    ContextEvent, Device, DeviceCapabilities, DeviceError, DrawFrame, FrameColorimetry,
    ResourceBinding, ResourceContent, ResourceSlot, UniformSlot,
};
pub use dirty::{EffectGroup, GroupSet, ResourceContentSet, FLUSH_ORDER};

pub struct GradePipeline {
    state: GradeState,
    dirty: GroupSet,
    resource_dirty: ResourceContentSet,
}

impl GradePipeline {
    /// A fresh pipeline considers everything dirty so the first flush
    /// establishes the full default grade on the device.
    pub fn new() -> Self {
        Self {
            state: GradeState::default(),
            dirty: GroupSet::all(),
            resource_dirty: ResourceContentSet::all(),
        }
    }

    pub fn state(&self) -> &GradeState {
        &self.state
    }

    pub fn dirty_groups(&self) -> GroupSet {
        self.dirty
    }

    pub fn dirty_resources(&self) -> ResourceContentSet {
        self.resource_dirty
    }

    /// Restore defaults and mark everything dirty, as on session teardown.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = GroupSet::empty();
        self.resource_dirty = ResourceContentSet::empty();
    }

    pub fn set_exposure(&mut self, params: ExposureParams) {
        self.state.exposure = params.sanitized();
        self.dirty.insert(GroupSet::EXPOSURE);
    }

    pub fn set_white_balance(&mut self, params: WhiteBalanceParams) {
        self.state.white_balance = params.sanitized();
        self.dirty.insert(GroupSet::WHITE_BALANCE);
    }

    pub fn set_contrast(&mut self, params: ContrastParams) {
        self.state.contrast = params.sanitized();
        self.dirty.insert(GroupSet::CONTRAST);
    }

    pub fn set_saturation(&mut self, params: SaturationParams) {
        self.state.saturation = params.sanitized();
        self.dirty.insert(GroupSet::SATURATION);
    }

    pub fn set_tonal_range(&mut self, params: TonalRangeParams) {
        self.state.tonal_range = params.sanitized();
        self.dirty.insert(GroupSet::TONAL_RANGE);
    }

    pub fn set_tone_curve(&mut self, params: ToneCurveParams) {
        let params = params.sanitized();
        if params.points != self.state.tone_curve.points {
            self.resource_dirty.insert(ResourceContentSet::TONE_CURVE_LUT);
        }
        self.state.tone_curve = params;
        self.dirty.insert(GroupSet::TONE_CURVE);
    }

    pub fn set_hsl_mixer(&mut self, params: HslMixerParams) {
        self.state.hsl_mixer = params.sanitized();
        self.dirty.insert(GroupSet::HSL_MIXER);
    }

    pub fn set_cdl(&mut self, params: CdlParams) {
        self.state.cdl = params.sanitized();
        self.dirty.insert(GroupSet::CDL);
    }

    pub fn set_color_wheels(&mut self, params: ColorWheelsParams) {
        self.state.color_wheels = params.sanitized();
        self.dirty.insert(GroupSet::COLOR_WHEELS);
    }

    pub fn set_clarity(&mut self, params: ClarityParams) {
        self.state.clarity = params.sanitized();
        self.dirty.insert(GroupSet::CLARITY);
    }

    pub fn set_texture(&mut self, params: TextureParams) {
        self.state.texture = params.sanitized();
        self.dirty.insert(GroupSet::TEXTURE);
    }

    pub fn set_dehaze(&mut self, params: DehazeParams) {
        self.state.dehaze = params.sanitized();
        self.dirty.insert(GroupSet::DEHAZE);
    }

    pub fn set_sharpen(&mut self, params: SharpenParams) {
        self.state.sharpen = params.sanitized();
        self.dirty.insert(GroupSet::SHARPEN);
    }

    pub fn set_denoise(&mut self, params: DenoiseParams) {
        self.state.denoise = params.sanitized();
        self.dirty.insert(GroupSet::DENOISE);
    }

    pub fn set_vignette(&mut self, params: VignetteParams) {
        self.state.vignette = params.sanitized();
        self.dirty.insert(GroupSet::VIGNETTE);
    }

    pub fn set_grain(&mut self, params: GrainParams) {
        self.state.grain = params.sanitized();
        self.dirty.insert(GroupSet::GRAIN);
    }

    pub fn set_chromatic_aberration(&mut self, params: ChromaticAberrationParams) {
        self.state.chromatic_aberration = params.sanitized();
        self.dirty.insert(GroupSet::CHROMATIC_ABERRATION);
    }

    pub fn set_lens_distortion(&mut self, params: LensDistortionParams) {
        self.state.lens_distortion = params.sanitized();
        self.dirty.insert(GroupSet::LENS_DISTORTION);
    }

    pub fn set_orientation(&mut self, params: OrientationParams) {
        self.state.orientation = params.sanitized();
        self.dirty.insert(GroupSet::ORIENTATION);
    }

    pub fn set_tone_mapping(&mut self, params: ToneMappingParams) {
        self.state.tone_mapping = params.sanitized();
        self.dirty.insert(GroupSet::TONE_MAPPING);
    }

    pub fn set_lut(&mut self, params: LutParams) {
        let params = params.sanitized();
        if params.cube != self.state.lut.cube {
            self.resource_dirty.insert(ResourceContentSet::LUT_CUBE);
        }
        self.state.lut = params;
        self.dirty.insert(GroupSet::LUT);
    }

    pub fn set_background(&mut self, params: BackgroundParams) {
        self.state.background = params.sanitized();
        self.dirty.insert(GroupSet::BACKGROUND);
    }

    pub fn set_split_toning(&mut self, params: SplitToningParams) {
        self.state.split_toning = params.sanitized();
        self.dirty.insert(GroupSet::SPLIT_TONING);
    }

    pub fn set_levels(&mut self, params: LevelsParams) {
        self.state.levels = params.sanitized();
        self.dirty.insert(GroupSet::LEVELS);
    }

    pub fn set_channel_mixer(&mut self, params: ChannelMixerParams) {
        self.state.channel_mixer = params.sanitized();
        self.dirty.insert(GroupSet::CHANNEL_MIXER);
    }

    pub fn set_watermark(&mut self, params: WatermarkParams) {
        let params = params.sanitized();
        if params.image != self.state.watermark.image {
            self.resource_dirty.insert(ResourceContentSet::WATERMARK_IMAGE);
        }
        self.state.watermark = params;
        self.dirty.insert(GroupSet::WATERMARK);
    }

    pub fn set_bloom(&mut self, params: BloomParams) {
        self.state.bloom = params.sanitized();
        self.dirty.insert(GroupSet::BLOOM);
    }

    pub fn set_posterize(&mut self, params: PosterizeParams) {
        self.state.posterize = params.sanitized();
        self.dirty.insert(GroupSet::POSTERIZE);
    }

    pub fn set_border(&mut self, params: BorderParams) {
        self.state.border = params.sanitized();
        self.dirty.insert(GroupSet::BORDER);
    }

    pub fn set_mask_overlay(&mut self, params: MaskOverlayParams) {
        self.state.mask_overlay = params.sanitized();
        self.dirty.insert(GroupSet::MASK_OVERLAY);
    }

    /// Apply a snapshot, marking only the groups whose stored value actually
    /// changes. Incoming values are sanitized before comparison so that a
    /// malformed input never registers as an endless difference.
    ///
    /// Groups with derived device-facing semantics (orientation, background)
    /// compare the post-update derived value, not the raw input: two inputs
    /// with the same observable effect leave the group clean.
    pub fn apply_state(&mut self, delta: &GradeDelta) {
        if let Some(params) = delta.exposure {
            let params = params.sanitized();
            if params != self.state.exposure {
                self.set_exposure(params);
            }
        }
        if let Some(params) = delta.white_balance {
            let params = params.sanitized();
            if params != self.state.white_balance {
                self.set_white_balance(params);
            }
        }
        if let Some(params) = delta.contrast {
            let params = params.sanitized();
            if params != self.state.contrast {
                self.set_contrast(params);
            }
        }
        if let Some(params) = delta.saturation {
            let params = params.sanitized();
            if params != self.state.saturation {
                self.set_saturation(params);
            }
        }
        if let Some(params) = delta.tonal_range {
            let params = params.sanitized();
            if params != self.state.tonal_range {
                self.set_tonal_range(params);
            }
        }
        if let Some(params) = &delta.tone_curve {
            let params = params.clone().sanitized();
            if params != self.state.tone_curve {
                self.set_tone_curve(params);
            }
        }
        if let Some(params) = delta.hsl_mixer {
            let params = params.sanitized();
            if params != self.state.hsl_mixer {
                self.set_hsl_mixer(params);
            }
        }
        if let Some(params) = delta.cdl {
            let params = params.sanitized();
            if params != self.state.cdl {
                self.set_cdl(params);
            }
        }
        if let Some(params) = delta.color_wheels {
            let params = params.sanitized();
            if params != self.state.color_wheels {
                self.set_color_wheels(params);
            }
        }
        if let Some(params) = delta.clarity {
            let params = params.sanitized();
            if params != self.state.clarity {
                self.set_clarity(params);
            }
        }
        if let Some(params) = delta.texture {
            let params = params.sanitized();
            if params != self.state.texture {
                self.set_texture(params);
            }
        }
        if let Some(params) = delta.dehaze {
            let params = params.sanitized();
            if params != self.state.dehaze {
                self.set_dehaze(params);
            }
        }
        if let Some(params) = delta.sharpen {
            let params = params.sanitized();
            if params != self.state.sharpen {
                self.set_sharpen(params);
            }
        }
        if let Some(params) = delta.denoise {
            let params = params.sanitized();
            if params != self.state.denoise {
                self.set_denoise(params);
            }
        }
        if let Some(params) = delta.vignette {
            let params = params.sanitized();
            if params != self.state.vignette {
                self.set_vignette(params);
            }
        }
        if let Some(params) = delta.grain {
            let params = params.sanitized();
            if params != self.state.grain {
                self.set_grain(params);
            }
        }
        if let Some(params) = delta.chromatic_aberration {
            let params = params.sanitized();
            if params != self.state.chromatic_aberration {
                self.set_chromatic_aberration(params);
            }
        }
        if let Some(params) = delta.lens_distortion {
            let params = params.sanitized();
            if params != self.state.lens_distortion {
                self.set_lens_distortion(params);
            }
        }
        if let Some(params) = delta.orientation {
            let params = params.sanitized();
            if params.derived() != self.state.orientation.derived() {
                self.set_orientation(params);
            }
        }
        if let Some(params) = delta.tone_mapping {
            let params = params.sanitized();
            if params != self.state.tone_mapping {
                self.set_tone_mapping(params);
            }
        }
        if let Some(params) = &delta.lut {
            let params = params.clone().sanitized();
            if params != self.state.lut {
                self.set_lut(params);
            }
        }
        if let Some(params) = delta.background {
            let params = params.sanitized();
            if params.derived() != self.state.background.derived() {
                self.set_background(params);
            }
        }
        if let Some(params) = delta.split_toning {
            let params = params.sanitized();
            if params != self.state.split_toning {
                self.set_split_toning(params);
            }
        }
        if let Some(params) = delta.levels {
            let params = params.sanitized();
            if params != self.state.levels {
                self.set_levels(params);
            }
        }
        if let Some(params) = delta.channel_mixer {
            let params = params.sanitized();
            if params != self.state.channel_mixer {
                self.set_channel_mixer(params);
            }
        }
        if let Some(params) = &delta.watermark {
            let params = params.clone().sanitized();
            if params != self.state.watermark {
                self.set_watermark(params);
            }
        }
        if let Some(params) = delta.bloom {
            let params = params.sanitized();
            if params != self.state.bloom {
                self.set_bloom(params);
            }
        }
        if let Some(params) = delta.posterize {
            let params = params.sanitized();
            if params != self.state.posterize {
                self.set_posterize(params);
            }
        }
        if let Some(params) = delta.border {
            let params = params.sanitized();
            if params != self.state.border {
                self.set_border(params);
            }
        }
        if let Some(params) = delta.mask_overlay {
            let params = params.sanitized();
            if params != self.state.mask_overlay {
                self.set_mask_overlay(params);
            }
        }
    }
}

impl Default for GradePipeline {
    fn default() -> Self {
        Self::new()
    }
}
