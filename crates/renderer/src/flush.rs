//! Dirty-group flush: push current values to the device, in order, once.

use model::{ClarityParams, DenoiseParams, ToneMappingOperator, WatermarkCorner};

use crate::device::{Device, ResourceBinding, ResourceContent, ResourceSlot, UniformSlot};
use crate::dirty::{EffectGroup, GroupSet, ResourceContentSet, FLUSH_ORDER};
use crate::GradePipeline;

fn flag(on: bool) -> f32 {
    if on { 1.0 } else { 0.0 }
}

fn operator_index(operator: ToneMappingOperator) -> f32 {
    match operator {
        ToneMappingOperator::Off => 0.0,
        ToneMappingOperator::Reinhard => 1.0,
        ToneMappingOperator::Filmic => 2.0,
        ToneMappingOperator::Aces => 3.0,
    }
}

fn corner_index(corner: WatermarkCorner) -> f32 {
    match corner {
        WatermarkCorner::TopLeft => 0.0,
        WatermarkCorner::TopRight => 1.0,
        WatermarkCorner::BottomLeft => 2.0,
        WatermarkCorner::BottomRight => 3.0,
    }
}

/// Scratch parameters for the shared edge-aware detail filter, sized for the
/// strongest of its two consumers.
fn detail_scratch_uniforms(clarity: &ClarityParams, denoise: &DenoiseParams) -> [f32; 3] {
    let clarity_radius = if clarity.is_active() {
        4.0 + clarity.amount.abs() / 100.0 * 16.0
    } else {
        0.0
    };
    let denoise_radius = if denoise.is_active() {
        4.0 + denoise.luminance.max(denoise.chroma) * 24.0
    } else {
        0.0
    };
    let radius = clarity_radius.max(denoise_radius);
    let edge_sigma = 0.1 + 0.4 * denoise.luminance.clamp(0.0, 1.0);
    [flag(radius > 0.0), radius, edge_sigma]
}

impl GradePipeline {
    /// Push every dirty group's current values to the device in
    /// `FLUSH_ORDER`, then clear both dirty sets.
    ///
    /// Resource-bound groups upload content only when their content flag is
    /// set; afterwards bindings for ALL resource slots are re-issued whether
    /// dirty or not, the one documented exception to "only touch dirty
    /// groups" (see `ResourceBinding::Rebind`).
    pub fn flush(&mut self, device: &mut dyn Device) {
        let scratch_dirty = self
            .dirty_groups()
            .intersects(GroupSet::CLARITY | GroupSet::DENOISE);

        for group in FLUSH_ORDER {
            if self.dirty_groups().contains(group.bit()) {
                self.push_group(group, device);
            }
            // The shared scratch rides at the clarity position: denoise
            // values are settled by then, per the FLUSH_ORDER contract.
            if group == EffectGroup::Clarity && scratch_dirty {
                let state = self.state();
                device.bind_uniform(
                    UniformSlot::DetailScratch,
                    &detail_scratch_uniforms(&state.clarity, &state.denoise),
                );
            }
        }

        for slot in ResourceSlot::ALL {
            device.bind_resource(slot, ResourceBinding::Rebind);
        }

        self.clear_dirty();
    }

    fn push_group(&self, group: EffectGroup, device: &mut dyn Device) {
        let slot = UniformSlot::Group(group);
        let state = self.state();
        match group {
            EffectGroup::Orientation => {
                let d = state.orientation.derived();
                device.bind_uniform(
                    slot,
                    &[
                        d.quarter_turns as f32,
                        flag(d.flip_horizontal),
                        flag(d.flip_vertical),
                    ],
                );
            }
            EffectGroup::LensDistortion => {
                let p = state.lens_distortion;
                device.bind_uniform(slot, &[flag(p.is_active()), p.amount, p.scale]);
            }
            EffectGroup::ChromaticAberration => {
                let p = state.chromatic_aberration;
                device.bind_uniform(slot, &[flag(p.is_active()), p.red_cyan, p.blue_yellow]);
            }
            EffectGroup::Exposure => {
                let p = state.exposure;
                device.bind_uniform(slot, &[flag(p.is_active()), p.ev, p.black_level]);
            }
            EffectGroup::WhiteBalance => {
                let p = state.white_balance;
                device.bind_uniform(slot, &[flag(p.is_active()), p.temperature, p.tint]);
            }
            EffectGroup::Levels => {
                let p = state.levels;
                device.bind_uniform(
                    slot,
                    &[
                        flag(p.is_active()),
                        p.input_black,
                        p.input_white,
                        p.gamma,
                        p.output_black,
                        p.output_white,
                    ],
                );
            }
            EffectGroup::Contrast => {
                let p = state.contrast;
                device.bind_uniform(slot, &[flag(p.is_active()), p.amount, p.pivot]);
            }
            EffectGroup::TonalRange => {
                let p = state.tonal_range;
                device.bind_uniform(
                    slot,
                    &[
                        flag(p.is_active()),
                        p.highlights,
                        p.shadows,
                        p.whites,
                        p.blacks,
                    ],
                );
            }
            EffectGroup::ToneCurve => {
                let p = &state.tone_curve;
                device.bind_uniform(slot, &[flag(p.is_active())]);
                if self
                    .dirty_resources()
                    .contains(ResourceContentSet::TONE_CURVE_LUT)
                {
                    let lut = p.rasterize();
                    device.bind_resource(
                        ResourceSlot::ToneCurveLut,
                        ResourceBinding::Upload(ResourceContent::CurveLut(&lut)),
                    );
                }
            }
            EffectGroup::Saturation => {
                let p = state.saturation;
                device.bind_uniform(slot, &[flag(p.is_active()), p.saturation, p.vibrance]);
            }
            EffectGroup::HslMixer => {
                let p = state.hsl_mixer;
                let mut values = [0.0f32; 25];
                values[0] = flag(p.is_active());
                values[1..9].copy_from_slice(&p.hue_shift);
                values[9..17].copy_from_slice(&p.saturation_scale);
                values[17..25].copy_from_slice(&p.luminance_scale);
                device.bind_uniform(slot, &values);
            }
            EffectGroup::ChannelMixer => {
                let p = state.channel_mixer;
                let mut values = [0.0f32; 10];
                values[0] = flag(p.is_active());
                values[1..4].copy_from_slice(&p.red);
                values[4..7].copy_from_slice(&p.green);
                values[7..10].copy_from_slice(&p.blue);
                device.bind_uniform(slot, &values);
            }
            EffectGroup::Cdl => {
                let p = state.cdl;
                let mut values = [0.0f32; 11];
                values[0] = flag(p.is_active());
                values[1..4].copy_from_slice(&p.slope);
                values[4..7].copy_from_slice(&p.offset);
                values[7..10].copy_from_slice(&p.power);
                values[10] = p.saturation;
                device.bind_uniform(slot, &values);
            }
            EffectGroup::ColorWheels => {
                let p = state.color_wheels;
                let mut values = [0.0f32; 10];
                values[0] = flag(p.is_active());
                values[1..4].copy_from_slice(&p.lift);
                values[4..7].copy_from_slice(&p.gamma);
                values[7..10].copy_from_slice(&p.gain);
                device.bind_uniform(slot, &values);
            }
            EffectGroup::SplitToning => {
                let p = state.split_toning;
                device.bind_uniform(
                    slot,
                    &[
                        flag(p.is_active()),
                        p.shadow_hue,
                        p.shadow_saturation,
                        p.highlight_hue,
                        p.highlight_saturation,
                        p.balance,
                    ],
                );
            }
            EffectGroup::Denoise => {
                let p = state.denoise;
                device.bind_uniform(slot, &[flag(p.is_active()), p.luminance, p.chroma]);
            }
            EffectGroup::Clarity => {
                let p = state.clarity;
                device.bind_uniform(slot, &[flag(p.is_active()), p.amount]);
            }
            EffectGroup::Texture => {
                let p = state.texture;
                device.bind_uniform(slot, &[flag(p.is_active()), p.amount]);
            }
            EffectGroup::Dehaze => {
                let p = state.dehaze;
                device.bind_uniform(slot, &[flag(p.is_active()), p.amount]);
            }
            EffectGroup::Sharpen => {
                let p = state.sharpen;
                device.bind_uniform(
                    slot,
                    &[flag(p.is_active()), p.amount, p.radius, p.threshold],
                );
            }
            EffectGroup::ToneMapping => {
                let p = state.tone_mapping;
                device.bind_uniform(
                    slot,
                    &[flag(p.is_active()), operator_index(p.operator), p.intensity],
                );
            }
            EffectGroup::Lut => {
                let p = &state.lut;
                device.bind_uniform(slot, &[flag(p.is_active()), p.strength]);
                if self.dirty_resources().contains(ResourceContentSet::LUT_CUBE) {
                    match &p.cube {
                        Some(cube) => device.bind_resource(
                            ResourceSlot::LutCube,
                            ResourceBinding::Upload(ResourceContent::LutCube {
                                size: cube.size,
                                rgb: &cube.rgb,
                            }),
                        ),
                        None => device.bind_resource(ResourceSlot::LutCube, ResourceBinding::Clear),
                    }
                }
            }
            EffectGroup::Posterize => {
                let p = state.posterize;
                device.bind_uniform(slot, &[flag(p.is_active()), p.levels]);
            }
            EffectGroup::Bloom => {
                let p = state.bloom;
                device.bind_uniform(
                    slot,
                    &[flag(p.is_active()), p.amount, p.radius, p.threshold],
                );
            }
            EffectGroup::Grain => {
                let p = state.grain;
                device.bind_uniform(slot, &[flag(p.is_active()), p.amount, p.size, p.roughness]);
            }
            EffectGroup::Vignette => {
                let p = state.vignette;
                device.bind_uniform(
                    slot,
                    &[
                        flag(p.is_active()),
                        p.amount,
                        p.midpoint,
                        p.roundness,
                        p.feather,
                    ],
                );
            }
            EffectGroup::Border => {
                let p = state.border;
                let color = p.color.map(|c| c as f32 / 255.0);
                device.bind_uniform(
                    slot,
                    &[
                        flag(p.is_active()),
                        p.size,
                        color[0],
                        color[1],
                        color[2],
                        color[3],
                    ],
                );
            }
            EffectGroup::Watermark => {
                let p = &state.watermark;
                device.bind_uniform(
                    slot,
                    &[
                        flag(p.is_active()),
                        p.opacity,
                        corner_index(p.corner),
                        p.scale,
                    ],
                );
                if self
                    .dirty_resources()
                    .contains(ResourceContentSet::WATERMARK_IMAGE)
                {
                    match &p.image {
                        Some(image) => device.bind_resource(
                            ResourceSlot::WatermarkImage,
                            ResourceBinding::Upload(ResourceContent::WatermarkImage {
                                width: image.width,
                                height: image.height,
                                rgba: &image.rgba,
                            }),
                        ),
                        None => device
                            .bind_resource(ResourceSlot::WatermarkImage, ResourceBinding::Clear),
                    }
                }
            }
            EffectGroup::MaskOverlay => {
                let p = state.mask_overlay;
                device.bind_uniform(
                    slot,
                    &[
                        flag(p.is_active()),
                        p.color[0],
                        p.color[1],
                        p.color[2],
                        p.color[3],
                    ],
                );
            }
            EffectGroup::Background => {
                let d = state.background.derived();
                let mut values = [0.0f32; 10];
                values[0] = flag(d.checker);
                values[1] = d.checker_size;
                values[2..6].copy_from_slice(&d.color_a);
                values[6..10].copy_from_slice(&d.color_b);
                device.bind_uniform(slot, &values);
            }
        }
    }
}
