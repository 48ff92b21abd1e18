//! The opaque graphics device consumed by the pipeline.
//!
//! Everything below the uniform/resource/draw/readback surface (shader
//! compilation, binding tables, surface management) lives behind this trait
//! and is out of scope for the synchronization core.

use render_protocol::{ColorPrimaries, PixelBlock, ReadbackRect, TransferFunction};
use thiserror::Error;

use crate::dirty::EffectGroup;

/// Uniform destinations. One slot per effect group plus the shared
/// edge-aware detail filter scratch driven by clarity and denoise together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformSlot {
    Group(EffectGroup),
    DetailScratch,
}

/// Texture-backed resource destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceSlot {
    ToneCurveLut,
    LutCube,
    WatermarkImage,
}

impl ResourceSlot {
    pub const ALL: [ResourceSlot; 3] = [
        ResourceSlot::ToneCurveLut,
        ResourceSlot::LutCube,
        ResourceSlot::WatermarkImage,
    ];
}

/// Borrowed content for a resource upload.
#[derive(Debug, PartialEq)]
pub enum ResourceContent<'a> {
    CurveLut(&'a [f32]),
    LutCube { size: u32, rgb: &'a [f32] },
    WatermarkImage { width: u32, height: u32, rgba: &'a [u8] },
}

/// What to do with a resource slot during flush.
#[derive(Debug, PartialEq)]
pub enum ResourceBinding<'a> {
    /// Re-point the slot's sampler/binding at its current content (or the
    /// empty placeholder). Issued for every slot on every flush: a binding
    /// left on a stale resource type corrupts the device's binding table.
    Rebind,
    /// Upload fresh content, then bind it.
    Upload(ResourceContent<'a>),
    /// Drop the slot's content and bind the empty placeholder.
    Clear,
}

/// Asynchronous device-side mode changes, independent of any request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextEvent {
    Lost,
    Restored,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("rendering context is lost")]
    ContextLost,
    #[error("device rejected operation: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Largest frame edge the device accepts.
    pub max_dimension: u32,
    pub hdr_surface: bool,
    pub float_readback: bool,
}

/// Borrowed view of a frame handed to `Device::draw`.
#[derive(Debug)]
pub struct DrawFrame<'a> {
    pub block: &'a PixelBlock,
    /// Present for HDR frames only.
    pub colorimetry: Option<FrameColorimetry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameColorimetry {
    pub channels: u8,
    pub transfer_fn: Option<TransferFunction>,
    pub primaries: Option<ColorPrimaries>,
}

/// The capability surface the pipeline and dispatcher drive.
///
/// Uniform and resource binds are infallible by contract: a device that can
/// fail a bind must latch the failure and surface it from the next `draw` or
/// `readback`, so the diffing engine itself never raises.
pub trait Device {
    fn capabilities(&self) -> DeviceCapabilities;

    fn bind_uniform(&mut self, slot: UniformSlot, values: &[f32]);

    fn bind_resource(&mut self, slot: ResourceSlot, binding: ResourceBinding<'_>);

    fn resize(&mut self, width: u32, height: u32);

    fn clear(&mut self, rgba: [f32; 4]);

    fn draw(&mut self, frame: DrawFrame<'_>) -> Result<(), DeviceError>;

    /// `Ok(None)` when the rect contains no readable pixels.
    fn readback(&mut self, rect: ReadbackRect) -> Result<Option<PixelBlock>, DeviceError>;

    /// Drain one pending asynchronous context transition, if any.
    fn poll_context_event(&mut self) -> Option<ContextEvent>;
}
