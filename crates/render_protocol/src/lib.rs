//! Session message protocol.
//!
//! Messages form a tagged union with two families: directives (no reply
//! expected) and requests (caller-assigned id, exactly one reply bearing the
//! same id). The id is an explicit `Option` at the union level: a message
//! either correlates a reply or it does not; there is no third shape.
//!
//! Both directions are FIFO: messages sent by one side arrive at the other
//! in send order, without reordering or duplication. Buffers attached to
//! frames and pixel replies are moved across the boundary, never copied.

use model::{
    BackgroundParams, BloomParams, BorderParams, CdlParams, ChannelMixerParams,
    ChromaticAberrationParams, ClarityParams, ColorWheelsParams, ContrastParams, DehazeParams,
    DenoiseParams, ExposureParams, GradeDelta, GrainParams, HslMixerParams, LensDistortionParams,
    LevelsParams, LutParams, MaskOverlayParams, OrientationParams, PosterizeParams,
    SaturationParams, SharpenParams, SplitToningParams, TextureParams, TonalRangeParams,
    ToneCurveParams, ToneMappingParams, VignetteParams, WatermarkParams, WhiteBalanceParams,
};
use thiserror::Error;

/// Wire protocol revision. Bumped on any incompatible message change.
pub const PROTOCOL_VERSION: u16 = 1;

/// Correlates a request with its reply. Monotonically increasing, unique for
/// the session lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Every message travels wrapped in an envelope carrying an optional
/// protocol-version stamp so either side can reject an incompatible peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub version: Option<u16>,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn stamped(payload: T) -> Self {
        Self {
            version: Some(PROTOCOL_VERSION),
            payload,
        }
    }

    /// An unstamped envelope is accepted; the stamp is optional.
    pub fn is_version_compatible(&self) -> bool {
        match self.version {
            None => true,
            Some(version) => version == PROTOCOL_VERSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Rgba16Float,
    Rgba32Float,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgba16Float => 8,
            PixelFormat::Rgba32Float => 16,
        }
    }
}

/// An owned block of pixel data. Moving it through a channel transfers
/// ownership to the other side; dropping it releases the memory. Deliberately
/// not `Clone`: a block crosses the boundary by move, never by copy.
#[derive(Debug, PartialEq)]
pub struct PixelBlock {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub bytes: Box<[u8]>,
}

impl PixelBlock {
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.bytes.len() == self.expected_len()
    }
}

/// Electro-optical transfer function of an HDR frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFunction {
    Linear,
    Srgb,
    Pq,
    Hlg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorPrimaries {
    Srgb,
    DisplayP3,
    Rec2020,
}

#[derive(Debug, PartialEq)]
pub struct FrameInput {
    pub block: PixelBlock,
}

#[derive(Debug, PartialEq)]
pub struct HdrFrameInput {
    /// Float pixel data; the format field of the block states the data type.
    pub block: PixelBlock,
    /// Interleaved channel count of the source (3 or 4).
    pub channels: u8,
    pub transfer_fn: Option<TransferFunction>,
    pub primaries: Option<ColorPrimaries>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadbackRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Capabilities the caller requires from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionCapabilities {
    pub require_hdr_surface: bool,
    pub require_float_readback: bool,
}

/// Display mode the execution side settled on during init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Sdr,
    Hdr,
}

/// A single-group state delta, dispatched straight to the matching setter.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupUpdate {
    Exposure(ExposureParams),
    WhiteBalance(WhiteBalanceParams),
    Contrast(ContrastParams),
    Saturation(SaturationParams),
    TonalRange(TonalRangeParams),
    ToneCurve(ToneCurveParams),
    HslMixer(HslMixerParams),
    Cdl(CdlParams),
    ColorWheels(ColorWheelsParams),
    Clarity(ClarityParams),
    Texture(TextureParams),
    Dehaze(DehazeParams),
    Sharpen(SharpenParams),
    Denoise(DenoiseParams),
    Vignette(VignetteParams),
    Grain(GrainParams),
    ChromaticAberration(ChromaticAberrationParams),
    LensDistortion(LensDistortionParams),
    Orientation(OrientationParams),
    ToneMapping(ToneMappingParams),
    Lut(LutParams),
    Background(BackgroundParams),
    SplitToning(SplitToningParams),
    Levels(LevelsParams),
    ChannelMixer(ChannelMixerParams),
    Watermark(WatermarkParams),
    Bloom(BloomParams),
    Posterize(PosterizeParams),
    Border(BorderParams),
    MaskOverlay(MaskOverlayParams),
}

/// Fire-and-forget messages: no reply ever follows.
#[derive(Debug, PartialEq)]
pub enum Directive {
    Init { capabilities: SessionCapabilities },
    Resize { width: u32, height: u32 },
    Clear { rgba: [f32; 4] },
    Update(GroupUpdate),
    SyncState(Box<GradeDelta>),
    Dispose,
}

/// Correlated operations: exactly one reply follows, echoing the id.
#[derive(Debug, PartialEq)]
pub enum Request {
    RenderFrame(FrameInput),
    RenderHdrFrame(HdrFrameInput),
    ReadPixels(ReadbackRect),
}

/// Caller → execution.
#[derive(Debug, PartialEq)]
pub enum ClientMessage {
    Directive(Directive),
    Request { id: RequestId, request: Request },
}

impl ClientMessage {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            ClientMessage::Directive(_) => None,
            ClientMessage::Request { id, .. } => Some(*id),
        }
    }
}

/// Successful request outcome.
#[derive(Debug, PartialEq)]
pub enum Reply {
    FrameRendered,
    /// `None` when the requested rect had no readable pixels.
    Pixels(Option<PixelBlock>),
}

/// Why a single request failed. Scoped to that request only; other pending
/// requests are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestFailure {
    #[error("session is not initialized")]
    NotInitialized,
    #[error("rendering context is lost")]
    ContextLost,
    #[error("peer protocol version {peer} is incompatible with {expected}")]
    VersionMismatch { peer: u16, expected: u16 },
    #[error("frame input rejected: {0}")]
    MalformedFrame(String),
    #[error("device error: {0}")]
    Device(String),
}

/// Why initialization failed. Fatal to the session; not retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("peer protocol version {peer} is incompatible with {expected}")]
    VersionMismatch { peer: u16, expected: u16 },
    #[error("required capabilities unsupported: {0}")]
    CapabilitiesUnsupported(String),
}

/// Execution → caller.
#[derive(Debug, PartialEq)]
pub enum SessionEvent {
    /// The dispatch loop is up and consuming messages.
    Ready,
    InitResult(Result<DisplayMode, InitError>),
    Reply {
        id: RequestId,
        result: Result<Reply, RequestFailure>,
    },
    /// Broadcast, uncorrelated: the rendering context went away.
    ContextLost,
    ContextRestored,
}

impl SessionEvent {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            SessionEvent::Reply { id, .. } => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamped_envelope_is_compatible_and_foreign_version_is_not() {
        let stamped = Envelope::stamped(SessionEvent::Ready);
        assert_eq!(stamped.version, Some(PROTOCOL_VERSION));
        assert!(stamped.is_version_compatible());

        let foreign = Envelope {
            version: Some(PROTOCOL_VERSION + 1),
            payload: SessionEvent::Ready,
        };
        assert!(!foreign.is_version_compatible());

        let unstamped = Envelope {
            version: None,
            payload: SessionEvent::Ready,
        };
        assert!(unstamped.is_version_compatible());
    }

    #[test]
    fn directives_carry_no_request_id() {
        let directive = ClientMessage::Directive(Directive::Resize {
            width: 640,
            height: 480,
        });
        assert_eq!(directive.request_id(), None);

        let request = ClientMessage::Request {
            id: RequestId(9),
            request: Request::ReadPixels(ReadbackRect {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            }),
        };
        assert_eq!(request.request_id(), Some(RequestId(9)));
    }

    #[test]
    fn pixel_block_length_validation() {
        let block = PixelBlock {
            width: 2,
            height: 2,
            format: PixelFormat::Rgba8,
            bytes: vec![0; 16].into_boxed_slice(),
        };
        assert!(block.is_well_formed());

        let truncated = PixelBlock {
            bytes: vec![0; 15].into_boxed_slice(),
            ..block
        };
        assert!(!truncated.is_well_formed());

        let hdr = PixelBlock {
            width: 2,
            height: 1,
            format: PixelFormat::Rgba32Float,
            bytes: vec![0; 32].into_boxed_slice(),
        };
        assert!(hdr.is_well_formed());
    }
}
