//! Execution-side runtime.
//!
//! `RenderDispatcher` owns the device and one grade pipeline and processes
//! messages strictly in arrival order on a single logical thread of control:
//! a message is handled fully before the next one is looked at, so device
//! state is never contended.

mod execution;

use render_protocol::{
    ClientMessage, Directive, DisplayMode, Envelope, GroupUpdate, HdrFrameInput, InitError, Reply,
    Request, RequestFailure, SessionCapabilities, SessionEvent, PROTOCOL_VERSION,
};
use renderer::{
    ContextEvent, Device, DeviceError, DrawFrame, FrameColorimetry, GradePipeline,
};
use smallvec::SmallVec;
use tracing::{debug, warn};

pub use execution::{run_dispatch_loop, spawn_session};

/// Events produced while handling one message. Two is the common ceiling
/// (`Ready` + `InitResult`); context transitions can add a couple more.
pub type EventBatch = SmallVec<[Envelope<SessionEvent>; 2]>;

/// Whether the dispatch loop keeps consuming after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchFlow {
    Continue,
    Shutdown,
}

pub struct RenderDispatcher<D: Device> {
    device: D,
    pipeline: GradePipeline,
    initialized: bool,
    context_lost: bool,
}

impl<D: Device> RenderDispatcher<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            pipeline: GradePipeline::new(),
            initialized: false,
            context_lost: false,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn pipeline(&self) -> &GradePipeline {
        &self.pipeline
    }

    /// Handle one message, appending any events to reply with. Returns
    /// whether the loop should keep running.
    pub fn handle_message(
        &mut self,
        envelope: Envelope<ClientMessage>,
        events: &mut EventBatch,
    ) -> DispatchFlow {
        // Context transitions are independent of any request; surface them
        // before the message so a request made after a loss is refused.
        self.drain_context_events(events);

        if !envelope.is_version_compatible() {
            return self.refuse_incompatible(envelope, events);
        }

        match envelope.payload {
            ClientMessage::Directive(directive) => self.handle_directive(directive, events),
            ClientMessage::Request { id, request } => {
                let result = self.execute_request(request);
                events.push(Envelope::stamped(SessionEvent::Reply { id, result }));
                DispatchFlow::Continue
            }
        }
    }

    fn refuse_incompatible(
        &mut self,
        envelope: Envelope<ClientMessage>,
        events: &mut EventBatch,
    ) -> DispatchFlow {
        let peer = envelope.version.unwrap_or(0);
        match envelope.payload {
            ClientMessage::Request { id, .. } => {
                events.push(Envelope::stamped(SessionEvent::Reply {
                    id,
                    result: Err(RequestFailure::VersionMismatch {
                        peer,
                        expected: PROTOCOL_VERSION,
                    }),
                }));
            }
            ClientMessage::Directive(Directive::Init { .. }) => {
                events.push(Envelope::stamped(SessionEvent::InitResult(Err(
                    InitError::VersionMismatch {
                        peer,
                        expected: PROTOCOL_VERSION,
                    },
                ))));
            }
            ClientMessage::Directive(directive) => {
                warn!(peer, ?directive, "dropping directive with incompatible protocol version");
            }
        }
        DispatchFlow::Continue
    }

    fn handle_directive(&mut self, directive: Directive, events: &mut EventBatch) -> DispatchFlow {
        match directive {
            Directive::Init { capabilities } => {
                events.push(Envelope::stamped(SessionEvent::Ready));
                events.push(Envelope::stamped(SessionEvent::InitResult(
                    self.initialize(capabilities),
                )));
            }
            Directive::Resize { width, height } => {
                self.device.resize(width, height);
            }
            Directive::Clear { rgba } => {
                self.device.clear(rgba);
            }
            Directive::Update(update) => {
                apply_group_update(&mut self.pipeline, update);
            }
            Directive::SyncState(delta) => {
                self.pipeline.apply_state(&delta);
            }
            Directive::Dispose => {
                debug!("dispose directive received; resetting grade state");
                self.pipeline.reset();
                return DispatchFlow::Shutdown;
            }
        }
        DispatchFlow::Continue
    }

    fn initialize(&mut self, capabilities: SessionCapabilities) -> Result<DisplayMode, InitError> {
        let device_caps = self.device.capabilities();
        if capabilities.require_hdr_surface && !device_caps.hdr_surface {
            return Err(InitError::CapabilitiesUnsupported(
                "HDR surface required but unavailable".to_string(),
            ));
        }
        if capabilities.require_float_readback && !device_caps.float_readback {
            return Err(InitError::CapabilitiesUnsupported(
                "float readback required but unavailable".to_string(),
            ));
        }
        self.initialized = true;
        Ok(if device_caps.hdr_surface {
            DisplayMode::Hdr
        } else {
            DisplayMode::Sdr
        })
    }

    fn execute_request(&mut self, request: Request) -> Result<Reply, RequestFailure> {
        if !self.initialized {
            return Err(RequestFailure::NotInitialized);
        }
        if self.context_lost {
            return Err(RequestFailure::ContextLost);
        }

        match request {
            Request::RenderFrame(frame) => {
                self.check_frame_block(&frame.block)?;
                self.pipeline.flush(&mut self.device);
                self.device
                    .draw(DrawFrame {
                        block: &frame.block,
                        colorimetry: None,
                    })
                    .map_err(map_device_error)?;
                Ok(Reply::FrameRendered)
            }
            Request::RenderHdrFrame(frame) => {
                self.check_hdr_frame(&frame)?;
                self.pipeline.flush(&mut self.device);
                self.device
                    .draw(DrawFrame {
                        block: &frame.block,
                        colorimetry: Some(FrameColorimetry {
                            channels: frame.channels,
                            transfer_fn: frame.transfer_fn,
                            primaries: frame.primaries,
                        }),
                    })
                    .map_err(map_device_error)?;
                Ok(Reply::FrameRendered)
            }
            Request::ReadPixels(rect) => {
                let block = self.device.readback(rect).map_err(map_device_error)?;
                Ok(Reply::Pixels(block))
            }
        }
    }

    fn check_frame_block(&self, block: &render_protocol::PixelBlock) -> Result<(), RequestFailure> {
        if !block.is_well_formed() {
            return Err(RequestFailure::MalformedFrame(
                "pixel data does not match declared dimensions".to_string(),
            ));
        }
        let max = self.device.capabilities().max_dimension;
        if block.width > max || block.height > max {
            return Err(RequestFailure::MalformedFrame(format!(
                "frame {}x{} exceeds device maximum {max}",
                block.width, block.height
            )));
        }
        Ok(())
    }

    fn check_hdr_frame(&self, frame: &HdrFrameInput) -> Result<(), RequestFailure> {
        self.check_frame_block(&frame.block)?;
        if !self.device.capabilities().hdr_surface {
            return Err(RequestFailure::Device(
                "HDR frame submitted without an HDR surface".to_string(),
            ));
        }
        if frame.channels != 3 && frame.channels != 4 {
            return Err(RequestFailure::MalformedFrame(format!(
                "unsupported channel count {}",
                frame.channels
            )));
        }
        Ok(())
    }

    fn drain_context_events(&mut self, events: &mut EventBatch) {
        while let Some(event) = self.device.poll_context_event() {
            match event {
                ContextEvent::Lost => {
                    self.context_lost = true;
                    warn!("rendering context lost");
                    events.push(Envelope::stamped(SessionEvent::ContextLost));
                }
                ContextEvent::Restored => {
                    self.context_lost = false;
                    debug!("rendering context restored");
                    events.push(Envelope::stamped(SessionEvent::ContextRestored));
                }
            }
        }
    }
}

fn map_device_error(error: DeviceError) -> RequestFailure {
    match error {
        DeviceError::ContextLost => RequestFailure::ContextLost,
        DeviceError::Backend(message) => RequestFailure::Device(message),
    }
}

fn apply_group_update(pipeline: &mut GradePipeline, update: GroupUpdate) {
    match update {
        GroupUpdate::Exposure(params) => pipeline.set_exposure(params),
        GroupUpdate::WhiteBalance(params) => pipeline.set_white_balance(params),
        GroupUpdate::Contrast(params) => pipeline.set_contrast(params),
        GroupUpdate::Saturation(params) => pipeline.set_saturation(params),
        GroupUpdate::TonalRange(params) => pipeline.set_tonal_range(params),
        GroupUpdate::ToneCurve(params) => pipeline.set_tone_curve(params),
        GroupUpdate::HslMixer(params) => pipeline.set_hsl_mixer(params),
        GroupUpdate::Cdl(params) => pipeline.set_cdl(params),
        GroupUpdate::ColorWheels(params) => pipeline.set_color_wheels(params),
        GroupUpdate::Clarity(params) => pipeline.set_clarity(params),
        GroupUpdate::Texture(params) => pipeline.set_texture(params),
        GroupUpdate::Dehaze(params) => pipeline.set_dehaze(params),
        GroupUpdate::Sharpen(params) => pipeline.set_sharpen(params),
        GroupUpdate::Denoise(params) => pipeline.set_denoise(params),
        GroupUpdate::Vignette(params) => pipeline.set_vignette(params),
        GroupUpdate::Grain(params) => pipeline.set_grain(params),
        GroupUpdate::ChromaticAberration(params) => pipeline.set_chromatic_aberration(params),
        GroupUpdate::LensDistortion(params) => pipeline.set_lens_distortion(params),
        GroupUpdate::Orientation(params) => pipeline.set_orientation(params),
        GroupUpdate::ToneMapping(params) => pipeline.set_tone_mapping(params),
        GroupUpdate::Lut(params) => pipeline.set_lut(params),
        GroupUpdate::Background(params) => pipeline.set_background(params),
        GroupUpdate::SplitToning(params) => pipeline.set_split_toning(params),
        GroupUpdate::Levels(params) => pipeline.set_levels(params),
        GroupUpdate::ChannelMixer(params) => pipeline.set_channel_mixer(params),
        GroupUpdate::Watermark(params) => pipeline.set_watermark(params),
        GroupUpdate::Bloom(params) => pipeline.set_bloom(params),
        GroupUpdate::Posterize(params) => pipeline.set_posterize(params),
        GroupUpdate::Border(params) => pipeline.set_border(params),
        GroupUpdate::MaskOverlay(params) => pipeline.set_mask_overlay(params),
    }
}

#[cfg(test)]
mod tests {
    use model::{CdlParams, GradeDelta};
    use render_protocol::{
        ClientMessage, Directive, DisplayMode, Envelope, FrameInput, PixelBlock, PixelFormat,
        ReadbackRect, Reply, Request, RequestFailure, RequestId, SessionCapabilities,
        SessionEvent,
    };
    use renderer::testing::RecordingDevice;
    use renderer::ContextEvent;

    use super::{DispatchFlow, EventBatch, RenderDispatcher};

    fn frame(width: u32, height: u32) -> FrameInput {
        FrameInput {
            block: PixelBlock {
                width,
                height,
                format: PixelFormat::Rgba8,
                bytes: vec![0; width as usize * height as usize * 4].into_boxed_slice(),
            },
        }
    }

    fn init(dispatcher: &mut RenderDispatcher<RecordingDevice>) -> EventBatch {
        let mut events = EventBatch::new();
        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Directive(Directive::Init {
                capabilities: SessionCapabilities::default(),
            })),
            &mut events,
        );
        events
    }

    #[test]
    fn init_reports_ready_then_mode() {
        let mut dispatcher = RenderDispatcher::new(RecordingDevice::new());
        let events = init(&mut dispatcher);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, SessionEvent::Ready);
        assert_eq!(
            events[1].payload,
            SessionEvent::InitResult(Ok(DisplayMode::Hdr))
        );
    }

    #[test]
    fn init_fails_when_required_capability_is_missing() {
        let mut device = RecordingDevice::new();
        device.capabilities.hdr_surface = false;
        let mut dispatcher = RenderDispatcher::new(device);

        let mut events = EventBatch::new();
        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Directive(Directive::Init {
                capabilities: SessionCapabilities {
                    require_hdr_surface: true,
                    require_float_readback: false,
                },
            })),
            &mut events,
        );

        assert!(matches!(
            events[1].payload,
            SessionEvent::InitResult(Err(_))
        ));
    }

    #[test]
    fn requests_before_init_fail_without_touching_the_device() {
        let mut dispatcher = RenderDispatcher::new(RecordingDevice::new());
        let mut events = EventBatch::new();

        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Request {
                id: RequestId(1),
                request: Request::RenderFrame(frame(2, 2)),
            }),
            &mut events,
        );

        assert_eq!(
            events[0].payload,
            SessionEvent::Reply {
                id: RequestId(1),
                result: Err(RequestFailure::NotInitialized),
            }
        );
        assert_eq!(dispatcher.device().draw_count(), 0);
    }

    #[test]
    fn sync_state_is_applied_before_the_following_render() {
        let mut dispatcher = RenderDispatcher::new(RecordingDevice::new());
        init(&mut dispatcher);
        dispatcher.device_mut().take_calls();

        let mut events = EventBatch::new();
        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Directive(Directive::SyncState(Box::new(
                GradeDelta {
                    cdl: Some(CdlParams {
                        slope: [1.2, 1.0, 1.0],
                        ..CdlParams::default()
                    }),
                    ..GradeDelta::default()
                },
            )))),
            &mut events,
        );
        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Request {
                id: RequestId(1),
                request: Request::RenderFrame(frame(4, 4)),
            }),
            &mut events,
        );

        assert_eq!(
            events[0].payload,
            SessionEvent::Reply {
                id: RequestId(1),
                result: Ok(Reply::FrameRendered),
            }
        );
        assert_eq!(dispatcher.device().draw_count(), 1);
        assert_eq!(dispatcher.pipeline().state().cdl.slope, [1.2, 1.0, 1.0]);
    }

    #[test]
    fn draw_failure_reaches_only_that_request() {
        let mut dispatcher = RenderDispatcher::new(RecordingDevice::new());
        init(&mut dispatcher);
        dispatcher.device_mut().fail_next_draw = Some("out of memory".to_string());

        let mut events = EventBatch::new();
        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Request {
                id: RequestId(7),
                request: Request::RenderFrame(frame(2, 2)),
            }),
            &mut events,
        );
        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Request {
                id: RequestId(8),
                request: Request::RenderFrame(frame(2, 2)),
            }),
            &mut events,
        );

        assert_eq!(
            events[0].payload,
            SessionEvent::Reply {
                id: RequestId(7),
                result: Err(RequestFailure::Device("out of memory".to_string())),
            }
        );
        assert_eq!(
            events[1].payload,
            SessionEvent::Reply {
                id: RequestId(8),
                result: Ok(Reply::FrameRendered),
            }
        );
    }

    #[test]
    fn context_loss_broadcasts_and_refuses_requests_until_restore() {
        let mut dispatcher = RenderDispatcher::new(RecordingDevice::new());
        init(&mut dispatcher);
        dispatcher
            .device_mut()
            .pending_context_events
            .push_back(ContextEvent::Lost);

        let mut events = EventBatch::new();
        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Request {
                id: RequestId(3),
                request: Request::RenderFrame(frame(2, 2)),
            }),
            &mut events,
        );

        assert_eq!(events[0].payload, SessionEvent::ContextLost);
        assert_eq!(
            events[1].payload,
            SessionEvent::Reply {
                id: RequestId(3),
                result: Err(RequestFailure::ContextLost),
            }
        );

        dispatcher
            .device_mut()
            .pending_context_events
            .push_back(ContextEvent::Restored);
        let mut events = EventBatch::new();
        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Request {
                id: RequestId(4),
                request: Request::RenderFrame(frame(2, 2)),
            }),
            &mut events,
        );

        assert_eq!(events[0].payload, SessionEvent::ContextRestored);
        assert_eq!(
            events[1].payload,
            SessionEvent::Reply {
                id: RequestId(4),
                result: Ok(Reply::FrameRendered),
            }
        );
    }

    #[test]
    fn readback_returns_pixels_or_null() {
        let mut dispatcher = RenderDispatcher::new(RecordingDevice::new());
        init(&mut dispatcher);

        let mut events = EventBatch::new();
        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Request {
                id: RequestId(11),
                request: Request::ReadPixels(ReadbackRect {
                    x: 0,
                    y: 0,
                    width: 2,
                    height: 2,
                }),
            }),
            &mut events,
        );
        match &events[0].payload {
            SessionEvent::Reply {
                id,
                result: Ok(Reply::Pixels(Some(block))),
            } => {
                assert_eq!(*id, RequestId(11));
                assert_eq!((block.width, block.height), (2, 2));
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let mut events = EventBatch::new();
        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Request {
                id: RequestId(12),
                request: Request::ReadPixels(ReadbackRect {
                    x: 50_000,
                    y: 0,
                    width: 2,
                    height: 2,
                }),
            }),
            &mut events,
        );
        assert_eq!(
            events[0].payload,
            SessionEvent::Reply {
                id: RequestId(12),
                result: Ok(Reply::Pixels(None)),
            }
        );
    }

    #[test]
    fn dispose_resets_state_and_stops_the_loop() {
        let mut dispatcher = RenderDispatcher::new(RecordingDevice::new());
        init(&mut dispatcher);
        let mut events = EventBatch::new();
        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Directive(Directive::Update(
                render_protocol::GroupUpdate::Cdl(CdlParams {
                    saturation: 0.5,
                    ..CdlParams::default()
                }),
            ))),
            &mut events,
        );
        assert_eq!(dispatcher.pipeline().state().cdl.saturation, 0.5);

        let flow = dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Directive(Directive::Dispose)),
            &mut events,
        );

        assert_eq!(flow, DispatchFlow::Shutdown);
        assert_eq!(dispatcher.pipeline().state().cdl.saturation, 1.0);
    }

    #[test]
    fn incompatible_version_fails_requests_and_drops_directives() {
        let mut dispatcher = RenderDispatcher::new(RecordingDevice::new());
        init(&mut dispatcher);

        let mut events = EventBatch::new();
        dispatcher.handle_message(
            Envelope {
                version: Some(99),
                payload: ClientMessage::Request {
                    id: RequestId(2),
                    request: Request::RenderFrame(frame(2, 2)),
                },
            },
            &mut events,
        );
        assert!(matches!(
            events[0].payload,
            SessionEvent::Reply {
                result: Err(RequestFailure::VersionMismatch { peer: 99, .. }),
                ..
            }
        ));

        let mut events = EventBatch::new();
        dispatcher.handle_message(
            Envelope {
                version: Some(99),
                payload: ClientMessage::Directive(Directive::Clear {
                    rgba: [0.0, 0.0, 0.0, 1.0],
                }),
            },
            &mut events,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn oversized_frame_is_refused_before_the_device_sees_it() {
        let mut device = RecordingDevice::new();
        device.capabilities.max_dimension = 64;
        let mut dispatcher = RenderDispatcher::new(device);
        init(&mut dispatcher);

        let mut events = EventBatch::new();
        dispatcher.handle_message(
            Envelope::stamped(ClientMessage::Request {
                id: RequestId(5),
                request: Request::RenderFrame(frame(128, 2)),
            }),
            &mut events,
        );

        assert!(matches!(
            events[0].payload,
            SessionEvent::Reply {
                result: Err(RequestFailure::MalformedFrame(_)),
                ..
            }
        ));
        assert_eq!(dispatcher.device().draw_count(), 0);
    }
}
