//! Caller-side session facade.
//!
//! `SessionProxy` exposes the same surface as a local renderer, but every
//! setter lands in a pending delta and every render/readback becomes a
//! correlated request over the session channel. Nothing here blocks except
//! `wait_for`, the single caller-side suspension point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam_channel::TryRecvError;
use engine::CallerChannels;
use frame_stage::{FrameSource, FrameStage, SourceKey, StageError};
use model::{
    BackgroundParams, BloomParams, BorderParams, CdlParams, ChannelMixerParams,
    ChromaticAberrationParams, ClarityParams, ColorWheelsParams, ContrastParams, DehazeParams,
    DenoiseParams, ExposureParams, GradeDelta, GradeState, GrainParams, HslMixerParams,
    LensDistortionParams, LevelsParams, LutParams, MaskOverlayParams, OrientationParams,
    PosterizeParams, SaturationParams, SharpenParams, SplitToningParams, TextureParams,
    TonalRangeParams, ToneCurveParams, ToneMappingParams, VignetteParams, WatermarkParams,
    WhiteBalanceParams,
};
use render_protocol::{
    ClientMessage, Directive, DisplayMode, Envelope, FrameInput, HdrFrameInput, InitError,
    PixelBlock, PixelFormat, ReadbackRect, Reply, Request, RequestFailure, RequestId,
    SessionCapabilities, SessionEvent, TransferFunction,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a deferred result failed on the caller side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session disposed")]
    Disposed,
    #[error("session channel failed")]
    ChannelClosed,
    #[error("rendering context not available")]
    ContextNotAvailable,
    #[error("render request superseded by a newer frame")]
    Superseded,
    #[error("initialization failed: {0}")]
    InitFailed(InitError),
    #[error("request failed: {0}")]
    Request(RequestFailure),
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
}

enum TicketState<T> {
    Pending,
    Resolved(Result<T, SessionError>),
    Taken,
}

struct ReplyCell<T> {
    slot: Mutex<TicketState<T>>,
}

fn lock_slot<T>(cell: &ReplyCell<T>) -> std::sync::MutexGuard<'_, TicketState<T>> {
    match cell.slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn resolve_cell<T>(cell: &Arc<ReplyCell<T>>, result: Result<T, SessionError>) {
    let mut slot = lock_slot(cell);
    // A cell resolves at most once; later resolutions are dropped.
    if matches!(*slot, TicketState::Pending) {
        *slot = TicketState::Resolved(result);
    }
}

/// Deferred result of a render or readback request.
///
/// Resolves while the proxy pumps events; `try_take` yields the result once.
pub struct ReplyTicket<T> {
    cell: Arc<ReplyCell<T>>,
}

impl<T> ReplyTicket<T> {
    fn new_pending() -> (Self, Arc<ReplyCell<T>>) {
        let cell = Arc::new(ReplyCell {
            slot: Mutex::new(TicketState::Pending),
        });
        (Self { cell: cell.clone() }, cell)
    }

    fn new_rejected(error: SessionError) -> Self {
        let (ticket, cell) = Self::new_pending();
        resolve_cell(&cell, Err(error));
        ticket
    }

    pub fn is_pending(&self) -> bool {
        matches!(*lock_slot(&self.cell), TicketState::Pending)
    }

    /// Take the result if resolved. Taking twice reports a protocol
    /// violation rather than hanging a caller that waits on it.
    pub fn try_take(&self) -> Option<Result<T, SessionError>> {
        let mut slot = lock_slot(&self.cell);
        match std::mem::replace(&mut *slot, TicketState::Taken) {
            TicketState::Pending => {
                *slot = TicketState::Pending;
                None
            }
            TicketState::Resolved(result) => Some(result),
            TicketState::Taken => Some(Err(SessionError::Protocol("reply already taken"))),
        }
    }
}

/// Subscription interface for context-loss transitions. Multiple observers
/// may be registered independently.
pub trait ContextObserver: Send + Sync {
    fn context_lost(&self) {}
    fn context_restored(&self) {}
}

enum PendingEntry {
    Render(Arc<ReplyCell<()>>),
    Pixels(Arc<ReplyCell<Option<PixelBlock>>>),
}

impl PendingEntry {
    fn reject(self, error: SessionError) {
        match self {
            PendingEntry::Render(cell) => resolve_cell(&cell, Err(error)),
            PendingEntry::Pixels(cell) => resolve_cell(&cell, Err(error)),
        }
    }

    fn resolve(self, result: Result<Reply, RequestFailure>) {
        match (self, result) {
            (PendingEntry::Render(cell), Ok(Reply::FrameRendered)) => {
                resolve_cell(&cell, Ok(()));
            }
            (PendingEntry::Pixels(cell), Ok(Reply::Pixels(block))) => {
                resolve_cell(&cell, Ok(block));
            }
            (PendingEntry::Render(cell), Err(failure)) => {
                resolve_cell(&cell, Err(SessionError::Request(failure)));
            }
            (PendingEntry::Pixels(cell), Err(failure)) => {
                resolve_cell(&cell, Err(SessionError::Request(failure)));
            }
            (entry, Ok(_)) => {
                warn!("reply kind does not match its pending request");
                entry.reject(SessionError::Protocol("mismatched reply kind"));
            }
        }
    }
}

enum QueuedFrame {
    Sdr(FrameInput),
    Hdr(HdrFrameInput),
}

struct QueuedRender {
    frame: QueuedFrame,
    cell: Arc<ReplyCell<()>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProxyPhase {
    Active,
    /// Channel-fatal or failed init: only disposal remains meaningful.
    Failed(SessionError),
    Disposed,
}

pub struct SessionProxy {
    channels: CallerChannels,
    cached_state: GradeState,
    pending_delta: GradeDelta,
    pending: HashMap<RequestId, PendingEntry>,
    next_request_id: u64,
    /// Single-in-flight render discipline: at most one render request is on
    /// the wire; a second is queued (slot of one, newest wins).
    in_flight_render: Option<RequestId>,
    queued_render: Option<QueuedRender>,
    staged: FrameStage,
    observers: Vec<Arc<dyn ContextObserver>>,
    phase: ProxyPhase,
    context_lost: bool,
    init_result: Option<Result<DisplayMode, InitError>>,
    ready: bool,
}

impl SessionProxy {
    /// Wrap the caller endpoints and announce the session to the execution
    /// side with an `Init` directive.
    pub fn connect(channels: CallerChannels, capabilities: SessionCapabilities) -> Self {
        let mut proxy = Self {
            channels,
            cached_state: GradeState::default(),
            pending_delta: GradeDelta::default(),
            pending: HashMap::new(),
            next_request_id: 1,
            in_flight_render: None,
            queued_render: None,
            staged: FrameStage::new(),
            observers: Vec::new(),
            phase: ProxyPhase::Active,
            context_lost: false,
            init_result: None,
            ready: false,
        };
        proxy.send_directive(Directive::Init { capabilities });
        proxy
    }

    /// Locally cached grade; an independent copy, never an alias into the
    /// proxy's cache.
    pub fn state(&self) -> GradeState {
        self.cached_state.clone()
    }

    pub fn display_mode(&self) -> Option<DisplayMode> {
        match &self.init_result {
            Some(Ok(mode)) => Some(*mode),
            _ => None,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.phase == ProxyPhase::Disposed
    }

    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn pending_request_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_queued_render(&self) -> bool {
        self.queued_render.is_some()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn ContextObserver>) {
        self.observers.push(observer);
    }

    fn is_active(&self) -> bool {
        self.phase == ProxyPhase::Active
    }

    fn request_guard(&self) -> Option<SessionError> {
        match &self.phase {
            ProxyPhase::Disposed => Some(SessionError::Disposed),
            ProxyPhase::Failed(error) => Some(error.clone()),
            ProxyPhase::Active if self.context_lost => Some(SessionError::ContextNotAvailable),
            ProxyPhase::Active => None,
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        id
    }

    fn send(&mut self, message: ClientMessage) -> bool {
        if self
            .channels
            .message_sender
            .send(Envelope::stamped(message))
            .is_err()
        {
            self.fail_channel();
            return false;
        }
        true
    }

    fn send_directive(&mut self, directive: Directive) {
        if self.is_active() {
            self.send(ClientMessage::Directive(directive));
        }
    }

    /// Ship the pending delta as one batched directive, clearing it with the
    /// send. No-op when nothing changed.
    fn flush_pending_delta(&mut self) {
        if self.pending_delta.is_empty() {
            return;
        }
        let delta = std::mem::take(&mut self.pending_delta);
        self.send(ClientMessage::Directive(Directive::SyncState(Box::new(
            delta,
        ))));
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.send_directive(Directive::Resize { width, height });
    }

    pub fn clear(&mut self, rgba: [f32; 4]) {
        self.send_directive(Directive::Clear { rgba });
    }

    /// Stage the next displayable frame. Edits after disposal are silently
    /// dropped, like setters.
    pub fn stage_frame(&mut self, source: FrameSource) -> Result<(), StageError> {
        if !self.is_active() {
            return Ok(());
        }
        self.staged.stage(source)
    }

    pub fn staged_key(&self) -> Option<SourceKey> {
        self.staged.staged_key()
    }

    /// Render the staged frame, if one is staged.
    pub fn render_staged(&mut self) -> Option<ReplyTicket<()>> {
        let block = self.staged.take_staged()?;
        Some(match block.format {
            PixelFormat::Rgba8 => self.render_frame(FrameInput { block }),
            PixelFormat::Rgba16Float | PixelFormat::Rgba32Float => {
                self.render_hdr_frame(HdrFrameInput {
                    block,
                    channels: 4,
                    transfer_fn: Some(TransferFunction::Linear),
                    primaries: None,
                })
            }
        })
    }

    pub fn render_frame(&mut self, frame: FrameInput) -> ReplyTicket<()> {
        self.submit_render(QueuedFrame::Sdr(frame))
    }

    pub fn render_hdr_frame(&mut self, frame: HdrFrameInput) -> ReplyTicket<()> {
        self.submit_render(QueuedFrame::Hdr(frame))
    }

    fn submit_render(&mut self, frame: QueuedFrame) -> ReplyTicket<()> {
        if let Some(error) = self.request_guard() {
            return ReplyTicket::new_rejected(error);
        }

        let (ticket, cell) = ReplyTicket::new_pending();
        if self.in_flight_render.is_some() {
            // Newest wins the queue slot; the superseded frame's buffer is
            // dropped here and its ticket told why.
            if let Some(superseded) = self.queued_render.take() {
                resolve_cell(&superseded.cell, Err(SessionError::Superseded));
            }
            self.queued_render = Some(QueuedRender { frame, cell });
            return ticket;
        }

        self.send_render_request(frame, cell);
        ticket
    }

    fn send_render_request(&mut self, frame: QueuedFrame, cell: Arc<ReplyCell<()>>) {
        self.flush_pending_delta();
        let id = self.next_id();
        let request = match frame {
            QueuedFrame::Sdr(frame) => Request::RenderFrame(frame),
            QueuedFrame::Hdr(frame) => Request::RenderHdrFrame(frame),
        };
        self.pending.insert(id, PendingEntry::Render(cell));
        self.in_flight_render = Some(id);
        // On send failure fail_channel rejects the fresh entry with the rest.
        self.send(ClientMessage::Request { id, request });
    }

    pub fn read_pixels(&mut self, rect: ReadbackRect) -> ReplyTicket<Option<PixelBlock>> {
        if let Some(error) = self.request_guard() {
            return ReplyTicket::new_rejected(error);
        }

        self.flush_pending_delta();
        let (ticket, cell) = ReplyTicket::new_pending();
        let id = self.next_id();
        self.pending.insert(id, PendingEntry::Pixels(cell));
        self.send(ClientMessage::Request {
            id,
            request: Request::ReadPixels(rect),
        });
        ticket
    }

    /// Drain every event currently queued, resolving tickets and notifying
    /// observers. Never blocks.
    pub fn pump_events(&mut self) {
        loop {
            match self.channels.event_receiver.try_recv() {
                Ok(envelope) => self.handle_event(envelope),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.fail_channel();
                    break;
                }
            }
        }
    }

    /// Block until `ticket` resolves. The only suspension point on the
    /// caller side.
    pub fn wait_for<T>(&mut self, ticket: &ReplyTicket<T>) -> Result<T, SessionError> {
        loop {
            if let Some(result) = ticket.try_take() {
                return result;
            }
            match self.channels.event_receiver.recv() {
                Ok(envelope) => self.handle_event(envelope),
                Err(_) => self.fail_channel(),
            }
        }
    }

    /// Block until the execution side reports its init outcome.
    pub fn wait_for_init(&mut self) -> Result<DisplayMode, SessionError> {
        loop {
            match &self.init_result {
                Some(Ok(mode)) => return Ok(*mode),
                Some(Err(error)) => return Err(SessionError::InitFailed(error.clone())),
                None => {}
            }
            if let ProxyPhase::Failed(error) = &self.phase {
                return Err(error.clone());
            }
            if self.phase == ProxyPhase::Disposed {
                return Err(SessionError::Disposed);
            }
            match self.channels.event_receiver.recv() {
                Ok(envelope) => self.handle_event(envelope),
                Err(_) => self.fail_channel(),
            }
        }
    }

    fn handle_event(&mut self, envelope: Envelope<SessionEvent>) {
        if !envelope.is_version_compatible() {
            warn!(version = ?envelope.version, "dropping event with incompatible protocol version");
            return;
        }
        match envelope.payload {
            SessionEvent::Ready => {
                self.ready = true;
            }
            SessionEvent::InitResult(result) => {
                if let Err(error) = &result {
                    // Init failure is fatal to the session; not retried.
                    self.fail_with(SessionError::InitFailed(error.clone()));
                }
                self.init_result = Some(result);
            }
            SessionEvent::Reply { id, result } => {
                let Some(entry) = self.pending.remove(&id) else {
                    warn!(id = id.0, "reply for unknown request id");
                    return;
                };
                if self.in_flight_render == Some(id) {
                    self.in_flight_render = None;
                }
                entry.resolve(result);
                self.dispatch_queued_render();
            }
            SessionEvent::ContextLost => {
                self.context_lost = true;
                debug!("rendering context lost");
                for observer in &self.observers {
                    observer.context_lost();
                }
            }
            SessionEvent::ContextRestored => {
                self.context_lost = false;
                debug!("rendering context restored");
                for observer in &self.observers {
                    observer.context_restored();
                }
            }
        }
    }

    fn dispatch_queued_render(&mut self) {
        if !self.is_active() || self.in_flight_render.is_some() {
            return;
        }
        let Some(queued) = self.queued_render.take() else {
            return;
        };
        if self.context_lost {
            resolve_cell(&queued.cell, Err(SessionError::ContextNotAvailable));
            return;
        }
        self.send_render_request(queued.frame, queued.cell);
    }

    fn fail_channel(&mut self) {
        self.fail_with(SessionError::ChannelClosed);
    }

    fn fail_with(&mut self, error: SessionError) {
        if self.phase != ProxyPhase::Active {
            return;
        }
        warn!(%error, "session entering failed state");
        self.phase = ProxyPhase::Failed(error.clone());
        self.reject_all(error);
    }

    fn reject_all(&mut self, error: SessionError) {
        for (_, entry) in self.pending.drain() {
            entry.reject(error.clone());
        }
        self.in_flight_render = None;
        if let Some(queued) = self.queued_render.take() {
            resolve_cell(&queued.cell, Err(error));
        }
    }

    /// Tear the session down.
    ///
    /// Sends a best-effort `Dispose` so the execution side can release its
    /// resources, then enters the disposed state: later setters no-op,
    /// later requests fail fast without touching the channel, the staged
    /// frame is released, and every pending entry rejects. Idempotent.
    pub fn dispose(&mut self) {
        if self.phase == ProxyPhase::Disposed {
            return;
        }
        debug!("disposing render session");
        self.staged.clear();
        // Best-effort: the channel may be alive even in the failed state
        // (e.g. after a failed init), and the execution side needs the
        // directive to release its resources and stop.
        let _ = self
            .channels
            .message_sender
            .send(Envelope::stamped(ClientMessage::Directive(
                Directive::Dispose,
            )));
        self.phase = ProxyPhase::Disposed;
        self.cached_state = GradeState::default();
        self.pending_delta = GradeDelta::default();
        self.reject_all(SessionError::Disposed);
    }
}

impl Drop for SessionProxy {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// State setters: write the pending delta and the local cache, return
/// immediately. Last write before a flush wins. After disposal they drop
/// the edit silently so late UI events during teardown stay harmless.
macro_rules! proxy_setters {
    ($(($setter:ident, $field:ident, $params:ty)),+ $(,)?) => {
        impl SessionProxy {
            $(
                pub fn $setter(&mut self, params: $params) {
                    if !self.is_active() {
                        return;
                    }
                    self.cached_state.$field = params.clone();
                    self.pending_delta.$field = Some(params);
                }
            )+
        }
    };
}

proxy_setters!(
    (set_exposure, exposure, ExposureParams),
    (set_white_balance, white_balance, WhiteBalanceParams),
    (set_contrast, contrast, ContrastParams),
    (set_saturation, saturation, SaturationParams),
    (set_tonal_range, tonal_range, TonalRangeParams),
    (set_tone_curve, tone_curve, ToneCurveParams),
    (set_hsl_mixer, hsl_mixer, HslMixerParams),
    (set_cdl, cdl, CdlParams),
    (set_color_wheels, color_wheels, ColorWheelsParams),
    (set_clarity, clarity, ClarityParams),
    (set_texture, texture, TextureParams),
    (set_dehaze, dehaze, DehazeParams),
    (set_sharpen, sharpen, SharpenParams),
    (set_denoise, denoise, DenoiseParams),
    (set_vignette, vignette, VignetteParams),
    (set_grain, grain, GrainParams),
    (set_chromatic_aberration, chromatic_aberration, ChromaticAberrationParams),
    (set_lens_distortion, lens_distortion, LensDistortionParams),
    (set_orientation, orientation, OrientationParams),
    (set_tone_mapping, tone_mapping, ToneMappingParams),
    (set_lut, lut, LutParams),
    (set_background, background, BackgroundParams),
    (set_split_toning, split_toning, SplitToningParams),
    (set_levels, levels, LevelsParams),
    (set_channel_mixer, channel_mixer, ChannelMixerParams),
    (set_watermark, watermark, WatermarkParams),
    (set_bloom, bloom, BloomParams),
    (set_posterize, posterize, PosterizeParams),
    (set_border, border, BorderParams),
    (set_mask_overlay, mask_overlay, MaskOverlayParams),
);
