//! Session round-trip tests.
//!
//! Channel-level tests drive a proxy against hand-held execution endpoints
//! to assert exact message traffic; threaded tests run the real dispatch
//! loop on its own thread like production does.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use engine::{create_session_channels, ExecutionChannels};
use model::{
    CdlParams, ClarityParams, ContrastParams, CurvePoint, ExposureParams, GradeState,
    ToneCurveParams,
};
use render_protocol::{
    ClientMessage, Directive, DisplayMode, Envelope, FrameInput, PixelBlock, PixelFormat,
    ReadbackRect, Reply, Request, RequestId, SessionCapabilities, SessionEvent,
};
use renderer::testing::RecordingDevice;
use renderer::ContextEvent;

use crate::proxy::{ContextObserver, SessionError, SessionProxy};
use crate::runtime::spawn_session;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_frame(fill: u8) -> FrameInput {
    FrameInput {
        block: PixelBlock {
            width: 2,
            height: 2,
            format: PixelFormat::Rgba8,
            bytes: vec![fill; 16].into_boxed_slice(),
        },
    }
}

fn drain_messages(execution: &ExecutionChannels) -> Vec<ClientMessage> {
    let mut messages = Vec::new();
    while let Ok(envelope) = execution.message_receiver.try_recv() {
        assert!(envelope.is_version_compatible());
        messages.push(envelope.payload);
    }
    messages
}

/// Proxy over hand-held endpoints with the `Init` directive already drained.
fn manual_session() -> (SessionProxy, ExecutionChannels) {
    let (caller, execution) = create_session_channels();
    let proxy = SessionProxy::connect(caller, SessionCapabilities::default());
    let first = drain_messages(&execution);
    assert!(matches!(
        first.as_slice(),
        [ClientMessage::Directive(Directive::Init { .. })]
    ));
    (proxy, execution)
}

#[derive(Default)]
struct CountingObserver {
    lost: AtomicUsize,
    restored: AtomicUsize,
}

impl ContextObserver for CountingObserver {
    fn context_lost(&self) {
        self.lost.fetch_add(1, Ordering::SeqCst);
    }

    fn context_restored(&self) {
        self.restored.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn setters_alone_send_no_messages() {
    let (mut proxy, execution) = manual_session();

    proxy.set_exposure(ExposureParams {
        ev: 1.0,
        black_level: 0.0,
    });
    proxy.set_cdl(CdlParams::default());

    assert!(drain_messages(&execution).is_empty());
}

#[test]
fn render_batches_setters_into_one_sync_state_with_last_write_wins() {
    let (mut proxy, execution) = manual_session();

    proxy.set_exposure(ExposureParams {
        ev: 0.5,
        black_level: 0.0,
    });
    proxy.set_exposure(ExposureParams {
        ev: 1.5,
        black_level: 0.1,
    });
    proxy.set_cdl(CdlParams {
        saturation: 0.8,
        ..CdlParams::default()
    });
    let _ticket = proxy.render_frame(test_frame(0xab));

    let messages = drain_messages(&execution);
    assert_eq!(messages.len(), 2);

    match &messages[0] {
        ClientMessage::Directive(Directive::SyncState(delta)) => {
            assert_eq!(
                delta.exposure,
                Some(ExposureParams {
                    ev: 1.5,
                    black_level: 0.1,
                })
            );
            assert_eq!(delta.cdl.as_ref().map(|cdl| cdl.saturation), Some(0.8));
            // Untouched groups travel as absent, not as defaults.
            assert_eq!(delta.contrast, None);
        }
        other => panic!("expected SyncState first, got {other:?}"),
    }
    match &messages[1] {
        ClientMessage::Request {
            id,
            request: Request::RenderFrame(_),
        } => assert_eq!(*id, RequestId(1)),
        other => panic!("expected render request second, got {other:?}"),
    }

    // The delta was cleared with the send: an idle render syncs nothing.
    let _second = proxy.render_frame(test_frame(0xcd));
    assert!(proxy.has_queued_render());
}

#[test]
fn request_ids_are_unique_and_each_resolves_exactly_once() {
    let (mut proxy, execution) = manual_session();

    let render = proxy.render_frame(test_frame(1));
    let pixels_a = proxy.read_pixels(ReadbackRect {
        x: 0,
        y: 0,
        width: 1,
        height: 1,
    });
    let pixels_b = proxy.read_pixels(ReadbackRect {
        x: 1,
        y: 1,
        width: 1,
        height: 1,
    });

    let ids: Vec<RequestId> = drain_messages(&execution)
        .into_iter()
        .filter_map(|message| message.request_id())
        .collect();
    assert_eq!(ids, vec![RequestId(1), RequestId(2), RequestId(3)]);
    assert_eq!(proxy.pending_request_count(), 3);

    for (id, reply) in [
        (RequestId(1), Reply::FrameRendered),
        (RequestId(2), Reply::Pixels(None)),
        (
            RequestId(3),
            Reply::Pixels(Some(PixelBlock {
                width: 1,
                height: 1,
                format: PixelFormat::Rgba8,
                bytes: vec![9; 4].into_boxed_slice(),
            })),
        ),
    ] {
        execution
            .event_sender
            .send(Envelope::stamped(SessionEvent::Reply {
                id,
                result: Ok(reply),
            }))
            .expect("send reply");
    }
    proxy.pump_events();

    assert_eq!(proxy.pending_request_count(), 0);
    assert_eq!(render.try_take(), Some(Ok(())));
    assert_eq!(pixels_a.try_take(), Some(Ok(None)));
    match pixels_b.try_take() {
        Some(Ok(Some(block))) => assert_eq!(block.bytes[0], 9),
        other => panic!("unexpected readback result: {other:?}"),
    }

    // A stray duplicate reply correlates to nothing and is dropped.
    execution
        .event_sender
        .send(Envelope::stamped(SessionEvent::Reply {
            id: RequestId(1),
            result: Ok(Reply::FrameRendered),
        }))
        .expect("send duplicate");
    proxy.pump_events();
    assert_eq!(proxy.pending_request_count(), 0);
}

#[test]
fn single_in_flight_renders_queue_and_newest_supersedes() {
    let (mut proxy, execution) = manual_session();

    let first = proxy.render_frame(test_frame(1));
    let second = proxy.render_frame(test_frame(2));
    let third = proxy.render_frame(test_frame(3));

    // Only the first went on the wire; the second lost the queue slot.
    assert_eq!(drain_messages(&execution).len(), 1);
    assert!(proxy.has_queued_render());
    assert_eq!(second.try_take(), Some(Err(SessionError::Superseded)));
    assert!(first.is_pending());
    assert!(third.is_pending());

    execution
        .event_sender
        .send(Envelope::stamped(SessionEvent::Reply {
            id: RequestId(1),
            result: Ok(Reply::FrameRendered),
        }))
        .expect("send reply");
    proxy.pump_events();

    assert_eq!(first.try_take(), Some(Ok(())));
    assert!(!proxy.has_queued_render());
    let followup: Vec<ClientMessage> = drain_messages(&execution);
    match followup.as_slice() {
        [ClientMessage::Request {
            id,
            request: Request::RenderFrame(frame),
        }] => {
            assert_eq!(*id, RequestId(2));
            assert_eq!(frame.block.bytes[0], 3);
        }
        other => panic!("expected queued render on the wire, got {other:?}"),
    }
    assert!(third.is_pending());
}

#[test]
fn disposal_rejects_pending_requests_and_silences_the_surface() {
    let (mut proxy, execution) = manual_session();

    let render = proxy.render_frame(test_frame(1));
    let queued = proxy.render_frame(test_frame(2));
    proxy.dispose();

    assert_eq!(render.try_take(), Some(Err(SessionError::Disposed)));
    assert_eq!(queued.try_take(), Some(Err(SessionError::Disposed)));
    assert_eq!(proxy.pending_request_count(), 0);

    let messages = drain_messages(&execution);
    assert!(matches!(
        messages.last(),
        Some(ClientMessage::Directive(Directive::Dispose))
    ));

    // Late edits and requests neither panic nor touch the channel.
    proxy.set_contrast(ContrastParams {
        amount: 0.4,
        pivot: 0.5,
    });
    let late = proxy.render_frame(test_frame(3));
    assert_eq!(late.try_take(), Some(Err(SessionError::Disposed)));
    assert_eq!(proxy.state(), GradeState::default());
    assert!(drain_messages(&execution).is_empty());

    // Disposal is idempotent.
    proxy.dispose();
    assert!(drain_messages(&execution).is_empty());
}

#[test]
fn channel_failure_rejects_every_pending_request() {
    let (mut proxy, execution) = manual_session();

    let render = proxy.render_frame(test_frame(1));
    let pixels = proxy.read_pixels(ReadbackRect {
        x: 0,
        y: 0,
        width: 1,
        height: 1,
    });
    drop(execution);
    proxy.pump_events();

    assert_eq!(render.try_take(), Some(Err(SessionError::ChannelClosed)));
    assert_eq!(pixels.try_take(), Some(Err(SessionError::ChannelClosed)));

    let after = proxy.render_frame(test_frame(2));
    assert_eq!(after.try_take(), Some(Err(SessionError::ChannelClosed)));
}

#[test]
fn getters_return_copies_not_aliases() {
    let (mut proxy, _execution) = manual_session();

    proxy.set_tone_curve(ToneCurveParams {
        points: vec![
            CurvePoint { x: 0.0, y: 0.0 },
            CurvePoint { x: 0.5, y: 0.7 },
            CurvePoint { x: 1.0, y: 1.0 },
        ],
    });

    let mut copy = proxy.state();
    copy.tone_curve.points.clear();
    copy.exposure.ev = 99.0;

    let fresh = proxy.state();
    assert_eq!(fresh.tone_curve.points.len(), 3);
    assert_eq!(fresh.exposure.ev, 0.0);
}

#[test]
fn context_events_reach_every_observer() {
    let (mut proxy, execution) = manual_session();
    let first = Arc::new(CountingObserver::default());
    let second = Arc::new(CountingObserver::default());
    proxy.subscribe(first.clone());
    proxy.subscribe(second.clone());

    for event in [
        SessionEvent::ContextLost,
        SessionEvent::ContextRestored,
        SessionEvent::ContextLost,
    ] {
        execution
            .event_sender
            .send(Envelope::stamped(event))
            .expect("send context event");
    }
    proxy.pump_events();

    assert_eq!(first.lost.load(Ordering::SeqCst), 2);
    assert_eq!(first.restored.load(Ordering::SeqCst), 1);
    assert_eq!(second.lost.load(Ordering::SeqCst), 2);
    assert!(proxy.is_context_lost());

    // Requests made while lost fail fast without touching the channel.
    let rejected = proxy.render_frame(test_frame(1));
    assert_eq!(
        rejected.try_take(),
        Some(Err(SessionError::ContextNotAvailable))
    );
    assert!(drain_messages(&execution).is_empty());
}

#[test]
fn incompatible_event_versions_are_ignored() {
    let (mut proxy, execution) = manual_session();
    let render = proxy.render_frame(test_frame(1));
    drain_messages(&execution);

    execution
        .event_sender
        .send(Envelope {
            version: Some(99),
            payload: SessionEvent::Reply {
                id: RequestId(1),
                result: Ok(Reply::FrameRendered),
            },
        })
        .expect("send foreign event");
    proxy.pump_events();

    assert!(render.is_pending());
    assert_eq!(proxy.pending_request_count(), 1);
}

#[test]
fn staged_frames_supersede_and_release_on_dispose() {
    use frame_stage::{FrameSource, SourceKey};

    let (mut proxy, execution) = manual_session();

    let stage_raw = |key: u64, fill: u8| FrameSource::Raw {
        key: SourceKey(key),
        block: PixelBlock {
            width: 2,
            height: 2,
            format: PixelFormat::Rgba8,
            bytes: vec![fill; 16].into_boxed_slice(),
        },
    };

    proxy.stage_frame(stage_raw(1, 0x01)).expect("stage A");
    proxy.stage_frame(stage_raw(2, 0x02)).expect("stage B supersedes A");
    assert_eq!(proxy.staged_key(), Some(SourceKey(2)));

    let _ticket = proxy.render_staged().expect("staged frame available");
    match drain_messages(&execution).as_slice() {
        [ClientMessage::Request {
            request: Request::RenderFrame(frame),
            ..
        }] => assert_eq!(frame.block.bytes[0], 0x02),
        other => panic!("expected one render request, got {other:?}"),
    }
    assert!(proxy.render_staged().is_none());

    proxy.stage_frame(stage_raw(3, 0x03)).expect("stage C");
    proxy.dispose();
    assert_eq!(proxy.staged_key(), None);
}

#[test]
fn threaded_round_trip_renders_and_reads_back() {
    init_tracing();
    let (mut proxy, handle) = spawn_session(RecordingDevice::new(), SessionCapabilities::default());

    assert_eq!(proxy.wait_for_init(), Ok(DisplayMode::Hdr));
    assert!(proxy.is_ready());

    proxy.set_clarity(ClarityParams {
        enabled: true,
        amount: 50.0,
    });
    let render = proxy.render_frame(test_frame(0x40));
    assert_eq!(proxy.wait_for(&render), Ok(()));

    let pixels = proxy.read_pixels(ReadbackRect {
        x: 0,
        y: 0,
        width: 2,
        height: 2,
    });
    match proxy.wait_for(&pixels) {
        Ok(Some(block)) => assert_eq!((block.width, block.height), (2, 2)),
        other => panic!("unexpected readback result: {other:?}"),
    }

    proxy.dispose();
    handle.join().expect("dispatch thread exits cleanly");
}

#[test]
fn threaded_dispose_before_reply_rejects_the_pending_render() {
    init_tracing();
    let (mut proxy, handle) = spawn_session(RecordingDevice::new(), SessionCapabilities::default());

    // Do not pump: whatever the dispatcher replies stays in the channel.
    let render = proxy.render_frame(test_frame(0x11));
    proxy.dispose();

    assert_eq!(render.try_take(), Some(Err(SessionError::Disposed)));
    assert_eq!(proxy.pending_request_count(), 0);
    handle.join().expect("dispatch thread exits after dispose");
}

#[test]
fn threaded_context_loss_propagates_to_the_caller() {
    init_tracing();
    let mut device = RecordingDevice::new();
    device.pending_context_events.push_back(ContextEvent::Lost);
    let (mut proxy, handle) = spawn_session(device, SessionCapabilities::default());

    let observer = Arc::new(CountingObserver::default());
    proxy.subscribe(observer.clone());

    // The loss precedes Ready/InitResult in the event stream, so init
    // completion implies the loss has been observed.
    assert!(proxy.wait_for_init().is_ok());
    assert!(proxy.is_context_lost());
    assert_eq!(observer.lost.load(Ordering::SeqCst), 1);

    let rejected = proxy.render_frame(test_frame(1));
    assert_eq!(
        rejected.try_take(),
        Some(Err(SessionError::ContextNotAvailable))
    );

    proxy.dispose();
    handle.join().expect("dispatch thread exits");
}

#[test]
fn threaded_init_failure_is_fatal_to_the_session() {
    init_tracing();
    let mut device = RecordingDevice::new();
    device.capabilities.hdr_surface = false;
    let (mut proxy, handle) = spawn_session(
        device,
        SessionCapabilities {
            require_hdr_surface: true,
            require_float_readback: false,
        },
    );

    assert!(matches!(
        proxy.wait_for_init(),
        Err(SessionError::InitFailed(_))
    ));
    let rejected = proxy.render_frame(test_frame(1));
    assert!(matches!(
        rejected.try_take(),
        Some(Err(SessionError::InitFailed(_)))
    ));

    proxy.dispose();
    handle.join().expect("dispatch thread exits");
}
