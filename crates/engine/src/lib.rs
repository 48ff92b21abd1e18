//! Session channel plumbing.
//!
//! One FIFO channel per direction connects the caller side (proxy) to the
//! execution side (dispatcher). Channels are unbounded so a send never
//! blocks the editing thread; ordering is the transport's FIFO guarantee,
//! with no reordering and no duplication.
//!
//! The two endpoint structs are handed to their respective sides whole and
//! are deliberately not `Clone`: a second producer or consumer on either
//! channel would break the single-owner concurrency model.

use crossbeam_channel::{unbounded, Receiver, Sender};
use render_protocol::{ClientMessage, Envelope, SessionEvent};

/// Caller-side endpoints, owned by the proxy.
pub struct CallerChannels {
    pub message_sender: Sender<Envelope<ClientMessage>>,
    pub event_receiver: Receiver<Envelope<SessionEvent>>,
}

/// Execution-side endpoints, owned by the dispatch loop.
pub struct ExecutionChannels {
    pub message_receiver: Receiver<Envelope<ClientMessage>>,
    pub event_sender: Sender<Envelope<SessionEvent>>,
}

pub fn create_session_channels() -> (CallerChannels, ExecutionChannels) {
    let (message_sender, message_receiver) = unbounded();
    let (event_sender, event_receiver) = unbounded();

    (
        CallerChannels {
            message_sender,
            event_receiver,
        },
        ExecutionChannels {
            message_receiver,
            event_sender,
        },
    )
}

#[cfg(test)]
mod tests {
    use render_protocol::{Directive, RequestId, SessionEvent};

    use super::*;

    #[test]
    fn messages_arrive_in_send_order() {
        let (caller, execution) = create_session_channels();

        for width in [100u32, 200, 300] {
            caller
                .message_sender
                .send(Envelope::stamped(ClientMessage::Directive(
                    Directive::Resize {
                        width,
                        height: width,
                    },
                )))
                .expect("send succeeds");
        }

        let mut seen = Vec::new();
        while let Ok(envelope) = execution.message_receiver.try_recv() {
            if let ClientMessage::Directive(Directive::Resize { width, .. }) = envelope.payload {
                seen.push(width);
            }
        }
        assert_eq!(seen, vec![100, 200, 300]);
    }

    #[test]
    fn dropped_execution_side_is_visible_to_the_caller() {
        let (caller, execution) = create_session_channels();
        drop(execution);

        let result = caller
            .message_sender
            .send(Envelope::stamped(ClientMessage::Directive(Directive::Dispose)));
        assert!(result.is_err());
    }

    #[test]
    fn events_flow_the_opposite_direction() {
        let (caller, execution) = create_session_channels();

        execution
            .event_sender
            .send(Envelope::stamped(SessionEvent::Ready))
            .expect("send succeeds");
        execution
            .event_sender
            .send(Envelope::stamped(SessionEvent::Reply {
                id: RequestId(1),
                result: Ok(render_protocol::Reply::FrameRendered),
            }))
            .expect("send succeeds");

        let first = caller.event_receiver.recv().expect("event delivered");
        assert_eq!(first.payload, SessionEvent::Ready);
        let second = caller.event_receiver.recv().expect("event delivered");
        assert_eq!(second.payload.request_id(), Some(RequestId(1)));
    }
}
