//! Dispatch loop and session wiring.

use std::thread::{self, JoinHandle};

use engine::{create_session_channels, ExecutionChannels};
use render_protocol::SessionCapabilities;
use renderer::Device;
use tracing::debug;

use crate::proxy::SessionProxy;

use super::{DispatchFlow, EventBatch, RenderDispatcher};

/// Consume messages in arrival order until a `Dispose` directive lands or
/// the caller side goes away. One message is handled fully before the next;
/// the loop never suspends mid-message.
pub fn run_dispatch_loop<D: Device>(
    mut dispatcher: RenderDispatcher<D>,
    channels: ExecutionChannels,
) {
    let ExecutionChannels {
        message_receiver,
        event_sender,
    } = channels;
    let mut events = EventBatch::new();

    loop {
        let envelope = match message_receiver.recv() {
            Ok(envelope) => envelope,
            Err(_) => {
                debug!("caller endpoints dropped; dispatch loop exiting");
                return;
            }
        };

        let flow = dispatcher.handle_message(envelope, &mut events);

        for event in events.drain(..) {
            if event_sender.send(event).is_err() {
                debug!("caller stopped listening; dispatch loop exiting");
                return;
            }
        }

        if flow == DispatchFlow::Shutdown {
            debug!("dispatch loop shut down by dispose");
            return;
        }
    }
}

/// Spawn the execution side on its own thread and connect a proxy to it.
///
/// The device moves into the dispatch thread and is owned by it exclusively
/// from here on.
pub fn spawn_session<D>(
    device: D,
    capabilities: SessionCapabilities,
) -> (SessionProxy, JoinHandle<()>)
where
    D: Device + Send + 'static,
{
    let (caller, execution) = create_session_channels();
    let dispatcher = RenderDispatcher::new(device);

    let handle = thread::Builder::new()
        .name("gradia-dispatch".to_string())
        .spawn(move || run_dispatch_loop(dispatcher, execution))
        .unwrap_or_else(|error| panic!("failed to spawn dispatch thread: {error}"));

    let proxy = SessionProxy::connect(caller, capabilities);
    (proxy, handle)
}
