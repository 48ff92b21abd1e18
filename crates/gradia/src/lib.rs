//! Gradia session core.
//!
//! Caller-side `SessionProxy` and execution-side `RenderDispatcher`, joined
//! by the FIFO session channels: edits batch into state deltas, renders and
//! readbacks correlate by request id, and buffers move across the boundary
//! without copies.

pub mod proxy;
pub mod runtime;

#[cfg(test)]
mod session_tests;

pub use proxy::{ContextObserver, ReplyTicket, SessionError, SessionProxy};
pub use runtime::{run_dispatch_loop, spawn_session, DispatchFlow, RenderDispatcher};
