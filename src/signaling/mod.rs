//! WebSocket signaling
//!
//! The server accepts one WebSocket connection per viewer and runs the
//! whole session lifecycle on that connection's task: greeting, pipeline
//! construction, message dispatch, and guaranteed teardown.

pub mod handler;
pub mod protocol;
pub mod server;

pub use protocol::{IceCandidateInit, SignalMessage};
pub use server::SignalingServer;
