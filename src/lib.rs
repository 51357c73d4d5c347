//! WebRTC camera streaming server
//!
//! Streams live camera video to a browser over WebRTC, with connection
//! setup brokered over a WebSocket signaling channel carrying JSON
//! messages. Media capture, encoding and transmission run in a GStreamer
//! pipeline; this crate owns the negotiation state machine and the
//! pipeline lifecycle around it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Browser (WebRTC peer)                               │
//! │  ↕ WebSocket signaling (JSON, one object per frame)  │
//! │  SignalingServer                                     │
//! │  └─ per connection: handler (session lifecycle)      │
//! │     ├─ Session (negotiation state machine)           │
//! │     │   ↕ EngineEventBridge (engine → async context) │
//! │     └─ VideoPipeline (GStreamer graph + webrtcbin)   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Two concurrency domains coexist: the tokio signaling context (one task
//! per session, all session state mutated only here) and GStreamer's own
//! threads (signal callbacks, a dedicated bus thread per pipeline). The
//! only crossing point is the [`bridge::EngineEventBridge`]; calls into
//! the engine from the signaling side are fire-and-forget signal
//! emissions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod signaling;

pub use config::{SourceKind, StreamConfig};
pub use error::{Error, Result};
pub use signaling::SignalingServer;

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
