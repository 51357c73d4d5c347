//! Media pipeline engine facade
//!
//! Wraps GStreamer behind a narrow surface: process-wide [`init`] /
//! [`shutdown`], [`VideoPipeline::build`] / `start` / `stop`, and the
//! [`EngineHandle`] trait the negotiation state machine drives. All
//! engine events flow back through the
//! [`EngineEventBridge`](crate::bridge::EngineEventBridge); nothing here
//! calls into session state directly.

mod video;

pub use video::{EncoderKind, VideoPipeline};

use crate::{Error, Result};
use gstreamer as gst;

/// One-time process-wide media framework initialization
///
/// Must be called once before any pipeline is built, independent of any
/// session.
pub fn init() -> Result<()> {
    gst::init().map_err(|e| Error::PipelineBuild(format!("GStreamer init failed: {e}")))
}

/// Process-wide media framework teardown
///
/// Call at most once, at process end, after every pipeline has been
/// stopped. No GStreamer call may follow.
pub fn shutdown() {
    unsafe { gst::deinit() }
}

/// Control surface of a built media session
///
/// Implemented by [`VideoPipeline`]; the negotiation state machine only
/// ever talks to this trait. All methods are fire-and-forget signal
/// emissions into the engine; results come back asynchronously over the
/// event bridge, never as return values.
pub trait EngineHandle: Send + Sync {
    /// Ask the engine to create a fresh offer; completion arrives as
    /// [`EngineEvent::OfferCreated`](crate::bridge::EngineEvent) or
    /// [`EngineEvent::OfferFailed`](crate::bridge::EngineEvent)
    fn request_offer(&self);

    /// Parse a remote SDP answer and apply it as the remote description
    ///
    /// # Errors
    ///
    /// [`Error::SdpParse`] when the answer text is malformed; the engine
    /// state is untouched in that case.
    fn apply_answer(&self, sdp: &str) -> Result<()>;

    /// Forward a remote ICE candidate to the engine
    fn add_remote_candidate(&self, sdp_mline_index: u32, candidate: &str);

    /// Stop the pipeline and release its resources
    ///
    /// Idempotent: calling it twice, or before `start`, is a no-op. The
    /// handle must not be reused afterwards.
    fn stop(&mut self);
}
