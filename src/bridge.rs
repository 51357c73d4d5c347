//! Engine-to-session event bridge
//!
//! GStreamer fires signal callbacks and bus messages on its own threads.
//! Session state must only ever be touched from the signaling task, so
//! every engine-side callback marshals an [`EngineEvent`] through an
//! [`EngineEventBridge`] instead of calling into the session directly.
//! One bridge exists per session; events from the same session are
//! delivered in dispatch order.

use tokio::sync::mpsc;
use tracing::debug;

/// Events produced on the engine's execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The local media session needs a fresh offer
    NegotiationNeeded,

    /// An offer was created and set as the local description; carries the
    /// serialized session description text
    OfferCreated {
        /// SDP text of the created offer
        sdp: String,
    },

    /// Offer creation failed
    OfferFailed {
        /// Failure description
        message: String,
    },

    /// A local ICE candidate was discovered
    IceCandidate {
        /// Media line index the candidate belongs to
        sdp_mline_index: u32,
        /// Candidate string
        candidate: String,
    },

    /// The pipeline bus reported an error
    BusError {
        /// Error description
        message: String,
    },

    /// The pipeline bus reported a warning
    BusWarning {
        /// Warning description
        message: String,
    },

    /// The pipeline reached end of stream
    EndOfStream,
}

impl EngineEvent {
    /// Event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::NegotiationNeeded => "negotiation_needed",
            Self::OfferCreated { .. } => "offer_created",
            Self::OfferFailed { .. } => "offer_failed",
            Self::IceCandidate { .. } => "ice_candidate",
            Self::BusError { .. } => "bus_error",
            Self::BusWarning { .. } => "bus_warning",
            Self::EndOfStream => "end_of_stream",
        }
    }
}

/// Thread-safe handoff from engine threads onto the signaling task
///
/// The channel is unbounded so a dispatch never blocks the originating
/// engine thread. When the session side has already shut down, events are
/// dropped silently.
#[derive(Debug, Clone)]
pub struct EngineEventBridge {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineEventBridge {
    /// Create a bridge together with the receiving end consumed by the
    /// session task
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver an event onto the signaling task
    ///
    /// Never blocks and never fails: if the session is gone the event is
    /// discarded.
    pub fn dispatch(&self, event: EngineEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!(event = e.0.name(), "session closed, dropping engine event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_dispatch_order() {
        let (bridge, mut rx) = EngineEventBridge::channel();
        bridge.dispatch(EngineEvent::NegotiationNeeded);
        bridge.dispatch(EngineEvent::IceCandidate {
            sdp_mline_index: 0,
            candidate: "a=candidate:1".to_string(),
        });
        bridge.dispatch(EngineEvent::EndOfStream);

        assert_eq!(rx.try_recv().unwrap(), EngineEvent::NegotiationNeeded);
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::IceCandidate { .. }
        ));
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::EndOfStream);
    }

    #[test]
    fn test_dispatch_after_receiver_dropped_is_silent() {
        let (bridge, rx) = EngineEventBridge::channel();
        drop(rx);
        // Must not panic or block.
        bridge.dispatch(EngineEvent::NegotiationNeeded);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(EngineEvent::NegotiationNeeded.name(), "negotiation_needed");
        assert_eq!(
            EngineEvent::BusError {
                message: "x".to_string()
            }
            .name(),
            "bus_error"
        );
    }
}
