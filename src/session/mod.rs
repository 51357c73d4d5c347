//! Per-connection session and negotiation state machine
//!
//! One [`Session`] exists per signaling connection. It owns the pipeline
//! handle exclusively and reacts to two trigger sources, both delivered on
//! the signaling task: remote [`SignalMessage`]s from the channel and
//! local [`EngineEvent`]s marshalled over the bridge. Every reaction is a
//! pipeline command, an outbound message, a state transition, or some
//! combination of the three.

use crate::bridge::EngineEvent;
use crate::pipeline::EngineHandle;
use crate::signaling::protocol::{IceCandidateInit, SignalMessage};
use crate::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Negotiation state of one session
///
/// `AnswerApplied` is the practical "negotiated" terminal state; there is
/// no ICE-connection-state tracking, so `Connected` is never entered by
/// the state machine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// No negotiation has started
    Idle,
    /// An offer was requested from the engine
    OfferPending,
    /// The offer was sent to the remote peer
    OfferSent,
    /// The remote answer was applied to the engine
    AnswerApplied,
    /// Reserved for ICE-level connectivity tracking; not entered
    Connected,
    /// The engine reported a fatal error
    Failed,
    /// The session was torn down
    Closed,
}

impl NegotiationState {
    /// State name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::OfferPending => "offer_pending",
            Self::OfferSent => "offer_sent",
            Self::AnswerApplied => "answer_applied",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

/// One signaling connection's negotiation state machine
pub struct Session {
    id: Uuid,
    state: NegotiationState,
    engine: Option<Box<dyn EngineHandle>>,
    outbound: mpsc::Sender<SignalMessage>,
}

impl Session {
    /// Create an idle session publishing outbound messages on `outbound`
    pub fn new(outbound: mpsc::Sender<SignalMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: NegotiationState::Idle,
            engine: None,
            outbound,
        }
    }

    /// Unique session identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current negotiation state
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Whether a pipeline is attached
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Attach the session's pipeline handle
    ///
    /// At most one pipeline exists per session; attaching replaces nothing
    /// because it only happens once, right after construction.
    pub fn attach_engine(&mut self, engine: Box<dyn EngineHandle>) {
        self.engine = Some(engine);
    }

    /// Handle one inbound text frame; unparsable frames are ignored
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<SignalMessage>(text) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => debug!(session = %self.id, "ignoring unparsable message: {e}"),
        }
    }

    /// Handle one inbound signaling message
    pub async fn handle_message(&mut self, message: SignalMessage) {
        match message {
            SignalMessage::Answer { sdp } => self.handle_answer(&sdp).await,
            SignalMessage::Ice { ice } => self.handle_remote_candidate(ice),
            SignalMessage::Ping => self.send(SignalMessage::Pong).await,
            SignalMessage::Ready => self.handle_ready(),
            other => {
                debug!(
                    session = %self.id,
                    kind = other.kind(),
                    "ignoring unexpected client message"
                );
            }
        }
    }

    /// Handle one engine event delivered over the bridge
    pub async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::NegotiationNeeded => {
                // Each trigger produces exactly one offer request, whatever
                // the current state.
                if let Some(engine) = &self.engine {
                    debug!(session = %self.id, "negotiation needed, requesting offer");
                    engine.request_offer();
                    self.transition(NegotiationState::OfferPending);
                }
            }
            EngineEvent::OfferCreated { sdp } => {
                info!(session = %self.id, "offer created, sending to peer");
                self.send(SignalMessage::Offer { sdp }).await;
                self.transition(NegotiationState::OfferSent);
            }
            EngineEvent::OfferFailed { message } => {
                error!(session = %self.id, "offer creation failed: {message}");
                self.send_error(format!("Offer error: {message}")).await;
            }
            EngineEvent::IceCandidate {
                sdp_mline_index,
                candidate,
            } => {
                self.send(SignalMessage::Ice {
                    ice: IceCandidateInit {
                        candidate,
                        sdp_mline_index,
                    },
                })
                .await;
            }
            EngineEvent::BusError { message } => {
                let err = Error::EngineRuntime(message);
                error!(session = %self.id, "{err}");
                self.send_error(err.to_string()).await;
                self.transition(NegotiationState::Failed);
            }
            EngineEvent::BusWarning { message } => {
                warn!(session = %self.id, "engine warning: {message}");
            }
            EngineEvent::EndOfStream => {
                info!(session = %self.id, "engine reached end of stream");
            }
        }
    }

    /// Send an `error` message to the remote peer
    pub async fn send_error(&self, message: String) {
        self.send(SignalMessage::Error { message }).await;
    }

    /// Stop the pipeline and mark the session closed; safe to call twice
    pub fn close(&mut self) {
        if self.state == NegotiationState::Closed {
            return;
        }
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
        }
        self.transition(NegotiationState::Closed);
        info!(session = %self.id, "session closed");
    }

    async fn handle_answer(&mut self, sdp: &str) {
        let Some(engine) = &self.engine else {
            debug!(session = %self.id, "answer received with no pipeline, ignoring");
            return;
        };
        match engine.apply_answer(sdp) {
            Ok(()) => {
                info!(session = %self.id, "remote answer applied");
                self.transition(NegotiationState::AnswerApplied);
            }
            Err(e) if e.is_recoverable() => {
                // The peer may resend a corrected answer, so the state is
                // left untouched.
                warn!(session = %self.id, "rejecting answer: {e}");
                self.send_error(format!("SDP answer error: {e}")).await;
            }
            Err(e) => {
                error!(session = %self.id, "applying answer failed: {e}");
                self.send_error(format!("SDP answer error: {e}")).await;
                self.transition(NegotiationState::Failed);
            }
        }
    }

    fn handle_remote_candidate(&mut self, ice: IceCandidateInit) {
        match &self.engine {
            // Candidates are forwarded in arrival order, without
            // deduplication.
            Some(engine) => engine.add_remote_candidate(ice.sdp_mline_index, &ice.candidate),
            None => {
                debug!(session = %self.id, "no pipeline yet, dropping remote candidate");
            }
        }
    }

    fn handle_ready(&mut self) {
        // Manual renegotiation, valid from any state including a completed
        // negotiation. A session whose pipeline never started has nothing
        // to renegotiate.
        if let Some(engine) = &self.engine {
            info!(session = %self.id, "peer ready, renegotiating");
            engine.request_offer();
            self.transition(NegotiationState::OfferPending);
        }
    }

    async fn send(&self, message: SignalMessage) {
        if self.outbound.send(message).await.is_err() {
            debug!(session = %self.id, "outbound channel closed, dropping message");
        }
    }

    fn transition(&mut self, next: NegotiationState) {
        if self.state != next {
            debug!(
                session = %self.id,
                from = self.state.as_str(),
                to = next.as_str(),
                "state transition"
            );
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(NegotiationState::Idle.as_str(), "idle");
        assert_eq!(NegotiationState::OfferSent.as_str(), "offer_sent");
        assert_eq!(NegotiationState::Closed.as_str(), "closed");
    }

    #[tokio::test]
    async fn test_new_session_is_idle_without_engine() {
        let (tx, _rx) = mpsc::channel(8);
        let session = Session::new(tx);
        assert_eq!(session.state(), NegotiationState::Idle);
        assert!(!session.has_engine());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (tx, _rx) = mpsc::channel(8);
        let mut session = Session::new(tx);
        session.close();
        session.close();
        assert_eq!(session.state(), NegotiationState::Closed);
    }
}
