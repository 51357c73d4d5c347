//! Signaling wire protocol types
//!
//! One JSON object per WebSocket text frame, discriminated by a `type`
//! field. There is no schema versioning; unknown or unparsable messages
//! are ignored by the receiver.

use serde::{Deserialize, Serialize};

/// An ICE candidate as exchanged over the signaling channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateInit {
    /// Opaque candidate string
    pub candidate: String,

    /// Media line index the candidate belongs to
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: u32,
}

/// A signaling message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    /// Greeting sent to the client right after the handshake
    Hello {
        /// Greeting text
        message: String,
    },

    /// Local session description offered to the client
    Offer {
        /// SDP text
        sdp: String,
    },

    /// Remote session description answering an offer
    Answer {
        /// SDP text
        sdp: String,
    },

    /// ICE candidate, exchanged in both directions
    Ice {
        /// The candidate payload
        ice: IceCandidateInit,
    },

    /// Client liveness probe
    Ping,

    /// Reply to a ping
    Pong,

    /// Client-requested renegotiation
    Ready,

    /// Error report sent to the client
    Error {
        /// Error description
        message: String,
    },
}

impl SignalMessage {
    /// Message kind for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Ice { .. } => "ice",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Ready => "ready",
            Self::Error { .. } => "error",
        }
    }
}
