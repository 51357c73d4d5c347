//! Error types for the camera streaming server

/// Result type alias using the crate-wide [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, negotiating or running a stream
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required GStreamer capability is absent on the host.
    ///
    /// Fatal to pipeline construction; the hint names the package that
    /// provides the missing element.
    #[error("missing capability '{element}': {hint}")]
    CapabilityMissing {
        /// Name of the missing element factory
        element: String,
        /// Human-readable remediation hint
        hint: String,
    },

    /// Pipeline construction or linking failed for a structural reason
    #[error("pipeline build failed: {0}")]
    PipelineBuild(String),

    /// The engine refused the transition to the playing state
    #[error("pipeline start failed: {0}")]
    PipelineStart(String),

    /// Malformed remote session description; recoverable, the session
    /// keeps its prior negotiation state
    #[error("SDP parse error: {0}")]
    SdpParse(String),

    /// Bus-reported engine error during operation
    #[error("engine runtime error: {0}")]
    EngineRuntime(String),

    /// Invalid configuration parameter
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// WebSocket transport error
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the session can keep negotiating after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::SdpParse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_missing_display_names_element_and_hint() {
        let err = Error::CapabilityMissing {
            element: "webrtcbin".to_string(),
            hint: "install gstreamer1.0-plugins-bad".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("webrtcbin"));
        assert!(text.contains("gstreamer1.0-plugins-bad"));
    }

    #[test]
    fn test_sdp_parse_is_recoverable() {
        assert!(Error::SdpParse("truncated".to_string()).is_recoverable());
        assert!(!Error::PipelineStart("no camera".to_string()).is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
