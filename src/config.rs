//! Stream configuration
//!
//! One immutable [`StreamConfig`] is built from process arguments at
//! startup and shared read-only (`Arc`) across all sessions. Nothing in it
//! is mutated after a session has been created.

use serde::{Deserialize, Serialize};

/// Largest accepted frame edge, 8K UHD. Keeps dimensions well inside the
/// signed 32-bit range the caps fields are built from.
pub const MAX_DIMENSION: u32 = 7680;

/// Video source kind for the capture stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Camera-native capture via `libcamerasrc` (default)
    Libcamera,
    /// Generic capture device via `v4l2src`
    V4l2,
    /// Synthetic test pattern via `videotestsrc`
    Test,
}

impl SourceKind {
    /// The GStreamer element factory backing this source kind
    pub fn factory(&self) -> &'static str {
        match self {
            SourceKind::Libcamera => "libcamerasrc",
            SourceKind::V4l2 => "v4l2src",
            SourceKind::Test => "videotestsrc",
        }
    }
}

/// Immutable per-process stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Video width in pixels
    pub width: u32,

    /// Video height in pixels
    pub height: u32,

    /// Frames per second
    pub fps: u32,

    /// Target bitrate in bits per second
    pub bitrate: u32,

    /// STUN server URI, e.g. `stun://stun.l.google.com:19302` (optional)
    pub stun_server: Option<String>,

    /// Capture source kind
    pub source: SourceKind,

    /// Capture device path when `source` is [`SourceKind::V4l2`],
    /// e.g. `/dev/video0`
    pub device: Option<String>,

    /// Force the software encoder even when a hardware encoder is present
    pub force_software: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            bitrate: 2_500_000,
            stun_server: None,
            source: SourceKind::Libcamera,
            device: None,
            force_software: false,
        }
    }
}

impl StreamConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if any dimension, the frame
    /// rate or the bitrate is zero, or if a dimension exceeds
    /// [`MAX_DIMENSION`].
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "frame size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }

        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(Error::InvalidConfig(format!(
                "frame size must be at most {MAX_DIMENSION}x{MAX_DIMENSION}, got {}x{}",
                self.width, self.height
            )));
        }

        if self.fps == 0 {
            return Err(Error::InvalidConfig(
                "frame rate must be non-zero".to_string(),
            ));
        }

        if self.bitrate == 0 {
            return Err(Error::InvalidConfig(
                "bitrate must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.source, SourceKind::Libcamera);
    }

    #[test]
    fn test_zero_dimensions_fail() {
        let config = StreamConfig {
            width: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StreamConfig {
            height: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_dimensions_fail() {
        let config = StreamConfig {
            width: MAX_DIMENSION + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StreamConfig {
            height: u32::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StreamConfig {
            width: MAX_DIMENSION,
            height: MAX_DIMENSION,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_fps_fails() {
        let config = StreamConfig {
            fps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_bitrate_fails() {
        let config = StreamConfig {
            bitrate: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_source_factories() {
        assert_eq!(SourceKind::Libcamera.factory(), "libcamerasrc");
        assert_eq!(SourceKind::V4l2.factory(), "v4l2src");
        assert_eq!(SourceKind::Test.factory(), "videotestsrc");
    }

    #[test]
    fn test_config_serialization() {
        let config = StreamConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: StreamConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.width, deserialized.width);
        assert_eq!(config.source, deserialized.source);
    }
}
