//! Camera streaming server binary entry point
//!
//! # Usage
//!
//! ```bash
//! # Stream the default camera at 720p30
//! camline-server
//!
//! # Synthetic test pattern with a STUN server
//! camline-server --source test --stun stun://stun.l.google.com:19302
//!
//! # A specific V4L2 device, software encoding forced
//! camline-server --source v4l2 --device /dev/video0 --force-software
//! ```

use camline::{pipeline, SignalingServer, SourceKind, StreamConfig};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// WebRTC camera streaming server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind host
    #[arg(long, default_value = "0.0.0.0", env = "CAMLINE_HOST")]
    host: String,

    /// WebSocket signaling port
    #[arg(long, default_value_t = 8082, env = "CAMLINE_PORT")]
    port: u16,

    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Target bitrate in bits per second
    #[arg(long, default_value_t = 2_500_000)]
    bitrate: u32,

    /// STUN server URI, e.g. stun://stun.l.google.com:19302
    #[arg(long, env = "STUN_SERVER")]
    stun: Option<String>,

    /// Video source
    #[arg(long, value_enum, default_value = "libcamera", env = "VIDEO_SOURCE")]
    source: SourceArg,

    /// V4L2 device path when --source v4l2, e.g. /dev/video0
    #[arg(long, env = "V4L2_DEVICE")]
    device: Option<String>,

    /// Force the software encoder (x264enc)
    #[arg(long, default_value_t = false)]
    force_software: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum SourceArg {
    /// Camera-native capture (libcamerasrc)
    Libcamera,
    /// Generic capture device (v4l2src)
    V4l2,
    /// Synthetic test pattern (videotestsrc)
    Test,
}

impl From<SourceArg> for SourceKind {
    fn from(source: SourceArg) -> Self {
        match source {
            SourceArg::Libcamera => SourceKind::Libcamera,
            SourceArg::V4l2 => SourceKind::V4l2,
            SourceArg::Test => SourceKind::Test,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing();

    info!(version = camline::version(), "camline server starting");

    pipeline::init()?;

    let config = StreamConfig {
        width: args.width,
        height: args.height,
        fps: args.fps,
        bitrate: args.bitrate,
        stun_server: args.stun.filter(|s| !s.is_empty()),
        source: args.source.into(),
        device: args.device.filter(|d| !d.is_empty()),
        force_software: args.force_software,
    };
    config.validate()?;

    info!(
        width = config.width,
        height = config.height,
        fps = config.fps,
        bitrate = config.bitrate,
        source = ?config.source,
        force_software = config.force_software,
        "configuration loaded"
    );

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let server = SignalingServer::new(addr, Arc::new(config));

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    pipeline::shutdown();
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
