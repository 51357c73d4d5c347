//! GStreamer video pipeline
//!
//! Builds the fixed streaming graph
//!
//! ```text
//! source → capsfilter(WxH@fps) → videoconvert → videoscale
//!        → capsfilter(NV12|I420) → queue → H.264 encoder
//!        → h264parse → rtph264pay → webrtcbin
//! ```
//!
//! and exposes it through the [`EngineHandle`] trait. WebRTC signals and
//! bus messages are marshalled through the per-session
//! [`EngineEventBridge`]; no session state is touched from engine threads.

use crate::bridge::{EngineEvent, EngineEventBridge};
use crate::config::{SourceKind, StreamConfig};
use crate::pipeline::EngineHandle;
use crate::{Error, Result};
use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use gstreamer_sdp as gst_sdp;
use gstreamer_webrtc as gst_webrtc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long the bus thread parks between shutdown-flag checks.
const BUS_POLL_INTERVAL_MS: u64 = 100;

/// Which encoder variant was selected at build time
///
/// Resolved once during [`VideoPipeline::build`] and recorded for
/// diagnostic reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    /// Hardware-accelerated `v4l2h264enc`
    Hardware,
    /// Software `x264enc`
    Software,
}

impl std::fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderKind::Hardware => write!(f, "v4l2h264enc (hardware)"),
            EncoderKind::Software => write!(f, "x264enc (software)"),
        }
    }
}

/// The x264enc bitrate property is in kilobits per second, floored to at
/// least 1; the configured bitrate is bits per second.
pub(crate) fn software_bitrate_kbps(bitrate_bps: u32) -> u32 {
    (bitrate_bps / 1000).max(1)
}

/// A built (and possibly playing) streaming pipeline for one session
pub struct VideoPipeline {
    pipeline: Option<gst::Pipeline>,
    webrtc: gst::Element,
    bridge: EngineEventBridge,
    encoder: EncoderKind,
    bus_thread: Option<JoinHandle<()>>,
    bus_shutdown: Arc<AtomicBool>,
}

impl VideoPipeline {
    /// Construct the streaming graph for `config`
    ///
    /// Fails fast with [`Error::CapabilityMissing`] when a required
    /// element is absent on the host, or [`Error::PipelineBuild`] on a
    /// structural failure. On error nothing is left reachable; the
    /// partially built graph is released before returning.
    pub fn build(config: &StreamConfig, bridge: EngineEventBridge) -> Result<Self> {
        // Preflight: fail before assembling anything when the host lacks a
        // required capability.
        require_factory(
            "nicesrc",
            "install gstreamer1.0-nice and libnice",
        )?;
        require_factory(
            "nicesink",
            "install gstreamer1.0-nice and libnice",
        )?;
        require_factory(
            "dtlssrtpenc",
            "install gstreamer1.0-plugins-bad",
        )?;
        require_factory(
            "webrtcbin",
            "install gstreamer1.0-plugins-bad",
        )?;

        let src = make_source(config)?;

        let caps_src = make_element("capsfilter", "caps_src")?;
        caps_src.set_property(
            "caps",
            gst::Caps::builder("video/x-raw")
                .field("width", config.width as i32)
                .field("height", config.height as i32)
                .field("framerate", gst::Fraction::new(config.fps as i32, 1))
                .build(),
        );

        let convert = make_element("videoconvert", "convert")?;
        let scale = make_element("videoscale", "scale")?;

        let (encoder, encoder_kind) = select_encoder(config)?;

        // The two encoder paths expect different input pixel formats.
        let caps_enc = make_element("capsfilter", "caps_pre_enc")?;
        let pre_encode_format = match encoder_kind {
            EncoderKind::Hardware => "NV12",
            EncoderKind::Software => "I420",
        };
        caps_enc.set_property(
            "caps",
            gst::Caps::builder("video/x-raw")
                .field("format", pre_encode_format)
                .build(),
        );

        let queue = make_element("queue", "queue_enc")?;

        let parse = make_element("h264parse", "parse")?;
        set_if_supported(&parse, "config-interval", 1i32);

        let pay = make_element("rtph264pay", "pay0")?;
        pay.set_property("pt", 96u32);
        set_if_supported(&pay, "config-interval", 1i32);

        let webrtc = make_element("webrtcbin", "webrtcbin")?;
        if let Some(stun) = &config.stun_server {
            webrtc.set_property("stun-server", stun);
        }

        let pipeline = gst::Pipeline::with_name("camline-pipeline");
        pipeline
            .add_many([
                &src, &caps_src, &convert, &scale, &caps_enc, &queue, &encoder, &parse, &pay,
                &webrtc,
            ])
            .map_err(|e| Error::PipelineBuild(format!("failed to add elements: {e}")))?;

        gst::Element::link_many([
            &src, &caps_src, &convert, &scale, &caps_enc, &queue, &encoder, &parse, &pay,
        ])
        .map_err(|e| Error::PipelineBuild(format!("failed to link element chain: {e}")))?;

        let pay_src = pay
            .static_pad("src")
            .ok_or_else(|| Error::PipelineBuild("payloader has no src pad".to_string()))?;
        let webrtc_sink = webrtc
            .request_pad_simple("sink_%u")
            .ok_or_else(|| Error::PipelineBuild("webrtcbin refused a sink pad".to_string()))?;
        pay_src.link(&webrtc_sink).map_err(|e| {
            Error::PipelineBuild(format!("failed to link payloader to webrtcbin: {e:?}"))
        })?;

        let neg_bridge = bridge.clone();
        webrtc.connect("on-negotiation-needed", false, move |_| {
            debug!("negotiation needed");
            neg_bridge.dispatch(EngineEvent::NegotiationNeeded);
            None
        });

        let ice_bridge = bridge.clone();
        webrtc.connect("on-ice-candidate", false, move |values| {
            match (values[1].get::<u32>(), values[2].get::<String>()) {
                (Ok(sdp_mline_index), Ok(candidate)) => {
                    ice_bridge.dispatch(EngineEvent::IceCandidate {
                        sdp_mline_index,
                        candidate,
                    });
                }
                _ => error!("on-ice-candidate fired with unexpected argument types"),
            }
            None
        });

        // Dedicated bus dispatch thread. Flushing the bus does not wake a
        // parked reader, so the loop polls on a finite timeout and exits
        // when stop() raises the shutdown flag.
        let bus = pipeline
            .bus()
            .ok_or_else(|| Error::PipelineBuild("pipeline has no bus".to_string()))?;
        let bus_bridge = bridge.clone();
        let bus_shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&bus_shutdown);
        let bus_thread = std::thread::Builder::new()
            .name("gst-bus".to_string())
            .spawn(move || run_bus_loop(bus, bus_bridge, thread_shutdown))
            .map_err(|e| Error::PipelineBuild(format!("failed to spawn bus thread: {e}")))?;

        info!(
            source = config.source.factory(),
            encoder = %encoder_kind,
            format = pre_encode_format,
            "pipeline built"
        );

        Ok(Self {
            pipeline: Some(pipeline),
            webrtc,
            bridge,
            encoder: encoder_kind,
            bus_thread: Some(bus_thread),
            bus_shutdown,
        })
    }

    /// Transition the graph to the playing state
    ///
    /// # Errors
    ///
    /// [`Error::PipelineStart`] when the engine refuses the transition.
    pub fn start(&self) -> Result<()> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| Error::PipelineStart("pipeline already stopped".to_string()))?;
        pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| Error::PipelineStart("pipeline refused PLAYING state".to_string()))?;
        info!(encoder = %self.encoder, "pipeline playing");
        Ok(())
    }

    /// Which encoder variant this pipeline was built with
    pub fn encoder(&self) -> EncoderKind {
        self.encoder
    }

    fn release(&mut self) {
        let Some(pipeline) = self.pipeline.take() else {
            return;
        };
        // Raise the flag before touching the bus so the thread exits on
        // its next poll regardless of what the NULL transition posts.
        self.bus_shutdown.store(true, Ordering::Release);
        if let Err(e) = pipeline.set_state(gst::State::Null) {
            warn!("failed to reach NULL state on stop: {e}");
        }
        if let Some(bus) = pipeline.bus() {
            bus.set_flushing(true);
        }
        if let Some(handle) = self.bus_thread.take() {
            if handle.join().is_err() {
                warn!("bus dispatch thread panicked");
            }
        }
        info!("pipeline stopped");
    }
}

impl EngineHandle for VideoPipeline {
    fn request_offer(&self) {
        if self.pipeline.is_none() {
            return;
        }
        debug!("creating offer");
        let webrtc = self.webrtc.clone();
        let bridge = self.bridge.clone();
        let promise = gst::Promise::with_change_func(move |reply| {
            let structure = match reply {
                Ok(Some(structure)) => structure,
                Ok(None) => {
                    bridge.dispatch(EngineEvent::OfferFailed {
                        message: "create-offer returned an empty reply".to_string(),
                    });
                    return;
                }
                Err(e) => {
                    bridge.dispatch(EngineEvent::OfferFailed {
                        message: format!("create-offer failed: {e:?}"),
                    });
                    return;
                }
            };
            let offer = match structure.get::<gst_webrtc::WebRTCSessionDescription>("offer") {
                Ok(offer) => offer,
                Err(e) => {
                    bridge.dispatch(EngineEvent::OfferFailed {
                        message: format!("offer reply carried no description: {e}"),
                    });
                    return;
                }
            };
            // Local description is applied here, on the engine context;
            // the session only sees the serialized text.
            webrtc.emit_by_name::<()>("set-local-description", &[&offer, &None::<gst::Promise>]);
            match offer.sdp().as_text() {
                Ok(sdp) => bridge.dispatch(EngineEvent::OfferCreated { sdp }),
                Err(e) => bridge.dispatch(EngineEvent::OfferFailed {
                    message: format!("failed to serialize offer: {e}"),
                }),
            }
        });
        self.webrtc
            .emit_by_name::<()>("create-offer", &[&None::<gst::Structure>, &promise]);
    }

    fn apply_answer(&self, sdp: &str) -> Result<()> {
        if self.pipeline.is_none() {
            return Ok(());
        }
        let message = gst_sdp::SDPMessage::parse_buffer(sdp.as_bytes())
            .map_err(|_| Error::SdpParse("malformed SDP answer".to_string()))?;
        let answer =
            gst_webrtc::WebRTCSessionDescription::new(gst_webrtc::WebRTCSDPType::Answer, message);
        self.webrtc
            .emit_by_name::<()>("set-remote-description", &[&answer, &None::<gst::Promise>]);
        debug!("remote description applied");
        Ok(())
    }

    fn add_remote_candidate(&self, sdp_mline_index: u32, candidate: &str) {
        if self.pipeline.is_none() {
            return;
        }
        self.webrtc
            .emit_by_name::<()>("add-ice-candidate", &[&sdp_mline_index, &candidate]);
    }

    fn stop(&mut self) {
        self.release();
    }
}

impl Drop for VideoPipeline {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_bus_loop(bus: gst::Bus, bridge: EngineEventBridge, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Acquire) {
        let Some(message) = bus.timed_pop(gst::ClockTime::from_mseconds(BUS_POLL_INTERVAL_MS))
        else {
            continue;
        };
        match message.view() {
            gst::MessageView::Error(err) => {
                error!(
                    source = err.src().map(|s| s.path_string().to_string()),
                    debug = err.debug().map(|d| d.to_string()),
                    "bus error: {}",
                    err.error()
                );
                bridge.dispatch(EngineEvent::BusError {
                    message: err.error().to_string(),
                });
            }
            gst::MessageView::Warning(w) => {
                warn!(
                    debug = w.debug().map(|d| d.to_string()),
                    "bus warning: {}",
                    w.error()
                );
                bridge.dispatch(EngineEvent::BusWarning {
                    message: w.error().to_string(),
                });
            }
            gst::MessageView::Eos(_) => {
                bridge.dispatch(EngineEvent::EndOfStream);
            }
            _ => {}
        }
    }
}

fn require_factory(name: &str, hint: &str) -> Result<()> {
    if gst::ElementFactory::find(name).is_none() {
        return Err(Error::CapabilityMissing {
            element: name.to_string(),
            hint: hint.to_string(),
        });
    }
    Ok(())
}

fn make_element(factory: &str, name: &str) -> Result<gst::Element> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|_| Error::PipelineBuild(format!("failed to create element '{factory}'")))
}

fn make_source(config: &StreamConfig) -> Result<gst::Element> {
    let factory = config.source.factory();
    let hint = match config.source {
        SourceKind::Libcamera => "install gstreamer1.0-libcamera",
        SourceKind::V4l2 => "install gstreamer1.0-plugins-good",
        SourceKind::Test => "install gstreamer1.0-plugins-base",
    };
    require_factory(factory, hint)?;
    let src = make_element(factory, "src")?;
    match config.source {
        SourceKind::V4l2 => {
            if let Some(device) = &config.device {
                src.set_property("device", device);
            }
        }
        SourceKind::Test => {
            src.set_property("is-live", true);
            src.set_property_from_str("pattern", "smpte");
        }
        SourceKind::Libcamera => {}
    }
    Ok(src)
}

/// Encoder selection: hardware first unless forced off, software fallback.
///
/// The hardware path takes the bitrate in bits per second (best-effort,
/// the property is not exposed by every driver); the software path takes
/// kilobits per second plus zero-latency tuning.
fn select_encoder(config: &StreamConfig) -> Result<(gst::Element, EncoderKind)> {
    if !config.force_software {
        if let Ok(enc) = gst::ElementFactory::make("v4l2h264enc").name("enc").build() {
            set_if_supported(&enc, "bitrate", config.bitrate);
            return Ok((enc, EncoderKind::Hardware));
        }
        debug!("v4l2h264enc unavailable, falling back to software encoder");
    }

    let enc = gst::ElementFactory::make("x264enc")
        .name("enc")
        .build()
        .map_err(|_| Error::CapabilityMissing {
            element: "x264enc".to_string(),
            hint: "install gstreamer1.0-plugins-ugly, or provide v4l2h264enc".to_string(),
        })?;
    enc.set_property("bitrate", software_bitrate_kbps(config.bitrate));
    enc.set_property_from_str("tune", "zerolatency");
    enc.set_property_from_str("speed-preset", "ultrafast");
    enc.set_property("key-int-max", (config.fps * 2).max(1));
    Ok((enc, EncoderKind::Software))
}

/// Best-effort property set: skipped with a log line when the element does
/// not expose the property, never silently.
fn set_if_supported<V: glib::value::ToValue>(element: &gst::Element, name: &str, value: V) {
    if element.find_property(name).is_some() {
        element.set_property(name, value.to_value());
    } else {
        debug!(
            element = element.name().to_string(),
            property = name,
            "property not supported, skipping"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_bitrate_floor_division() {
        assert_eq!(software_bitrate_kbps(2_500_000), 2500);
        assert_eq!(software_bitrate_kbps(2_999_999), 2999);
    }

    #[test]
    fn test_software_bitrate_minimum_is_one() {
        assert_eq!(software_bitrate_kbps(500), 1);
        assert_eq!(software_bitrate_kbps(999), 1);
        assert_eq!(software_bitrate_kbps(1000), 1);
    }

    #[test]
    fn test_encoder_kind_display() {
        assert_eq!(EncoderKind::Hardware.to_string(), "v4l2h264enc (hardware)");
        assert_eq!(EncoderKind::Software.to_string(), "x264enc (software)");
    }

    // A flushed bus does not wake a parked reader, so the loop must leave
    // on the flag alone even when the bus never carries a message.
    #[test]
    fn test_bus_loop_exits_once_shutdown_is_flagged() {
        gst::init().unwrap();
        let bus = gst::Bus::new();
        let (bridge, _rx) = EngineEventBridge::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::spawn(move || run_bus_loop(bus, bridge, flag));

        std::thread::sleep(std::time::Duration::from_millis(20));
        shutdown.store(true, Ordering::Release);
        handle.join().unwrap();
    }
}
