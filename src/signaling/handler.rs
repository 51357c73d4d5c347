//! Per-connection session lifecycle
//!
//! Ties one WebSocket connection to one [`Session`] and one pipeline:
//! greeting on connect, pipeline build + start (a failure is reported but
//! keeps the connection open so the signaling exchange stays observable),
//! then a select loop funnelling inbound frames and bridged engine events
//! into the session. Teardown runs on every exit path: `close()` after
//! the loop, backstopped by the pipeline's `Drop`.

use crate::bridge::EngineEventBridge;
use crate::config::StreamConfig;
use crate::pipeline::VideoPipeline;
use crate::session::Session;
use crate::signaling::protocol::SignalMessage;
use crate::{Error, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Interval of server-initiated protocol pings, for dead-peer detection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single signaling connection from accept to teardown
pub async fn handle_connection(stream: TcpStream, config: Arc<StreamConfig>) -> Result<()> {
    handle_connection_with_heartbeat(stream, config, HEARTBEAT_INTERVAL).await
}

async fn handle_connection_with_heartbeat(
    stream: TcpStream,
    config: Arc<StreamConfig>,
    heartbeat_interval: Duration,
) -> Result<()> {
    let peer_addr = stream.peer_addr()?;
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| Error::WebSocket(e.to_string()))?;
    info!(%peer_addr, "client connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // All outbound traffic goes through one channel so ordering is FIFO
    // and engine threads never touch the sink. The forward task also owns
    // the heartbeat so protocol pings keep flowing while the peer idles;
    // a peer that stopped reading fails the send and ends the connection.
    let (out_tx, mut out_rx) = mpsc::channel::<SignalMessage>(64);
    let forward_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                outbound = out_rx.recv() => {
                    let Some(message) = outbound else { break };
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("failed to serialize outbound message: {e}");
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut session = Session::new(out_tx.clone());
    if out_tx
        .send(SignalMessage::Hello {
            message: "ws-ready".to_string(),
        })
        .await
        .is_err()
    {
        warn!(%peer_addr, "connection closed before greeting");
    }

    // The bridge handle is kept alive for the whole connection so the
    // event receiver never reports closure while the loop runs.
    let (bridge, mut events) = EngineEventBridge::channel();

    match VideoPipeline::build(&config, bridge.clone()).and_then(|pipeline| {
        pipeline.start()?;
        Ok(pipeline)
    }) {
        Ok(pipeline) => {
            info!(
                session = %session.id(),
                encoder = %pipeline.encoder(),
                "pipeline started"
            );
            session.attach_engine(Box::new(pipeline));
        }
        Err(e) => {
            // The session stays up without media so the signaling exchange
            // remains debuggable.
            error!(session = %session.id(), "camera start failed: {e}");
            session.send_error(format!("Camera start failed: {e}")).await;
        }
    }

    loop {
        tokio::select! {
            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Text(text))) => session.handle_text(&text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong/binary frames, handled by tungstenite
                Some(Err(e)) => {
                    warn!(session = %session.id(), "websocket error: {e}");
                    break;
                }
            },
            Some(event) = events.recv() => {
                debug!(session = %session.id(), event = event.name(), "engine event");
                session.handle_engine_event(event).await;
            }
        }
    }

    session.close();
    forward_task.abort();
    info!(%peer_addr, "client disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceKind;
    use tokio::net::TcpListener;

    // The server must probe idle peers on its own; a client that never
    // writes still gets protocol pings on the heartbeat interval.
    #[tokio::test]
    async fn test_idle_clients_receive_protocol_pings() {
        let _ = crate::pipeline::init();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = Arc::new(StreamConfig {
            source: SourceKind::Test,
            force_software: true,
            ..Default::default()
        });

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ =
                handle_connection_with_heartbeat(stream, config, Duration::from_millis(50)).await;
        });

        let tcp = TcpStream::connect(addr).await.unwrap();
        let (mut ws, _) = tokio_tungstenite::client_async(format!("ws://{addr}/ws"), tcp)
            .await
            .unwrap();

        // The greeting and a possible camera error come first; a ping must
        // follow within a few heartbeat periods.
        let mut saw_ping = false;
        for _ in 0..20 {
            let frame = tokio::time::timeout(Duration::from_secs(1), ws.next()).await;
            match frame {
                Ok(Some(Ok(Message::Ping(_)))) => {
                    saw_ping = true;
                    break;
                }
                Ok(Some(Ok(_))) => {}
                _ => break,
            }
        }
        assert!(saw_ping, "no protocol ping within the heartbeat window");

        let _ = ws.close(None).await;
        server.abort();
    }
}
