//! WebSocket signaling server
//!
//! Plain accept loop: one spawned task per connection, each running
//! [`handler::handle_connection`] to completion.

use crate::config::StreamConfig;
use crate::signaling::handler;
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// WebSocket signaling server bound to one address
pub struct SignalingServer {
    addr: SocketAddr,
    config: Arc<StreamConfig>,
}

impl SignalingServer {
    /// Create a server serving sessions configured by `config`
    pub fn new(addr: SocketAddr, config: Arc<StreamConfig>) -> Self {
        Self { addr, config }
    }

    /// Accept connections forever
    ///
    /// # Errors
    ///
    /// Returns an I/O error when binding or accepting fails.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "signaling server listening");

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let config = Arc::clone(&self.config);
            tokio::spawn(async move {
                if let Err(e) = handler::handle_connection(stream, config).await {
                    warn!(%peer_addr, "connection ended with error: {e}");
                }
            });
        }
    }
}
