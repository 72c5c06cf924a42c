//! Relay WebSocket server.
//!
//! Listens on a TCP port, answers the health probe, upgrades everything
//! else to WebSocket and registers each connection as a new peer.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use peerdrop_protocol::constants::{DEFAULT_RELAY_PORT, MessageType, WS_MAX_MESSAGE_SIZE};
use peerdrop_protocol::envelope::Message;
use peerdrop_protocol::messages::Welcome;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async_with_config;
use tokio_util::sync::CancellationToken;

use crate::RelayError;
use crate::connection;
use crate::health;
use crate::registry::PeerRegistry;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_RELAY_PORT,
        }
    }
}

/// The signaling relay.
///
/// Owns the [`PeerRegistry`]; every accepted WebSocket becomes one peer.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<PeerRegistry>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: Arc::new(PeerRegistry::new()),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// The live peer table.
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Gracefully shuts down the server and every peer connection.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), RelayError> {
        let addr = SocketAddr::new(self.config.bind, self.config.port);
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("signaling relay listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("relay shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::error!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Handles a single TCP connection: health probe or WS peer session.
    async fn handle_connection(
        self: &Arc<Self>,
        mut stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), RelayError> {
        if health::is_health_probe(&stream).await? {
            tracing::debug!(%peer_addr, "health probe");
            return health::respond(&mut stream).await;
        }

        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;

        let peer_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(%peer_addr, peer = %peer_id, "peer connected");

        // The peer learns its own id before the first presence broadcast.
        let welcome = Message::new(MessageType::Welcome, Some(&Welcome { peer_id: peer_id.clone() }))?;
        if let Err(e) = connection::spawn_connection(
            ws_stream,
            peer_id.clone(),
            &welcome,
            Arc::clone(&self.registry),
            self.cancel.clone(),
        ) {
            tracing::warn!(peer = %peer_id, "could not queue welcome: {e}");
        }

        Ok(())
    }
}
