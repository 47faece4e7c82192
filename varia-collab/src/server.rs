//! WebSocket transport for the sync engine.
//!
//! Architecture:
//! ```text
//! Client A ──┐                      ┌── joinWorkspace / edits ──► SyncEngine
//!             ├── connection task ──┤
//! Client B ──┘   (one per socket)   └── outbox (bounded) ◄──── BroadcastRouter
//! ```
//!
//! Each connection task pumps two directions: inbound text frames are decoded
//! into `ClientEvent`s and queued for the session's handler task, outbound
//! frames queued for the session are written to the socket. The handler task
//! runs the session's events one at a time in arrival order, so a slow edit
//! (project lock, gateway I/O) never stops the outbox from draining. When the
//! socket closes the queued events are finished, then the session is removed
//! from every room and registry.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::config::ServerConfig;
use crate::engine::SyncEngine;
use crate::gateway::{MemoryGateway, PersistenceGateway, ProjectStore, StoreConfig, StoreError};
use crate::protocol::ClientEvent;
use crate::router::Frame;
use crate::session::SessionId;

/// Decoded events of one session waiting for its handler task.
const INBOUND_QUEUE: usize = 64;

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    /// Frames that did not decode into a known event
    pub rejected_frames: u64,
}

pub struct SyncServer {
    config: ServerConfig,
    engine: SyncEngine,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    /// Create a server; opens the RocksDB store when a storage path is set.
    pub fn new(config: ServerConfig) -> Result<Self, StoreError> {
        let gateway: Arc<dyn PersistenceGateway> = match &config.storage_path {
            Some(path) => Arc::new(ProjectStore::open(StoreConfig::at(path))?),
            None => {
                log::info!("No storage path configured, projects are kept in memory");
                Arc::new(MemoryGateway::new())
            }
        };
        Ok(Self::with_gateway(config, gateway))
    }

    pub fn with_gateway(config: ServerConfig, gateway: Arc<dyn PersistenceGateway>) -> Self {
        let engine = SyncEngine::new(gateway, config.engine_config());
        Self {
            config,
            engine,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::info!("Sync server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let engine = self.engine.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, engine, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        engine: SyncEngine,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let session = SessionId::new();
        log::info!("WebSocket connection established from {addr} as session {session}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let outbox = engine.connect(session).await;
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let handler = tokio::spawn(Self::handle_events(engine.clone(), session, inbound_rx));

        let result = Self::pump(ws_stream, addr, outbox, inbound_tx, &stats).await;

        // The pump dropped its sender; the handler drains the queue and exits.
        if let Err(e) = handler.await {
            log::error!("Event handler of session {session} failed: {e}");
        }
        engine.disconnect(session).await;
        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
        }

        result
    }

    async fn handle_events(
        engine: SyncEngine,
        session: SessionId,
        mut inbound: mpsc::Receiver<ClientEvent>,
    ) {
        while let Some(event) = inbound.recv().await {
            engine.handle(session, event).await;
        }
    }

    async fn pump(
        ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
        addr: SocketAddr,
        mut outbox: mpsc::Receiver<Frame>,
        inbound: mpsc::Sender<ClientEvent>,
        stats: &RwLock<ServerStats>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    let decoded = match msg {
                        Some(Ok(Message::Text(text))) => {
                            Some((text.len(), ClientEvent::decode(text.as_str())))
                        }
                        Some(Ok(Message::Binary(data))) => {
                            Some((data.len(), ClientEvent::decode_slice(&data)))
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                            None
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }
                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }
                        Some(Ok(_)) => None,
                    };

                    if let Some((len, event)) = decoded {
                        {
                            let mut s = stats.write().await;
                            s.total_messages += 1;
                            s.total_bytes += len as u64;
                            if event.is_err() {
                                s.rejected_frames += 1;
                            }
                        }
                        match event {
                            Ok(event) => {
                                if inbound.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => log::warn!("Failed to decode message from {addr}: {e}"),
                        }
                    }
                }

                frame = outbox.recv() => {
                    match frame {
                        Some(frame) => ws_sender.send(Message::text(frame.to_string())).await?,
                        None => break,
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }
}
