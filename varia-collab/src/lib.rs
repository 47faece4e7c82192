//! # varia-collab: Real-time synchronization server for Varia
//!
//! Keeps every collaborator of a workspace looking at the same project:
//! edits are applied to the persisted project and relayed to the rest of the
//! workspace room.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐    PersistenceGateway
//! │ Editor      │ ◄─────────────────► │ SyncServer  │ ───────────────────────┐
//! │ (per user)  │   JSON text frames  │ (transport) │                        ▼
//! └─────────────┘                     └──────┬──────┘              ┌──────────────────┐
//!                                            │                     │ MemoryGateway    │
//!                                            ▼                     │ ProjectStore     │
//!                                     ┌─────────────┐              │ (RocksDB + LZ4)  │
//!                                     │ SyncEngine  │              └──────────────────┘
//!                                     └──────┬──────┘
//!                                            │
//!                                    ┌───────┴─────────┐
//!                                    │ BroadcastRouter │
//!                                    │ (rooms, fan-out)│
//!                                    └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON event catalog (`{"event", "data"}` frames)
//! - [`engine`]: event orchestration: load, mutate, persist, relay
//! - [`router`]: room-based fan-out with per-session backpressure
//! - [`workspace`]: LRU cache of each workspace's current project
//! - [`session`]: guest ids and email → session bindings
//! - [`locks`]: per-project write serialization
//! - [`gateway`]: persistence boundary with in-memory and RocksDB backends
//! - [`config`]: environment-driven server configuration
//! - [`server`]: WebSocket transport

pub mod config;
pub mod engine;
pub mod gateway;
pub mod locks;
pub mod protocol;
pub mod router;
pub mod server;
pub mod session;
pub mod workspace;

pub use config::{ConfigError, EngineConfig, ServerConfig};
pub use engine::{SyncEngine, SyncError};
pub use gateway::{
    GatewayError, GatewayStats, MemoryGateway, MembershipRecord, PersistenceGateway,
    ProjectStore, StoreConfig, StoreError,
};
pub use locks::ProjectLocks;
pub use protocol::{ClientEvent, ClientId, DocumentEdit, ProtocolError, Relayed, ServerEvent};
pub use router::{BroadcastRouter, BroadcastStats, Frame};
pub use server::{ServerStats, SyncServer};
pub use session::{SessionId, SessionRegistry};
pub use workspace::WorkspaceRegistry;
