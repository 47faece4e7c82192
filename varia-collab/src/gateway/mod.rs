//! Persistence boundary.
//!
//! ```text
//! ┌─────────────┐   PersistenceGateway   ┌────────────────────────────┐
//! │ SyncEngine  │ ─────────────────────► │ MemoryGateway (tests, dev) │
//! │             │                        │ ProjectStore  (RocksDB)    │
//! └─────────────┘                        └────────────────────────────┘
//! ```
//!
//! The engine never talks to storage directly. It loads the authoritative
//! project, applies one mutation and writes the whole project back; workspace
//! membership and the workspace → project binding live here too.

pub mod memory;
pub mod rocks;

use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use varia_core::Project;

use crate::protocol::ClientId;
use crate::session::SessionId;

pub use memory::{GatewayStats, MemoryGateway};
pub use rocks::{ProjectStore, StoreConfig, StoreError};

#[async_trait]
pub trait PersistenceGateway: Send + Sync + 'static {
    /// Authoritative state of a project, `None` if it does not exist.
    async fn get_project_by_id(&self, project_id: &str) -> Result<Option<Project>, GatewayError>;

    /// Overwrite a stored project.
    async fn update_project(&self, project_id: &str, project: &Project)
        -> Result<(), GatewayError>;

    /// Whether the workspace is known to be usable by `client_id`.
    async fn check_workspace_exists(
        &self,
        workspace_id: &str,
        client_id: &ClientId,
    ) -> Result<bool, GatewayError> {
        self.check_workspace_user(workspace_id, client_id).await
    }

    async fn check_workspace_user(
        &self,
        workspace_id: &str,
        client_id: &ClientId,
    ) -> Result<bool, GatewayError>;

    async fn add_workspace_user(
        &self,
        workspace_id: &str,
        client_id: &ClientId,
        session: SessionId,
    ) -> Result<(), GatewayError>;

    /// Drop the project currently bound to the workspace, if any.
    async fn delete_existing_project(&self, workspace_id: &str) -> Result<(), GatewayError>;

    /// Store a project and bind it to the workspace.
    async fn insert_project(
        &self,
        project_id: &str,
        project: &Project,
        workspace_id: &str,
    ) -> Result<(), GatewayError>;

    async fn get_project_by_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Option<Project>, GatewayError>;
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("Persistence unavailable: {0}")]
    Unavailable(String),
}

/// One (workspace, client) membership row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub session_id: SessionId,
    /// Seconds since epoch
    pub joined_at: u64,
}

impl MembershipRecord {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            joined_at: unix_now(),
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
