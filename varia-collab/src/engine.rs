//! Synchronization engine.
//!
//! Owns every piece of shared server state and turns decoded client events
//! into persistence calls and room broadcasts.
//!
//! ```text
//!                    ┌──────────────────────── SyncEngine ───────────────────────┐
//! ClientEvent ─────► │ dispatch ──► ProjectLocks ──► PersistenceGateway          │
//!  (per session,     │    │                │              (load → apply → save) │
//!   in order)        │    │                ▼                                     │
//!                    │    │         WorkspaceRegistry (LRU, last known project)  │
//!                    │    ▼                                                      │
//!                    │ SessionRegistry        BroadcastRouter ──► outboxes ──────┼──► sessions
//!                    └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Join lifecycle of a session in a workspace:
//!
//! ```text
//! Unjoined ──joinWorkspace──► subscribed ──► membership ensured
//!                                                │
//!                        cache / gateway hit ────┼──► replaceProject
//!                                                ▼
//!                                          workspaceJoined ──► Joined
//! ```
//!
//! Failures are handled here: logged, the operation is abandoned and
//! nothing is persisted or broadcast. Only `openProject` reports back to
//! the client.

use std::sync::Arc;

use tokio::sync::mpsc;
use varia_core::MutationError;

use crate::config::EngineConfig;
use crate::gateway::{GatewayError, PersistenceGateway};
use crate::locks::ProjectLocks;
use crate::protocol::{
    ClientEvent, ClientId, CursorMoved, DocumentEdit, GeometryEdit, GuestIdAssigned, Invitation,
    OpenProject, ProjectCreated, ProjectOpened, ProtocolError, RegisterUser, Relayed,
    ReplaceProject, ServerEvent, WorkspaceMember, WorkspaceRegistered,
};
use crate::router::{BroadcastRouter, Frame};
use crate::session::{SessionId, SessionRegistry};
use crate::workspace::WorkspaceRegistry;

/// Errors raised while handling one client event.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    #[error(transparent)]
    EntityNotFound(#[from] MutationError),
    #[error("Membership of {client_id} in workspace {workspace_id} still not visible after retry")]
    MembershipRaceUnresolved {
        workspace_id: String,
        client_id: ClientId,
    },
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] GatewayError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl SyncError {
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Self::PersistenceFailure(_))
    }
}

#[derive(Clone)]
pub struct SyncEngine {
    gateway: Arc<dyn PersistenceGateway>,
    workspaces: Arc<WorkspaceRegistry>,
    sessions: Arc<SessionRegistry>,
    router: Arc<BroadcastRouter>,
    locks: Arc<ProjectLocks>,
    config: EngineConfig,
}

impl SyncEngine {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, config: EngineConfig) -> Self {
        Self {
            gateway,
            workspaces: Arc::new(WorkspaceRegistry::new(config.workspace_cache_capacity)),
            sessions: Arc::new(SessionRegistry::new()),
            router: Arc::new(BroadcastRouter::new(config.outbox_capacity)),
            locks: Arc::new(ProjectLocks::new()),
            config,
        }
    }

    pub fn router(&self) -> &BroadcastRouter {
        &self.router
    }

    pub fn workspaces(&self) -> &WorkspaceRegistry {
        &self.workspaces
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─── Session lifecycle ────────────────────────────────────────────

    /// Register a new transport session. Frames for it arrive on the
    /// returned receiver.
    pub async fn connect(&self, session: SessionId) -> mpsc::Receiver<Frame> {
        log::debug!("Session {session} connected");
        self.router.connect(session).await
    }

    /// Drop everything bound to a terminated session.
    pub async fn disconnect(&self, session: SessionId) {
        let rooms = self.router.disconnect(session).await;
        let guest = self.sessions.guest_of(session).await;
        let email = self.sessions.remove_session(session).await;
        log::debug!(
            "Session {session} disconnected (identity: {}, guest: {}, left {} room(s))",
            email.as_deref().unwrap_or("none"),
            guest.map_or_else(|| "none".to_string(), |id| id.to_string()),
            rooms.len()
        );
    }

    // ─── Dispatch ─────────────────────────────────────────────────────

    /// Handle one event, logging any failure.
    pub async fn handle(&self, session: SessionId, event: ClientEvent) {
        let name = event.name();
        if let Err(e) = self.dispatch(session, event).await {
            if e.is_persistence_failure() {
                log::error!("{name} from {session} abandoned: {e}");
            } else {
                log::warn!("{name} from {session} abandoned: {e}");
            }
        }
    }

    pub async fn dispatch(&self, session: SessionId, event: ClientEvent) -> Result<(), SyncError> {
        log::trace!("Session {session} sent {}", event.name());
        match event {
            ClientEvent::SignUpAsGuest => self.sign_up_as_guest(session).await,
            ClientEvent::RegisterUser(user) => self.register_user(session, user).await,
            ClientEvent::RegisterWorkspace(member) => {
                self.register_workspace(session, member).await
            }
            ClientEvent::JoinWorkspace(member) => self.join_workspace(session, member).await,
            ClientEvent::OpenProject(open) => self.open_project(session, open).await,
            ClientEvent::SendInvitation(invitation) => {
                self.send_invitation(session, invitation).await
            }
            ClientEvent::ProjectCreated(created) => self.project_created(session, created).await,
            ClientEvent::ProductLineCreated(e) => self.apply_edit(session, e).await,
            ClientEvent::ModelCreated(e) => self.apply_edit(session, e).await,
            ClientEvent::ModelDeleted(e) => self.apply_edit(session, e).await,
            ClientEvent::ModelRenamed(e) => self.apply_edit(session, e).await,
            ClientEvent::ModelConfigured(e) => self.apply_edit(session, e).await,
            ClientEvent::CellMoved(e) => self.apply_edit(session, GeometryEdit::Move(e)).await,
            ClientEvent::CellResized(e) => self.apply_edit(session, GeometryEdit::Resize(e)).await,
            ClientEvent::CellAdded(e) => self.apply_edit(session, e).await,
            ClientEvent::CellRemoved(e) => self.apply_edit(session, e).await,
            ClientEvent::CellConnected(e) => self.apply_edit(session, e).await,
            ClientEvent::PropertiesChanged(e) => self.apply_edit(session, e).await,
            ClientEvent::EdgeStyleChanged(e) => self.apply_edit(session, e).await,
            ClientEvent::EdgeLabelChanged(e) => self.apply_edit(session, e).await,
            ClientEvent::CursorMoved(cursor) => self.cursor_moved(cursor).await,
        }
    }

    // ─── Identity ─────────────────────────────────────────────────────

    async fn sign_up_as_guest(&self, session: SessionId) -> Result<(), SyncError> {
        let guest_id = self.sessions.assign_guest_id(session).await;
        log::info!("Session {session} signed up as guest {guest_id}");
        self.router
            .to_session(session, &ServerEvent::GuestIdAssigned(GuestIdAssigned { guest_id }))
            .await?;
        Ok(())
    }

    async fn register_user(&self, session: SessionId, user: RegisterUser) -> Result<(), SyncError> {
        if user.email.is_empty() {
            return Err(SyncError::InvalidRequest("registerUser without email".into()));
        }
        match self.sessions.register_identity(&user.email, session).await {
            Some(previous) if previous != session => {
                log::info!("{} moved from session {previous} to {session}", user.email)
            }
            _ => log::info!("{} registered on session {session}", user.email),
        }
        Ok(())
    }

    // ─── Workspaces ───────────────────────────────────────────────────

    async fn ensure_membership(
        &self,
        workspace_id: &str,
        client_id: &ClientId,
        session: SessionId,
    ) -> Result<(), GatewayError> {
        // Check and insert are separate calls; a concurrent join may insert
        // in between, which the gateway tolerates as an overwrite.
        if !self.gateway.check_workspace_user(workspace_id, client_id).await? {
            self.gateway
                .add_workspace_user(workspace_id, client_id, session)
                .await?;
            log::debug!("Added {client_id} to workspace {workspace_id}");
        }
        Ok(())
    }

    async fn register_workspace(
        &self,
        session: SessionId,
        member: WorkspaceMember,
    ) -> Result<(), SyncError> {
        if member.workspace_id.is_empty() || member.client_id.is_empty() {
            return Err(SyncError::InvalidRequest(
                "registerWorkspace needs a client id and a workspace id".into(),
            ));
        }

        let result = self
            .ensure_membership(&member.workspace_id, &member.client_id, session)
            .await;
        let reply = WorkspaceRegistered {
            success: result.is_ok(),
            workspace_id: member.workspace_id.clone(),
            error: result.as_ref().err().map(ToString::to_string),
        };
        self.router
            .to_session(session, &ServerEvent::WorkspaceRegistered(reply))
            .await?;

        result?;
        log::info!(
            "Workspace {} registered for {}",
            member.workspace_id,
            member.client_id
        );
        Ok(())
    }

    async fn join_workspace(
        &self,
        session: SessionId,
        member: WorkspaceMember,
    ) -> Result<(), SyncError> {
        let WorkspaceMember {
            client_id,
            workspace_id,
        } = &member;

        self.router.join(workspace_id, session).await;
        self.ensure_membership(workspace_id, client_id, session)
            .await?;

        let project = match self.workspaces.get(workspace_id).await {
            Some(project) => Some(project),
            None => match self.gateway.get_project_by_workspace(workspace_id).await {
                Ok(Some(project)) => {
                    self.workspaces.put(workspace_id, project.clone()).await;
                    Some(project)
                }
                Ok(None) => {
                    log::debug!("Workspace {workspace_id} has no project yet");
                    None
                }
                Err(e) => {
                    log::warn!("Could not load project of workspace {workspace_id}: {e}");
                    None
                }
            },
        };

        if let Some(project) = project {
            let replace = ServerEvent::ReplaceProject(ReplaceProject {
                client_id: client_id.clone(),
                workspace_id: workspace_id.clone(),
                project,
            });
            self.router.to_session(session, &replace).await?;
        }

        log::info!("{client_id} joined workspace {workspace_id}");
        self.router
            .to_session(session, &ServerEvent::WorkspaceJoined(member))
            .await?;
        Ok(())
    }

    async fn open_project(&self, session: SessionId, open: OpenProject) -> Result<(), SyncError> {
        let project = match self.gateway.get_project_by_id(&open.project_id).await {
            Ok(Some(project)) => project,
            Ok(None) => {
                self.router
                    .to_session(session, &ServerEvent::error("Project not found"))
                    .await?;
                return Err(SyncError::DocumentNotFound(open.project_id));
            }
            Err(e) => {
                self.router
                    .to_session(session, &ServerEvent::error("Failed to open project"))
                    .await?;
                return Err(e.into());
            }
        };

        self.workspaces.put(&open.workspace_id, project.clone()).await;
        let reached = self
            .router
            .to_room(&open.workspace_id, &ServerEvent::ProjectOpened(ProjectOpened { project }))
            .await?;
        log::info!(
            "Project {} opened in workspace {} ({reached} session(s))",
            open.project_id,
            open.workspace_id
        );
        Ok(())
    }

    async fn send_invitation(
        &self,
        session: SessionId,
        invitation: Invitation,
    ) -> Result<(), SyncError> {
        let Some(invited) = self
            .sessions
            .resolve_session(&invitation.invited_user_email)
            .await
        else {
            log::info!(
                "{} is not connected, invitation to {} not delivered",
                invitation.invited_user_email,
                invitation.workspace_id
            );
            return Ok(());
        };

        let workspace_id = invitation.workspace_id.clone();
        self.router
            .to_session(invited, &ServerEvent::InvitationReceived(invitation))
            .await?;
        self.router.join(&workspace_id, session).await;
        Ok(())
    }

    // ─── Documents ────────────────────────────────────────────────────

    async fn project_created(
        &self,
        session: SessionId,
        created: Relayed<ProjectCreated>,
    ) -> Result<(), SyncError> {
        if self
            .gateway
            .check_workspace_exists(&created.workspace_id, &created.client_id)
            .await?
        {
            return self.store_created_project(session, created).await;
        }

        log::debug!(
            "Membership of {} in {} not visible yet, retrying in {:?}",
            created.client_id,
            created.workspace_id,
            self.config.membership_retry_delay
        );
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(engine.config.membership_retry_delay).await;
            if let Err(e) = engine.retry_project_created(session, created).await {
                if e.is_persistence_failure() {
                    log::error!("projectCreated from {session} abandoned: {e}");
                } else {
                    log::debug!("projectCreated from {session} abandoned: {e}");
                }
            }
        });
        Ok(())
    }

    async fn retry_project_created(
        &self,
        session: SessionId,
        created: Relayed<ProjectCreated>,
    ) -> Result<(), SyncError> {
        if !self
            .gateway
            .check_workspace_exists(&created.workspace_id, &created.client_id)
            .await?
        {
            return Err(SyncError::MembershipRaceUnresolved {
                workspace_id: created.workspace_id.clone(),
                client_id: created.client_id.clone(),
            });
        }
        self.store_created_project(session, created).await
    }

    async fn store_created_project(
        &self,
        session: SessionId,
        created: Relayed<ProjectCreated>,
    ) -> Result<(), SyncError> {
        let workspace_id = created.workspace_id.clone();
        let project_id = created.project.id.clone();
        {
            let _guard = self.locks.lock(&project_id).await;
            self.gateway.delete_existing_project(&workspace_id).await?;
            self.gateway
                .insert_project(&project_id, &created.project, &workspace_id)
                .await?;
            self.workspaces
                .put(&workspace_id, created.project.clone())
                .await;
        }

        log::info!("Project {project_id} created in workspace {workspace_id}");
        self.router
            .to_room_excluding(&workspace_id, session, &ServerEvent::ProjectCreated(created))
            .await?;
        Ok(())
    }

    /// Load, mutate, persist, relay. Serialized per project.
    async fn apply_edit<E: DocumentEdit>(&self, session: SessionId, edit: E) -> Result<(), SyncError> {
        let workspace_id = edit.workspace_id().to_string();
        let project_id = edit.project_id().to_string();
        let mutation = edit.mutation();

        {
            let _guard = self.locks.lock(&project_id).await;
            let mut project = self
                .gateway
                .get_project_by_id(&project_id)
                .await?
                .ok_or_else(|| SyncError::DocumentNotFound(project_id.clone()))?;

            mutation.apply(&mut project)?;
            self.gateway.update_project(&project_id, &project).await?;
            self.workspaces.refresh(&workspace_id, project).await;
        }

        let reached = self
            .router
            .to_room_excluding(&workspace_id, session, &edit.into_relay())
            .await?;
        log::debug!(
            "{} applied to {project_id}, relayed to {reached} session(s)",
            mutation.name()
        );
        Ok(())
    }

    async fn cursor_moved(&self, cursor: CursorMoved) -> Result<(), SyncError> {
        let workspace_id = cursor.workspace_id.clone();
        self.router
            .to_room(&workspace_id, &ServerEvent::CursorMoved(cursor))
            .await?;
        Ok(())
    }
}
