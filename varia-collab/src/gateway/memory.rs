//! In-process gateway.
//!
//! Used when no storage path is configured and by the test suites. Counts
//! every call so tests can assert how often storage was reached, and can be
//! switched into a failing mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use varia_core::Project;

use super::{GatewayError, MembershipRecord, PersistenceGateway};
use crate::protocol::ClientId;
use crate::session::SessionId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub reads: u64,
    pub updates: u64,
    pub inserts: u64,
    pub deletes: u64,
    pub membership_checks: u64,
    pub membership_inserts: u64,
}

#[derive(Default)]
struct Counters {
    reads: AtomicU64,
    updates: AtomicU64,
    inserts: AtomicU64,
    deletes: AtomicU64,
    membership_checks: AtomicU64,
    membership_inserts: AtomicU64,
}

#[derive(Default)]
struct State {
    projects: HashMap<String, Project>,
    /// workspace → project id
    workspaces: HashMap<String, String>,
    members: HashMap<(String, ClientId), MembershipRecord>,
}

#[derive(Default)]
pub struct MemoryGateway {
    state: RwLock<State>,
    counters: Counters,
    unavailable: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`GatewayError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Record a membership directly, bypassing the counters.
    pub async fn add_member(&self, workspace_id: &str, client_id: ClientId) {
        self.state.write().await.members.insert(
            (workspace_id.to_string(), client_id),
            MembershipRecord::new(SessionId::nil()),
        );
    }

    /// Seed a project and bind it to a workspace, bypassing the counters.
    pub async fn seed_project(&self, workspace_id: &str, project: Project) {
        let mut state = self.state.write().await;
        state
            .workspaces
            .insert(workspace_id.to_string(), project.id.clone());
        state.projects.insert(project.id.clone(), project);
    }

    pub async fn project(&self, project_id: &str) -> Option<Project> {
        self.state.read().await.projects.get(project_id).cloned()
    }

    pub async fn project_count(&self) -> usize {
        self.state.read().await.projects.len()
    }

    pub async fn membership(
        &self,
        workspace_id: &str,
        client_id: &ClientId,
    ) -> Option<MembershipRecord> {
        self.state
            .read()
            .await
            .members
            .get(&(workspace_id.to_string(), client_id.clone()))
            .cloned()
    }

    pub fn stats(&self) -> GatewayStats {
        let c = &self.counters;
        GatewayStats {
            reads: c.reads.load(Ordering::Relaxed),
            updates: c.updates.load(Ordering::Relaxed),
            inserts: c.inserts.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            membership_checks: c.membership_checks.load(Ordering::Relaxed),
            membership_inserts: c.membership_inserts.load(Ordering::Relaxed),
        }
    }

    fn available(&self, counter: &AtomicU64) -> Result<(), GatewayError> {
        counter.fetch_add(1, Ordering::Relaxed);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("memory gateway switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn get_project_by_id(&self, project_id: &str) -> Result<Option<Project>, GatewayError> {
        self.available(&self.counters.reads)?;
        Ok(self.state.read().await.projects.get(project_id).cloned())
    }

    async fn update_project(
        &self,
        project_id: &str,
        project: &Project,
    ) -> Result<(), GatewayError> {
        self.available(&self.counters.updates)?;
        let mut state = self.state.write().await;
        match state.projects.get_mut(project_id) {
            Some(stored) => {
                *stored = project.clone();
                Ok(())
            }
            None => Err(GatewayError::ProjectNotFound(project_id.to_string())),
        }
    }

    async fn check_workspace_user(
        &self,
        workspace_id: &str,
        client_id: &ClientId,
    ) -> Result<bool, GatewayError> {
        self.available(&self.counters.membership_checks)?;
        Ok(self
            .state
            .read()
            .await
            .members
            .contains_key(&(workspace_id.to_string(), client_id.clone())))
    }

    async fn add_workspace_user(
        &self,
        workspace_id: &str,
        client_id: &ClientId,
        session: SessionId,
    ) -> Result<(), GatewayError> {
        self.available(&self.counters.membership_inserts)?;
        self.state.write().await.members.insert(
            (workspace_id.to_string(), client_id.clone()),
            MembershipRecord::new(session),
        );
        Ok(())
    }

    async fn delete_existing_project(&self, workspace_id: &str) -> Result<(), GatewayError> {
        self.available(&self.counters.deletes)?;
        let mut state = self.state.write().await;
        if let Some(project_id) = state.workspaces.remove(workspace_id) {
            state.projects.remove(&project_id);
        }
        Ok(())
    }

    async fn insert_project(
        &self,
        project_id: &str,
        project: &Project,
        workspace_id: &str,
    ) -> Result<(), GatewayError> {
        self.available(&self.counters.inserts)?;
        let mut state = self.state.write().await;
        state
            .projects
            .insert(project_id.to_string(), project.clone());
        state
            .workspaces
            .insert(workspace_id.to_string(), project_id.to_string());
        Ok(())
    }

    async fn get_project_by_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Option<Project>, GatewayError> {
        self.available(&self.counters.reads)?;
        let state = self.state.read().await;
        Ok(state
            .workspaces
            .get(workspace_id)
            .and_then(|id| state.projects.get(id))
            .cloned())
    }
}
