//! Workspace → project cache.
//!
//! Holds the last-known project of each workspace so late joiners can be
//! brought up to date without a storage round trip. Bounded with LRU
//! eviction; an evicted workspace is simply reloaded from the gateway on
//! the next join.

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::Mutex;
use varia_core::Project;

pub struct WorkspaceRegistry {
    cache: Mutex<LruCache<String, Project>>,
}

impl WorkspaceRegistry {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached project of a workspace; counts as a use for eviction order.
    pub async fn get(&self, workspace_id: &str) -> Option<Project> {
        self.cache.lock().await.get(workspace_id).cloned()
    }

    /// Overwrite the workspace's entry unconditionally.
    pub async fn put(&self, workspace_id: &str, project: Project) {
        let evicted = self.cache.lock().await.push(workspace_id.to_string(), project);
        if let Some((key, _)) = evicted {
            if key != workspace_id {
                log::debug!("Workspace cache full, evicted {key}");
            }
        }
    }

    /// Store a freshly persisted project, unless the workspace currently
    /// shows a different project.
    pub async fn refresh(&self, workspace_id: &str, project: Project) -> bool {
        let mut cache = self.cache.lock().await;
        if let Some(current) = cache.peek(workspace_id) {
            if current.id != project.id {
                log::debug!(
                    "Workspace {workspace_id} shows project {}, not refreshing with {}",
                    current.id,
                    project.id
                );
                return false;
            }
        }
        cache.push(workspace_id.to_string(), project);
        true
    }

    pub async fn contains(&self, workspace_id: &str) -> bool {
        self.cache.lock().await.contains(workspace_id)
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }
}
