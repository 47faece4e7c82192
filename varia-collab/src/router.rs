//! Room-based fan-out with per-session backpressure.
//!
//! Every session owns a bounded outbox; a room is the set of sessions
//! subscribed to one workspace. An event is encoded once and the same
//! `Arc<str>` frame is pushed to every recipient. A session whose outbox is
//! full misses that frame (counted in [`BroadcastStats::messages_dropped`])
//! instead of stalling the room.
//!
//! Delivery modes:
//! - [`BroadcastRouter::to_room_excluding`]: everyone in the room but the sender
//! - [`BroadcastRouter::to_room`]: everyone in the room
//! - [`BroadcastRouter::to_session`]: one session

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

use crate::protocol::{ProtocolError, ServerEvent};
use crate::session::SessionId;

/// An encoded outbound event.
pub type Frame = Arc<str>;

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    /// Frames not queued because the recipient's outbox was full.
    pub messages_dropped: u64,
    pub active_sessions: usize,
    pub active_rooms: usize,
}

/// Lock-free counters for the hot path.
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicBroadcastStats {
    fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }
}

pub struct BroadcastRouter {
    /// Lock order: `rooms` before `outboxes`.
    rooms: RwLock<HashMap<String, HashSet<SessionId>>>,
    outboxes: RwLock<HashMap<SessionId, mpsc::Sender<Frame>>>,
    /// Frames buffered per session before drops start.
    outbox_capacity: usize,
    atomic_stats: AtomicBroadcastStats,
}

impl BroadcastRouter {
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            outboxes: RwLock::new(HashMap::new()),
            outbox_capacity: outbox_capacity.max(1),
            atomic_stats: AtomicBroadcastStats::new(),
        }
    }

    /// Register a session and return the receiving end of its outbox.
    ///
    /// Connecting an id twice replaces the earlier outbox.
    pub async fn connect(&self, session: SessionId) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        self.outboxes.write().await.insert(session, tx);
        rx
    }

    /// Unregister a session and unsubscribe it from every room. Rooms left
    /// empty are dropped. Returns the workspaces it was in.
    pub async fn disconnect(&self, session: SessionId) -> Vec<String> {
        let mut rooms = self.rooms.write().await;
        let mut left = Vec::new();
        rooms.retain(|workspace_id, members| {
            if members.remove(&session) {
                left.push(workspace_id.clone());
            }
            !members.is_empty()
        });
        self.outboxes.write().await.remove(&session);
        left
    }

    /// Subscribe a session to a workspace room. Returns `false` if it was
    /// already subscribed.
    pub async fn join(&self, workspace_id: &str, session: SessionId) -> bool {
        self.rooms
            .write()
            .await
            .entry(workspace_id.to_string())
            .or_default()
            .insert(session)
    }

    /// Send to a single session. Returns whether the frame was queued.
    pub async fn to_session(
        &self,
        session: SessionId,
        event: &ServerEvent,
    ) -> Result<bool, ProtocolError> {
        let frame: Frame = event.encode()?.into();
        let outboxes = self.outboxes.read().await;
        Ok(match outboxes.get(&session) {
            Some(tx) => self.deliver(session, tx, &frame),
            None => {
                log::debug!("Session {session} is gone, dropping frame");
                false
            }
        })
    }

    /// Send to every session in the room. Returns the number of sessions reached.
    pub async fn to_room(
        &self,
        workspace_id: &str,
        event: &ServerEvent,
    ) -> Result<usize, ProtocolError> {
        self.fan_out(workspace_id, None, event).await
    }

    /// Send to every session in the room except `sender`.
    pub async fn to_room_excluding(
        &self,
        workspace_id: &str,
        sender: SessionId,
        event: &ServerEvent,
    ) -> Result<usize, ProtocolError> {
        self.fan_out(workspace_id, Some(sender), event).await
    }

    async fn fan_out(
        &self,
        workspace_id: &str,
        exclude: Option<SessionId>,
        event: &ServerEvent,
    ) -> Result<usize, ProtocolError> {
        let frame: Frame = event.encode()?.into();

        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(workspace_id) else {
            return Ok(0);
        };
        let outboxes = self.outboxes.read().await;

        let mut reached = 0;
        for session in members.iter().filter(|s| Some(**s) != exclude) {
            if let Some(tx) = outboxes.get(session) {
                if self.deliver(*session, tx, &frame) {
                    reached += 1;
                }
            }
        }
        Ok(reached)
    }

    fn deliver(&self, session: SessionId, tx: &mpsc::Sender<Frame>, frame: &Frame) -> bool {
        match tx.try_send(frame.clone()) {
            Ok(()) => {
                self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.atomic_stats
                    .messages_dropped
                    .fetch_add(1, Ordering::Relaxed);
                log::warn!("Outbox of session {session} is full, frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub async fn room_members(&self, workspace_id: &str) -> Vec<SessionId> {
        self.rooms
            .read()
            .await
            .get(workspace_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    async fn rooms_of(&self, session: SessionId) -> Vec<String> {
        self.rooms
            .read()
            .await
            .iter()
            .filter(|(_, members)| members.contains(&session))
            .map(|(workspace_id, _)| workspace_id.clone())
            .collect()
    }

    pub async fn is_member(&self, workspace_id: &str, session: SessionId) -> bool {
        self.rooms
            .read()
            .await
            .get(workspace_id)
            .is_some_and(|m| m.contains(&session))
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn stats(&self) -> BroadcastStats {
        let active_rooms = self.rooms.read().await.len();
        let active_sessions = self.outboxes.read().await.len();
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            active_sessions,
            active_rooms,
        }
    }
}
