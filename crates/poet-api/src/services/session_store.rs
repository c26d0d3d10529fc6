//! In-memory registry of interaction sessions.
//!
//! Each browser tab owns one [`InteractionController`]. Sessions live in an
//! LRU map bounded by `max_sessions`; a session untouched for longer than the
//! idle timeout is dropped on its next lookup or by the periodic sweep.
//! Dropping a session cancels whatever request it had in flight.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use poet_core::{InteractionController, PhotoFlows};

struct SessionEntry {
    controller: Arc<InteractionController>,
    last_access: Instant,
}

/// Shared session registry.
#[derive(Clone)]
pub struct SessionStore {
    flows: Arc<dyn PhotoFlows>,
    sessions: Arc<Mutex<LruCache<Uuid, SessionEntry>>>,
    idle_timeout: Duration,
    call_timeout: Duration,
}

impl SessionStore {
    pub fn new(
        flows: Arc<dyn PhotoFlows>,
        capacity: usize,
        idle_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            flows,
            sessions: Arc::new(Mutex::new(LruCache::new(capacity))),
            idle_timeout,
            call_timeout,
        }
    }

    /// Start a session in the Idle phase.
    pub async fn create(&self) -> (Uuid, Arc<InteractionController>) {
        let id = Uuid::now_v7();
        let controller = Arc::new(
            InteractionController::new(Arc::clone(&self.flows))
                .with_call_timeout(self.call_timeout),
        );

        let mut sessions = self.sessions.lock().await;
        let evicted = sessions.push(
            id,
            SessionEntry {
                controller: Arc::clone(&controller),
                last_access: Instant::now(),
            },
        );
        if let Some((evicted_id, entry)) = evicted {
            entry.controller.cancel();
            info!(session_id = %evicted_id, "Evicted least recently used session");
        }
        debug!(session_id = %id, live = sessions.len(), "Session created");

        (id, controller)
    }

    /// Look up a live session, refreshing its idle clock.
    pub async fn get(&self, id: Uuid) -> Option<Arc<InteractionController>> {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();

        match sessions.get_mut(&id) {
            None => return None,
            Some(entry) if now.duration_since(entry.last_access) <= self.idle_timeout => {
                entry.last_access = now;
                return Some(Arc::clone(&entry.controller));
            }
            Some(_) => {}
        }

        if let Some(entry) = sessions.pop(&id) {
            entry.controller.cancel();
            debug!(session_id = %id, "Session expired");
        }
        None
    }

    /// End a session. Returns false if it did not exist.
    pub async fn remove(&self, id: Uuid) -> bool {
        match self.sessions.lock().await.pop(&id) {
            Some(entry) => {
                entry.controller.cancel();
                debug!(session_id = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    /// Drop every idle session; returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let expired: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_access) > self.idle_timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(entry) = sessions.pop(id) {
                entry.controller.cancel();
            }
        }
        if !expired.is_empty() {
            info!(
                expired = expired.len(),
                live = sessions.len(),
                "Swept idle sessions"
            );
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run [`Self::sweep_expired`] every `interval` until the runtime stops.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.sweep_expired().await;
            }
        })
    }
}
