use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::IntentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeResult {
    Success,
    Partial,
    Failure,
}

/// One past orchestration, recorded for a session so a future call can look
/// up what worked last time. The core ships only the trait plus an
/// in-process reference store — a host that wants durable history supplies
/// its own `SessionStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub session_id: String,
    pub intent: IntentKind,
    pub actions: Vec<String>,
    pub result: EpisodeResult,
    pub duration_ms: u64,
    pub tools_used: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// The orchestrator's optional memory seam. `§6` states the core "functions
/// identically when memory is absent" — the `Orchestrator` holds
/// `Option<Arc<dyn SessionStore>>` and every call site treats `None` as a
/// plain no-op rather than branching on a present-but-empty collaborator.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_episode(&self, episode: Episode);
    async fn load_similar(&self, session_id: &str, intent: IntentKind, k: usize) -> Vec<Episode>;
}

/// Reference `SessionStore`: an in-process, per-session episode list with no
/// persistence beyond the process lifetime. "Similar" is deliberately
/// coarse — same session, same intent kind, most recent first — rather than
/// an embedding search, since the core has no opinion about similarity
/// scoring beyond what `§9`'s open questions leave as a host concern.
pub struct InMemorySessionStore {
    episodes: Mutex<Vec<Episode>>,
    capacity_per_session: usize,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::with_capacity(200)
    }

    pub fn with_capacity(capacity_per_session: usize) -> Self {
        Self { episodes: Mutex::new(Vec::new()), capacity_per_session: capacity_per_session.max(1) }
    }

    pub fn all_for_session(&self, session_id: &str) -> Vec<Episode> {
        self.episodes.lock().unwrap().iter().filter(|e| e.session_id == session_id).cloned().collect()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save_episode(&self, episode: Episode) {
        let mut episodes = self.episodes.lock().unwrap();
        episodes.push(episode);
        let session_count = episodes.len();
        if session_count > self.capacity_per_session * 8 {
            // Coarse global cap so a long-lived process sharing one store
            // across many sessions doesn't grow unbounded; per-session
            // pruning alone can't catch that since sessions differ.
            let excess = session_count - self.capacity_per_session * 8;
            episodes.drain(0..excess);
        }
    }

    async fn load_similar(&self, session_id: &str, intent: IntentKind, k: usize) -> Vec<Episode> {
        let episodes = self.episodes.lock().unwrap();
        let mut matching: Vec<Episode> =
            episodes.iter().filter(|e| e.session_id == session_id && e.intent == intent).cloned().collect();
        matching.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        matching.truncate(k);
        matching
    }
}
