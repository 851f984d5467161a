//! Session registry and TTL-based reclamation (spec §3, §4.4).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;

use tts_gateway_core::AudioSpec;

use crate::session::SessionState;

/// Shared, lock-striped registry of live sessions keyed by `session_id`.
pub struct SessionManager {
    sessions: RwLock<std::collections::HashMap<String, Arc<SessionState>>>,
    max_send_queue: usize,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(max_send_queue: usize, ttl_seconds: u64) -> Self {
        Self {
            sessions: RwLock::new(std::collections::HashMap::new()),
            max_send_queue,
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Look up an existing session.
    pub fn get(&self, session_id: &str) -> Option<Arc<SessionState>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Create a session for a `start` message, replacing any prior session
    /// under the same id (a fresh `start` always begins a new stream).
    pub fn create(&self, session_id: String, audio_spec: AudioSpec) -> Arc<SessionState> {
        let session = Arc::new(SessionState::new(session_id.clone(), audio_spec, self.max_send_queue, self.ttl));
        if let Some(old) = self.sessions.write().insert(session_id.clone(), session.clone()) {
            old.request_cancel();
            if let Some(handle) = old.synth_task.lock().take() {
                handle.abort();
            }
        }
        metrics::gauge!("tts_gateway_sessions_active").increment(1.0);
        metrics::counter!("tts_gateway_sessions_created_total").increment(1);
        tracing::info!(session_id = %session_id, "session created");
        session
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionState>> {
        let removed = self.sessions.write().remove(session_id);
        if removed.is_some() {
            metrics::gauge!("tts_gateway_sessions_active").decrement(1.0);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Sweep sessions idle longer than the configured TTL (spec §4.4).
    /// Runs on its own interval task, independent of any connection.
    pub async fn run_cleanup_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.sweep_expired();
        }
    }

    fn sweep_expired(&self) {
        let expired: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, s)| s.idle_for() > self.ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in expired {
            if let Some(session) = self.remove(&session_id) {
                session.request_cancel();
                if let Some(handle) = session.synth_task.lock().take() {
                    handle.abort();
                }
                metrics::counter!("tts_gateway_sessions_expired_total").increment(1);
                tracing::info!(session_id = %session_id, "session expired, reclaimed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> AudioSpec {
        AudioSpec::new("pcm16_wav", 16000, 1)
    }

    #[test]
    fn create_then_get_round_trips() {
        let manager = SessionManager::new(200, 120);
        manager.create("s1".to_string(), spec());
        assert!(manager.get("s1").is_some());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn unknown_session_returns_none() {
        let manager = SessionManager::new(200, 120);
        assert!(manager.get("missing").is_none());
    }

    #[test]
    fn restarting_a_session_cancels_the_old_one() {
        let manager = SessionManager::new(200, 120);
        let first = manager.create("s1".to_string(), spec());
        let second = manager.create("s1".to_string(), spec());
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn sweep_expired_removes_idle_sessions() {
        let manager = Arc::new(SessionManager::new(200, 0));
        manager.create("s1".to_string(), spec());
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.sweep_expired();
        assert!(manager.get("s1").is_none());
    }
}
