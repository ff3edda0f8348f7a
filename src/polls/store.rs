//! Vote Session Store
//!
//! Registry of active vote sessions, at most one per channel.
//! Lookups never check expiry; deciding whether a session is still open is
//! left to the intake handler.

use super::config::{OverwritePolicy, VoteSession};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Errors raised when installing a session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Channel {0} already has an open vote")]
    SessionActive(String),

    #[error("Invalid vote session: {0}")]
    InvalidSession(String),
}

/// Session registry keyed by channel ID
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, VoteSession>>,
}

impl SessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the channel's session, expired or not
    pub fn get(&self, channel_id: &str) -> Option<VoteSession> {
        let sessions = self.sessions.read();
        sessions.get(channel_id).cloned()
    }

    /// Install a session, replacing whatever the channel had
    pub fn set(&self, channel_id: impl Into<String>, session: VoteSession) {
        let mut sessions = self.sessions.write();
        sessions.insert(channel_id.into(), session);
    }

    /// Drop the channel's session. Removing an absent session is a no-op.
    pub fn remove(&self, channel_id: &str) -> Option<VoteSession> {
        let mut sessions = self.sessions.write();
        sessions.remove(channel_id)
    }

    /// Check whether a new vote may start in the channel under `policy`
    pub fn check_start(
        &self,
        channel_id: &str,
        policy: OverwritePolicy,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sessions = self.sessions.read();
        overwrite_check(sessions.get(channel_id), channel_id, policy, now)
    }

    /// Install a session for a new vote, honouring the overwrite policy.
    ///
    /// An expired session never blocks a new one. Returns the session that
    /// was replaced, if any.
    pub fn start_session(
        &self,
        channel_id: &str,
        session: VoteSession,
        policy: OverwritePolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<VoteSession>, StoreError> {
        session.validate().map_err(StoreError::InvalidSession)?;

        let mut sessions = self.sessions.write();
        overwrite_check(sessions.get(channel_id), channel_id, policy, now)?;

        let replaced = sessions.insert(channel_id.to_string(), session);
        if policy == OverwritePolicy::Warn
            && replaced.as_ref().is_some_and(|old| old.is_open(now))
        {
            warn!(channel_id = %channel_id, "Replaced an open vote session");
        }
        Ok(replaced)
    }

    /// Run `f` against the channel's session while holding the write lock.
    ///
    /// Returns `None` when the channel has no session. `f` must not block.
    pub fn update<T>(
        &self,
        channel_id: &str,
        f: impl FnOnce(&mut VoteSession) -> T,
    ) -> Option<T> {
        let mut sessions = self.sessions.write();
        sessions.get_mut(channel_id).map(f)
    }

    /// Remove sessions that expired more than `grace` before `now`.
    /// A grace that overflows the calendar keeps the session.
    pub fn sweep_expired(&self, now: DateTime<Utc>, grace: Duration) -> Vec<String> {
        let mut sessions = self.sessions.write();
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| {
                s.expires_at
                    .checked_add_signed(grace)
                    .is_some_and(|evict_after| evict_after < now)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            sessions.remove(id);
        }
        stale
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the store holds no sessions
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

fn overwrite_check(
    existing: Option<&VoteSession>,
    channel_id: &str,
    policy: OverwritePolicy,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let open = existing.is_some_and(|s| s.is_open(now));
    if open && policy == OverwritePolicy::Reject {
        return Err(StoreError::SessionActive(channel_id.to_string()));
    }
    Ok(())
}

/// Create a shared session store
pub fn create_store() -> Arc<SessionStore> {
    Arc::new(SessionStore::new())
}

/// Periodically evict long-expired sessions until shutdown.
pub fn spawn_sweeper(
    store: Arc<SessionStore>,
    interval: std::time::Duration,
    grace: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    break;
                }
            }

            if *shutdown.borrow() {
                break;
            }

            let removed = store.sweep_expired(Utc::now(), grace);
            if removed.is_empty() {
                debug!("No expired vote sessions to sweep");
            } else {
                info!(count = removed.len(), channels = ?removed, "Swept expired vote sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polls::config::VoteEntry;
    use chrono::TimeZone;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn create_test_session(expires_at: DateTime<Utc>) -> VoteSession {
        VoteSession::new(
            vec![
                VoteEntry::new("https://img/a.png", "a cat"),
                VoteEntry::new("https://img/b.png", "a dog"),
            ],
            expires_at,
            "msg1",
        )
    }

    #[test]
    fn test_get_set_remove() {
        let store = SessionStore::new();
        assert!(store.get("chan1").is_none());

        store.set("chan1", create_test_session(base_time()));
        assert_eq!(store.get("chan1").unwrap().message_id, "msg1");
        assert_eq!(store.len(), 1);

        assert!(store.remove("chan1").is_some());
        assert!(store.get("chan1").is_none());
        // Idempotent
        assert!(store.remove("chan1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_overwrites() {
        let store = SessionStore::new();
        store.set("chan1", create_test_session(base_time()));
        store.set(
            "chan1",
            create_test_session(base_time()).with_message_id("msg2"),
        );

        assert_eq!(store.get("chan1").unwrap().message_id, "msg2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_returns_expired_sessions() {
        let store = SessionStore::new();
        store.set("chan1", create_test_session(base_time() - Duration::days(1)));
        assert!(store.get("chan1").is_some());
    }

    #[test]
    fn test_start_session_reject_policy() {
        let store = SessionStore::new();
        let now = base_time();
        store
            .start_session(
                "chan1",
                create_test_session(now + Duration::minutes(5)),
                OverwritePolicy::Reject,
                now,
            )
            .unwrap();

        let err = store
            .start_session(
                "chan1",
                create_test_session(now + Duration::minutes(5)),
                OverwritePolicy::Reject,
                now,
            )
            .unwrap_err();
        assert_eq!(err, StoreError::SessionActive("chan1".to_string()));

        // Once the first session has expired it no longer blocks
        let later = now + Duration::minutes(6);
        let replaced = store
            .start_session(
                "chan1",
                create_test_session(later + Duration::minutes(5)),
                OverwritePolicy::Reject,
                later,
            )
            .unwrap();
        assert!(replaced.is_some());
    }

    #[test]
    fn test_start_session_replace_and_warn() {
        let store = SessionStore::new();
        let now = base_time();
        let expiry = now + Duration::minutes(5);

        assert!(store
            .start_session(
                "chan1",
                create_test_session(expiry),
                OverwritePolicy::Replace,
                now,
            )
            .unwrap()
            .is_none());
        assert!(store
            .start_session(
                "chan1",
                create_test_session(expiry),
                OverwritePolicy::Replace,
                now,
            )
            .unwrap()
            .is_some());
        assert!(store
            .start_session(
                "chan1",
                create_test_session(expiry),
                OverwritePolicy::Warn,
                now,
            )
            .unwrap()
            .is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_check_start() {
        let store = SessionStore::new();
        let now = base_time();
        assert!(store.check_start("chan1", OverwritePolicy::Reject, now).is_ok());

        store.set("chan1", create_test_session(now + Duration::minutes(1)));
        assert!(store.check_start("chan1", OverwritePolicy::Reject, now).is_err());
        assert!(store.check_start("chan1", OverwritePolicy::Warn, now).is_ok());
    }

    #[test]
    fn test_start_session_validates() {
        let store = SessionStore::new();
        let empty = VoteSession::new(Vec::new(), base_time(), "m");
        let err = store
            .start_session("chan1", empty, OverwritePolicy::Replace, base_time())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSession(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_update() {
        let store = SessionStore::new();
        assert!(store.update("chan1", |s| s.cast("u1", 0).is_some()).is_none());

        store.set("chan1", create_test_session(base_time()));
        assert_eq!(store.update("chan1", |s| s.cast("u1", 1).is_some()), Some(true));
        assert_eq!(store.get("chan1").unwrap().choice_of("u1"), Some(1));
    }

    #[test]
    fn test_sweep_expired() {
        let store = SessionStore::new();
        let now = base_time();
        store.set("old", create_test_session(now - Duration::minutes(10)));
        store.set("recent", create_test_session(now - Duration::minutes(1)));
        store.set("open", create_test_session(now + Duration::minutes(1)));

        let removed = store.sweep_expired(now, Duration::minutes(5));
        assert_eq!(removed, vec!["old".to_string()]);
        assert!(store.get("recent").is_some());
        assert!(store.get("open").is_some());
    }

    #[test]
    fn test_sweep_with_unbounded_grace_keeps_sessions() {
        let store = SessionStore::new();
        let now = base_time();
        store.set("old", create_test_session(now - Duration::days(365)));

        assert!(store.sweep_expired(now, Duration::MAX).is_empty());
        assert!(store.get("old").is_some());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let store = create_store();
        store.set("old", create_test_session(Utc::now() - Duration::hours(1)));

        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = spawn_sweeper(
            Arc::clone(&store),
            std::time::Duration::from_millis(10),
            Duration::zero(),
            rx,
        );

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(store.is_empty());
    }
}
