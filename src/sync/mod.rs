//! Wiki→forum synchronization core.
//!
//! The engine walks discussion threads in order, resolves each to a forum
//! topic, replays comments as posts, and subscribes participants and page
//! followers to the result. Execution is strictly sequential: concurrent
//! topic creation against the same forum can race past the embed-URL
//! uniqueness check, so one thread is finished before the next starts.

mod engine;
mod followers;
mod topics;
mod users;

pub use engine::{BackfillEngine, RunSummary};
pub use followers::{FollowerFetchError, FollowerSync};
pub use topics::{ResolvedTopic, TopicResolver};
pub use users::{ResolveError, UserResolver};

use std::collections::{HashMap, HashSet};

/// In-run caches shared by the resolvers, owned by the engine.
///
/// Nothing here persists between runs; every mapping is reconstructible from
/// the forum itself (topics by embed URL, usernames by email), which is what
/// makes re-running a batch safe.
#[derive(Debug, Default)]
pub struct SyncContext {
    /// Wiki page id → forum topic id.
    topics_by_page: HashMap<i64, i64>,
    /// Normalized email → forum username.
    usernames_by_email: HashMap<String, String>,
    /// Watch subscriptions queued but not yet issued, in queueing order.
    pending_watches: Vec<(i64, String)>,
    /// Every (topic, username) pair ever noted, for deduplication.
    noted_watches: HashSet<(i64, String)>,
}

impl SyncContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cached_topic(&self, page_id: i64) -> Option<i64> {
        self.topics_by_page.get(&page_id).copied()
    }

    pub(crate) fn cache_topic(&mut self, page_id: i64, topic_id: i64) {
        self.topics_by_page.insert(page_id, topic_id);
    }

    pub(crate) fn cached_username(&self, email: &str) -> Option<&str> {
        self.usernames_by_email.get(email).map(String::as_str)
    }

    pub(crate) fn cache_username(&mut self, email: &str, username: &str) {
        self.usernames_by_email
            .insert(email.to_string(), username.to_string());
    }

    /// Note a (topic, username) pair; returns false if it was already seen.
    ///
    /// Repeat participants and follower/participant overlaps collapse here
    /// so each pair produces at most one watch call per run.
    pub fn note_watch(&mut self, topic_id: i64, username: &str) -> bool {
        self.noted_watches.insert((topic_id, username.to_string()))
    }

    /// Queue a watch subscription for the end-of-thread flush.
    pub fn queue_watch(&mut self, topic_id: i64, username: &str) {
        if self.note_watch(topic_id, username) {
            self.pending_watches.push((topic_id, username.to_string()));
        }
    }

    /// Drain the queued subscriptions in queueing order.
    pub fn take_pending_watches(&mut self) -> Vec<(i64, String)> {
        std::mem::take(&mut self.pending_watches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_watch_deduplicates() {
        let mut ctx = SyncContext::new();
        ctx.queue_watch(7, "alice");
        ctx.queue_watch(7, "bob");
        ctx.queue_watch(7, "alice");

        let pending = ctx.take_pending_watches();
        assert_eq!(
            pending,
            vec![(7, "alice".to_string()), (7, "bob".to_string())]
        );
        // Drained pairs stay noted and are not re-queued.
        ctx.queue_watch(7, "alice");
        assert!(ctx.take_pending_watches().is_empty());
    }

    #[test]
    fn test_note_watch_distinguishes_topics() {
        let mut ctx = SyncContext::new();
        assert!(ctx.note_watch(1, "alice"));
        assert!(ctx.note_watch(2, "alice"));
        assert!(!ctx.note_watch(1, "alice"));
    }
}
