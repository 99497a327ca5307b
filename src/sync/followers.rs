//! Best-effort follower subscriptions from the external page-follower
//! directory.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::forum::ForumClient;

use super::SyncContext;

/// Non-fatal: a failed follower fetch is logged and the thread's migration
/// continues without subscriptions.
#[derive(Debug, Error)]
pub enum FollowerFetchError {
    #[error("follower directory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("follower directory returned status {0}")]
    Status(u16),
}

#[derive(Debug, Deserialize)]
struct FollowersResponse {
    data: Vec<FollowerEntry>,
}

#[derive(Debug, Deserialize)]
struct FollowerEntry {
    user: FollowerUser,
}

#[derive(Debug, Default, Deserialize)]
struct FollowerUser {
    #[serde(default)]
    discourse_username: Option<String>,
}

/// Subscribes a page's followers to its forum topic.
#[derive(Debug)]
pub struct FollowerSync {
    http: Client,
    base_url: String,
}

impl FollowerSync {
    /// Create a client for the follower directory service.
    ///
    /// # Panics
    ///
    /// Panics if the underlying HTTP client cannot be constructed.
    #[must_use]
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Subscribe the page's followers to the topic, returning how many watch
    /// calls were issued.
    ///
    /// Best-effort enrichment: fetch and subscription failures are logged
    /// and never abort the enclosing run. Pairs already watched this run
    /// (e.g. followers who also commented) are skipped via the run context.
    pub async fn apply(
        &self,
        forum: &ForumClient,
        ctx: &mut SyncContext,
        page_id: i64,
        topic_id: i64,
    ) -> usize {
        let followers = match self.fetch(page_id).await {
            Ok(followers) => followers,
            Err(e) => {
                warn!(page_id, error = %e, "Skipping follower sync for this page");
                return 0;
            }
        };

        let mut watched = 0;
        for username in followers {
            if !ctx.note_watch(topic_id, &username) {
                continue;
            }
            match forum.watch_topic(topic_id, &username).await {
                Ok(()) => {
                    debug!(topic_id, username = %username, "Follower now watching topic");
                    watched += 1;
                }
                Err(e) => {
                    warn!(topic_id, username = %username, error = %e, "Failed to watch topic");
                }
            }
        }
        watched
    }

    /// Fetch the forum usernames of users following a wiki page.
    async fn fetch(&self, page_id: i64) -> Result<Vec<String>, FollowerFetchError> {
        let url = format!(
            "{}/api/page/{page_id}/followers?type=follow",
            self.base_url
        );

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FollowerFetchError::Status(status.as_u16()));
        }

        let payload: FollowersResponse = response.json().await?;

        let mut usernames = Vec::new();
        for entry in payload.data {
            match entry.user.discourse_username {
                Some(username) if !username.is_empty() => usernames.push(username),
                // Followers without a linked forum account are expected.
                _ => debug!(page_id, "Follower has no forum account, skipping"),
            }
        }
        Ok(usernames)
    }
}
