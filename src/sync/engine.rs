//! The backfill orchestrator.
//!
//! Processes one thread at a time: topic resolution, comment replay,
//! subscriptions, follower sync, inter-thread delay. Cancellation is honored
//! only between threads so a thread is never left half-replayed by an
//! operator interrupt.

use anyhow::{Context, Result};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::forum::{ApiError, CreatedPost, ForumClient, NewPost};
use crate::wiki::{self, annotations, Comment, Thread};

use super::{FollowerSync, SyncContext, TopicResolver, UserResolver};

/// Post number a thread's head comment lands on in a topic this tool
/// created: the announcement is post 1, the head comment post 2. Used when
/// a topic is found instead of created, so replies from a resumed run still
/// attach under the head.
const HEAD_POST_NUMBER: i64 = 2;

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub threads_processed: u64,
    pub topics_created: u64,
    pub posts_created: u64,
    pub watches_issued: u64,
}

/// Sequential batch engine replaying wiki threads into the forum.
pub struct BackfillEngine {
    config: Config,
    db: wiki::Database,
    client: ForumClient,
    followers: Option<FollowerSync>,
    cancel: CancellationToken,
}

impl BackfillEngine {
    #[must_use]
    pub fn new(
        config: Config,
        db: wiki::Database,
        client: ForumClient,
        cancel: CancellationToken,
    ) -> Self {
        let followers = config
            .follower_directory_url
            .as_deref()
            .map(|url| FollowerSync::new(url, config.request_timeout));

        Self {
            config,
            db,
            client,
            followers,
            cancel,
        }
    }

    /// Run the backfill over all threads, optionally restricted to one page.
    ///
    /// Fails loud: the first permanent error, or a transient one that
    /// survives its retries, aborts the whole run. Topics are safe to resume
    /// (URL lookup finds them); replies posted by an interrupted thread may
    /// be duplicated on re-run.
    ///
    /// # Errors
    ///
    /// Returns the first unrecoverable store or API error.
    pub async fn run(&self, page_filter: Option<i64>) -> Result<RunSummary> {
        let threads = wiki::threads(self.db.pool(), page_filter).await?;
        info!(count = threads.len(), "Loaded discussion threads");

        let mut ctx = SyncContext::new();
        let users = UserResolver::new(&self.client, &self.config);
        let topics = TopicResolver::new(&self.client, &users, &self.config);

        let mut summary = RunSummary::default();
        let mut last_done: Option<i64> = None;

        for thread in &threads {
            if self.cancel.is_cancelled() {
                info!(
                    threads_processed = summary.threads_processed,
                    "Cancellation requested, stopping at thread boundary"
                );
                break;
            }

            if let Err(e) = self
                .process_thread(&mut ctx, &users, &topics, thread, &mut summary)
                .await
            {
                error!(
                    comment_page_id = thread.comment_page_id,
                    page_id = thread.page_id,
                    last_completed_page = last_done,
                    "Aborting run: {e:#}"
                );
                return Err(e).with_context(|| {
                    format!(
                        "thread for page {} failed (last completed page: {})",
                        thread.page_id,
                        last_done.map_or_else(|| "none".to_string(), |id| id.to_string())
                    )
                });
            }

            last_done = Some(thread.page_id);
            summary.threads_processed += 1;

            // Fixed pacing between threads; the forum's rate limits are the
            // constraint, not our throughput.
            sleep(self.config.inter_thread_delay).await;
        }

        info!(
            threads = summary.threads_processed,
            topics = summary.topics_created,
            posts = summary.posts_created,
            watches = summary.watches_issued,
            "Backfill complete"
        );
        Ok(summary)
    }

    /// Migrate one thread: topic, head post, replies, subscriptions.
    async fn process_thread(
        &self,
        ctx: &mut SyncContext,
        users: &UserResolver<'_>,
        topics: &TopicResolver<'_>,
        thread: &Thread,
        summary: &mut RunSummary,
    ) -> Result<()> {
        info!(
            page_id = thread.page_id,
            title = %thread.title,
            "Processing thread"
        );

        let resolved = topics.resolve(ctx, &self.db, thread).await?;
        if resolved.created {
            summary.topics_created += 1;
        }

        let head = wiki::comment(self.db.pool(), thread.comment_page_id)
            .await
            .context("Failed to load head comment")?;
        let head_author = users
            .resolve(ctx, head.author_email.as_deref(), &head.author_real_name)
            .await?;
        ctx.queue_watch(resolved.id, &head_author);

        let head_post_number = if resolved.created {
            let body = head_body(&thread.title, &head);
            let post = self
                .post_with_retry(&NewPost {
                    body: &body,
                    topic_id: resolved.id,
                    author: &head_author,
                    created_at: Some(head.created_at),
                    reply_to_post_number: None,
                })
                .await?;
            summary.posts_created += 1;
            post.post_number
        } else {
            HEAD_POST_NUMBER
        };

        for reply_page_id in wiki::reply_page_ids(self.db.pool(), thread.comment_page_id).await? {
            let reply = wiki::comment(self.db.pool(), reply_page_id)
                .await
                .context("Failed to load reply")?;
            let author = users
                .resolve(ctx, reply.author_email.as_deref(), &reply.author_real_name)
                .await?;
            ctx.queue_watch(resolved.id, &author);

            let body = reply_body(&reply);
            self.post_with_retry(&NewPost {
                body: &body,
                topic_id: resolved.id,
                author: &author,
                created_at: Some(reply.created_at),
                reply_to_post_number: Some(head_post_number),
            })
            .await?;
            summary.posts_created += 1;
        }

        // Participants watch at level 2 by default once they have posted;
        // bump everyone queued for this thread to watching.
        for (topic_id, username) in ctx.take_pending_watches() {
            self.client.watch_topic(topic_id, &username).await?;
            summary.watches_issued += 1;
        }

        if let Some(followers) = &self.followers {
            summary.watches_issued +=
                followers.apply(&self.client, ctx, thread.page_id, resolved.id).await as u64;
        }

        Ok(())
    }

    /// Create a post, retrying transient failures in a bounded backoff loop.
    ///
    /// The fixed delay applies unless the server's own wait hint is longer.
    /// Exhausted retries surface the last transient error to abort the run.
    async fn post_with_retry(&self, post: &NewPost<'_>) -> Result<CreatedPost, ApiError> {
        let mut attempt = 0;
        loop {
            match self.client.create_post(post).await {
                Ok(created) => return Ok(created),
                Err(e) if e.is_transient() && attempt + 1 < self.config.post_retry_attempts => {
                    attempt += 1;
                    let delay = e
                        .retry_after()
                        .filter(|hint| *hint > self.config.post_retry_delay)
                        .unwrap_or(self.config.post_retry_delay);
                    warn!(
                        attempt,
                        topic_id = post.topic_id,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Transient post failure, backing off"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Forum body of a head comment: bolded title plus the cleaned wikitext.
fn head_body(title: &str, head: &Comment) -> String {
    let text = annotations::strip_annotations(&head.body, title);
    let text = annotations::strip_templates(&text);
    format!("<p><b>{title}</b></p>{text}")
}

/// Forum body of a reply: the cleaned wikitext.
fn reply_body(reply: &Comment) -> String {
    annotations::strip_templates(&reply.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn comment(body: &str) -> Comment {
        Comment {
            page_id: 1,
            body: body.to_string(),
            author_email: None,
            author_real_name: "Alice Martin".to_string(),
            created_at: Utc.with_ymd_and_hms(2021, 3, 4, 10, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_head_body_strips_annotations_and_prefixes_title() {
        let annotated = annotations::add_annotations("The pump question.", "Irrigation");
        let body = head_body("Irrigation", &comment(&annotated));
        assert_eq!(body, "<p><b>Irrigation</b></p>The pump question.");
    }

    #[test]
    fn test_reply_body_strips_templates() {
        let body = reply_body(&comment("See {{PageLink|Irrigation}} for context."));
        assert_eq!(body, "See  for context.");
    }
}
