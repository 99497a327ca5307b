//! Wiki page → forum topic resolution.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::Config;
use crate::forum::{ApiError, ForumClient, NewTopic};
use crate::wiki::{self, page_url, Thread};

use super::{SyncContext, UserResolver};

/// Outcome of a topic resolution.
///
/// `created` tells the engine whether the thread's head comment still needs
/// to be posted; a found topic already carries it.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTopic {
    pub id: i64,
    pub created: bool,
}

/// Maps a discussion thread to its forum topic, creating one on first
/// reference.
///
/// Lookups go by the page's canonical URL, which is what makes repeated
/// backfill runs safe: a topic created by an earlier (or aborted) run is
/// found, never duplicated.
#[derive(Debug)]
pub struct TopicResolver<'a> {
    client: &'a ForumClient,
    users: &'a UserResolver<'a>,
    config: &'a Config,
}

impl<'a> TopicResolver<'a> {
    #[must_use]
    pub fn new(client: &'a ForumClient, users: &'a UserResolver<'a>, config: &'a Config) -> Self {
        Self {
            client,
            users,
            config,
        }
    }

    /// Resolve the forum topic for a thread, creating it if absent.
    ///
    /// On creation the topic is tagged with the page's derived keywords and
    /// the thread author is queued for subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the store, the forum, or user resolution fails.
    pub async fn resolve(
        &self,
        ctx: &mut SyncContext,
        db: &wiki::Database,
        thread: &Thread,
    ) -> Result<ResolvedTopic> {
        if let Some(id) = ctx.cached_topic(thread.page_id) {
            return Ok(ResolvedTopic { id, created: false });
        }

        let url = page_url(&self.config.wiki_url, &thread.page_title);

        if let Some(id) = self.client.find_topic_by_embed_url(&url).await? {
            debug!(page_id = thread.page_id, topic_id = id, "Topic already exists");
            ctx.cache_topic(thread.page_id, id);
            return Ok(ResolvedTopic { id, created: false });
        }

        let head = wiki::comment(db.pool(), thread.comment_page_id)
            .await
            .context("Failed to load head comment")?;
        let author = self
            .users
            .resolve(ctx, head.author_email.as_deref(), &head.author_real_name)
            .await?;

        let keywords = wiki::keywords(db.pool(), thread.page_id).await?;
        let tags = self.ensure_tags(&keywords).await?;

        let title = topic_title(&thread.page_title);
        let body = announcement_body(&url, &thread.page_title);
        let topic_id = self
            .client
            .create_topic(&NewTopic {
                title: &title,
                body: &body,
                category_id: self.config.default_category_id,
                tags: &tags,
                author: &author,
                embed_url: &url,
                external_id: thread.page_id,
            })
            .await?;

        info!(
            page_id = thread.page_id,
            topic_id,
            author = %author,
            "Created forum topic"
        );

        ctx.cache_topic(thread.page_id, topic_id);
        ctx.queue_watch(topic_id, &author);

        Ok(ResolvedTopic {
            id: topic_id,
            created: true,
        })
    }

    /// Turn page keywords into forum tags, creating missing ones in the
    /// configured tag group.
    async fn ensure_tags(&self, keywords: &[String]) -> Result<Vec<String>, ApiError> {
        let mut tags = Vec::new();
        for keyword in keywords {
            let tag = tag_slug(keyword);
            if tag.is_empty() {
                continue;
            }
            if !self.client.tag_exists(&tag).await? {
                self.client.create_tag(&tag, &self.config.tag_group).await?;
                // New tags get a curator subscription so someone sees them.
                self.client
                    .watch_tag(&tag, &self.config.fallback_username)
                    .await?;
                info!(tag = %tag, group = %self.config.tag_group, "Created forum tag");
            }
            tags.push(tag);
        }
        Ok(tags)
    }
}

/// Forum topic title for a wiki page.
fn topic_title(page_title: &str) -> String {
    format!("Discussion - {page_title}")
}

/// Announcement body of a new topic, linking back to the wiki page.
fn announcement_body(url: &str, page_title: &str) -> String {
    format!(
        "<p>This discussion topic accompanies the wiki page<br>\
         <a href=\"{url}\">{page_title}</a></p>"
    )
}

/// Forum tag slug for a wiki keyword.
fn tag_slug(keyword: &str) -> String {
    keyword.trim().to_lowercase().replace(' ', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_title() {
        assert_eq!(topic_title("Irrigation"), "Discussion - Irrigation");
    }

    #[test]
    fn test_announcement_body_links_back() {
        let body = announcement_body("https://wiki.example.org/wiki/Irrigation", "Irrigation");
        assert!(body.contains("href=\"https://wiki.example.org/wiki/Irrigation\""));
        assert!(body.contains(">Irrigation</a>"));
    }

    #[test]
    fn test_tag_slug() {
        assert_eq!(tag_slug("Crop Rotation"), "crop-rotation");
        assert_eq!(tag_slug("  Soil  "), "soil");
        assert_eq!(tag_slug(""), "");
    }
}
