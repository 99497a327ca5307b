//! REST client for the Discourse forum API.
//!
//! One method per forum action, all authenticated with the admin API key and
//! impersonating the acting user via the `Api-Username` header. Calls are
//! plain request/response with no client-side state; idempotency lives in the
//! callers (embed-URL topic lookup, email-based user lookup).

mod error;

pub use error::ApiError;

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Notification level for a watched topic or tag.
///
/// Participants default to level 2 (tracking); the migration bumps them to 3.
const WATCHING: u8 = 3;

/// Fields for a new forum topic tied to a wiki page.
#[derive(Debug, Clone)]
pub struct NewTopic<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub category_id: Option<i64>,
    pub tags: &'a [String],
    /// Forum username the topic is authored as.
    pub author: &'a str,
    /// Canonical wiki page URL; the forum indexes topics by this.
    pub embed_url: &'a str,
    /// Wiki page id, stored as the topic's external id.
    pub external_id: i64,
}

/// Fields for a new post within an existing topic.
#[derive(Debug, Clone)]
pub struct NewPost<'a> {
    pub body: &'a str,
    pub topic_id: i64,
    /// Forum username the post is authored as.
    pub author: &'a str,
    /// Original wiki comment time, preserved on the forum side.
    pub created_at: Option<DateTime<Utc>>,
    pub reply_to_post_number: Option<i64>,
}

/// A successfully created post.
#[derive(Debug, Clone, Copy)]
pub struct CreatedPost {
    pub id: i64,
    pub post_number: i64,
}

/// Result of a user-creation attempt.
///
/// A username-uniqueness rejection is an expected outcome handled by the
/// caller's suffix retry, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateUserOutcome {
    Created,
    UsernameTaken,
}

#[derive(Debug, Deserialize)]
struct EmbedInfoResponse {
    topic_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: i64,
    topic_id: Option<i64>,
    post_number: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AdminListUser {
    username: String,
}

#[derive(Debug, Default, Deserialize)]
struct CreateUserErrors {
    #[serde(default)]
    username: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreateUserResponse {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Option<CreateUserErrors>,
}

/// Client for the forum REST API.
#[derive(Debug, Clone)]
pub struct ForumClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_username: String,
}

impl ForumClient {
    /// Create a new client for the given forum.
    ///
    /// # Panics
    ///
    /// Panics if the underlying HTTP client cannot be constructed.
    #[must_use]
    pub fn new(base_url: &str, api_key: &str, api_username: &str, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_username: api_username.to_string(),
        }
    }

    /// Look up the topic already tied to a wiki page URL, if any.
    ///
    /// This is the idempotency check that keeps repeated runs from creating
    /// duplicate topics.
    ///
    /// # Errors
    ///
    /// Returns an error on any failure other than the topic not existing.
    pub async fn find_topic_by_embed_url(&self, url: &str) -> Result<Option<i64>, ApiError> {
        let endpoint = format!(
            "{}/embed/info.json?embed_url={}",
            self.base_url,
            urlencoding::encode(url)
        );

        let response = self.authed(self.http.get(&endpoint), None).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check(response).await?;
        let info: EmbedInfoResponse = decode(response, "embed info").await?;
        Ok(info.topic_id)
    }

    /// Create a topic tied to a wiki page, returning its topic id.
    ///
    /// # Errors
    ///
    /// Returns an error if the forum rejects the request or the response is
    /// missing the topic id.
    pub async fn create_topic(&self, topic: &NewTopic<'_>) -> Result<i64, ApiError> {
        let mut payload = json!({
            "title": topic.title,
            "raw": topic.body,
            "embed_url": topic.embed_url,
            "external_id": topic.external_id.to_string(),
        });
        if let Some(category) = topic.category_id {
            payload["category"] = json!(category);
        }
        if !topic.tags.is_empty() {
            payload["tags"] = json!(topic.tags);
        }

        let response = self
            .authed(
                self.http.post(format!("{}/posts.json", self.base_url)),
                Some(topic.author),
            )
            .json(&payload)
            .send()
            .await?;
        let response = check(response).await?;
        let created: PostResponse = decode(response, "created topic").await?;

        created.topic_id.ok_or_else(|| {
            ApiError::unexpected_payload("topic creation response missing topic_id", "")
        })
    }

    /// Create a post in an existing topic, returning its id and post number.
    ///
    /// # Errors
    ///
    /// Returns an error if the forum rejects the request.
    pub async fn create_post(&self, post: &NewPost<'_>) -> Result<CreatedPost, ApiError> {
        let mut payload = json!({
            "raw": post.body,
            "topic_id": post.topic_id,
        });
        if let Some(created_at) = post.created_at {
            payload["created_at"] = json!(created_at.to_rfc3339());
        }
        if let Some(number) = post.reply_to_post_number {
            payload["reply_to_post_number"] = json!(number);
        }

        let response = self
            .authed(
                self.http.post(format!("{}/posts.json", self.base_url)),
                Some(post.author),
            )
            .json(&payload)
            .send()
            .await?;
        let response = check(response).await?;
        let created: PostResponse = decode(response, "created post").await?;

        let post_number = created.post_number.ok_or_else(|| {
            ApiError::unexpected_payload("post creation response missing post_number", "")
        })?;
        Ok(CreatedPost {
            id: created.id,
            post_number,
        })
    }

    /// Find the forum username registered under the given email, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the admin user listing cannot be queried.
    pub async fn user_by_email(&self, email: &str) -> Result<Option<String>, ApiError> {
        let endpoint = format!(
            "{}/admin/users/list/all.json?email={}&filter={}",
            self.base_url,
            urlencoding::encode(email),
            urlencoding::encode(email)
        );

        let response = self.authed(self.http.get(&endpoint), None).send().await?;
        let response = check(response).await?;
        let users: Vec<AdminListUser> = decode(response, "admin user list").await?;
        Ok(users.into_iter().next().map(|u| u.username))
    }

    /// Create a forum account without a password (activation handled out of
    /// band by the identity service).
    ///
    /// # Errors
    ///
    /// Returns an error for any rejection other than the username-uniqueness
    /// validation, which is reported as [`CreateUserOutcome::UsernameTaken`].
    pub async fn create_user(
        &self,
        real_name: &str,
        username: &str,
        email: &str,
    ) -> Result<CreateUserOutcome, ApiError> {
        let payload = json!({
            "name": real_name,
            "username": username,
            "email": email,
            "active": true,
            "approved": true,
        });

        let response = self
            .authed(self.http.post(format!("{}/users.json", self.base_url)), None)
            .json(&payload)
            .send()
            .await?;
        let response = check(response).await?;
        let result: CreateUserResponse = decode(response, "user creation").await?;

        if result.success {
            return Ok(CreateUserOutcome::Created);
        }

        // The forum reports username collisions as a validation message
        // containing "unique"; anything else is a real rejection.
        let username_errors = result.errors.unwrap_or_default().username;
        if username_errors.iter().any(|e| e.contains("unique")) {
            debug!(username, "Username already taken");
            return Ok(CreateUserOutcome::UsernameTaken);
        }

        Err(ApiError::Permanent {
            status: 200,
            message: if result.message.is_empty() {
                format!("user creation rejected: {username_errors:?}")
            } else {
                result.message
            },
        })
    }

    /// Subscribe a user to a topic at watching level.
    ///
    /// # Errors
    ///
    /// Returns an error if the forum rejects the subscription.
    pub async fn watch_topic(&self, topic_id: i64, username: &str) -> Result<(), ApiError> {
        let response = self
            .authed(
                self.http
                    .post(format!("{}/t/{topic_id}/notifications.json", self.base_url)),
                Some(username),
            )
            .form(&[("notification_level", WATCHING.to_string())])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Subscribe a user to a tag at watching level.
    ///
    /// # Errors
    ///
    /// Returns an error if the forum rejects the subscription.
    pub async fn watch_tag(&self, tag: &str, username: &str) -> Result<(), ApiError> {
        let response = self
            .authed(
                self.http.post(format!(
                    "{}/tag/{}/notifications.json",
                    self.base_url,
                    urlencoding::encode(tag)
                )),
                Some(username),
            )
            .form(&[("notification_level", WATCHING.to_string())])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Check whether a tag exists on the forum.
    ///
    /// # Errors
    ///
    /// Returns an error on any failure other than the tag not existing.
    pub async fn tag_exists(&self, tag: &str) -> Result<bool, ApiError> {
        let endpoint = format!(
            "{}/tag/{}.json",
            self.base_url,
            urlencoding::encode(tag)
        );

        let response = self.authed(self.http.get(&endpoint), None).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }

    /// Create a tag inside a tag group.
    ///
    /// # Errors
    ///
    /// Returns an error if the forum rejects the request.
    pub async fn create_tag(&self, tag: &str, group: &str) -> Result<(), ApiError> {
        let response = self
            .authed(
                self.http.post(format!(
                    "{}/tag_groups/{}/tags.json",
                    self.base_url,
                    urlencoding::encode(group)
                )),
                None,
            )
            .json(&json!({ "tag_name": tag }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Attach API credentials, optionally impersonating `acting_user`.
    fn authed(&self, builder: RequestBuilder, acting_user: Option<&str>) -> RequestBuilder {
        builder
            .header("Api-Key", &self.api_key)
            .header("Api-Username", acting_user.unwrap_or(&self.api_username))
    }
}

/// Map an unsuccessful response to the error taxonomy, preserving the body.
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    Err(ApiError::from_response(status.as_u16(), retry_after, body))
}

/// Decode a JSON payload, reporting undecodable bodies with their content.
async fn decode<T: serde::de::DeserializeOwned>(
    response: Response,
    context: &str,
) -> Result<T, ApiError> {
    let body = response.text().await.map_err(ApiError::from)?;
    serde_json::from_str(&body)
        .map_err(|e| ApiError::unexpected_payload(&format!("undecodable {context} ({e})"), &body))
}
