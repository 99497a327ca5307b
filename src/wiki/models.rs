use chrono::{DateTime, Utc};

/// A wiki-hosted discussion thread: a head comment and the page it sits on.
///
/// Threads are the unit of migration; each maps to at most one forum topic,
/// created lazily and identified by the page's canonical URL thereafter.
#[derive(Debug, Clone)]
pub struct Thread {
    /// Page id of the head comment's own wiki page.
    pub comment_page_id: i64,
    /// Page id of the wiki page the discussion is attached to.
    pub page_id: i64,
    /// Title of the head comment.
    pub title: String,
    /// Title of the associated wiki page.
    pub page_title: String,
}

/// One comment body with its resolved author and creation time.
///
/// The author is the first contributor with a known email, falling back to
/// the most recent editor; creation time is the first revision's timestamp.
#[derive(Debug, Clone)]
pub struct Comment {
    pub page_id: i64,
    pub body: String,
    pub author_email: Option<String>,
    pub author_real_name: String,
    pub created_at: DateTime<Utc>,
}
