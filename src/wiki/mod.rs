//! Read-only access to the wiki's comment store.
//!
//! The migrator reads a SQLite snapshot of the wiki's comment tables; the
//! wiki itself stays authoritative for threads and comments. Nothing here
//! writes.

pub mod annotations;
mod models;
mod queries;

pub use models::*;
pub use queries::*;

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

/// Tables the snapshot must contain to be usable.
const REQUIRED_TABLES: [&str; 4] = ["cs_comment_data", "page", "comment_revision", "page_keyword"];

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the comment-store snapshot read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is missing any of
    /// the expected comment tables.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(path).read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open wiki snapshot: {}", path.display()))?;

        let db = Self { pool };
        db.verify_schema(path).await?;
        info!(path = %path.display(), "Wiki comment store opened");

        Ok(db)
    }

    /// Detect a wrong or truncated snapshot early instead of failing on the
    /// first query mid-run.
    async fn verify_schema(&self, path: &Path) -> Result<()> {
        let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list snapshot tables")?;

        let names: Vec<String> = rows.iter().map(|r| r.get::<String, _>("name")).collect();
        for table in REQUIRED_TABLES {
            if !names.iter().any(|n| n == table) {
                anyhow::bail!(
                    "wiki snapshot {} is missing table '{}' (found: {})",
                    path.display(),
                    table,
                    names.join(", ")
                );
            }
        }
        Ok(())
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Canonical URL of a wiki page, the key topics are looked up by.
#[must_use]
pub fn page_url(wiki_url: &str, page_title: &str) -> String {
    let slug = page_title.replace(' ', "_");
    format!(
        "{}/wiki/{}",
        wiki_url.trim_end_matches('/'),
        urlencoding::encode(&slug)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_replaces_spaces() {
        assert_eq!(
            page_url("https://wiki.example.org/", "Crop Rotation"),
            "https://wiki.example.org/wiki/Crop_Rotation"
        );
    }

    #[test]
    fn test_page_url_encodes_special_characters() {
        assert_eq!(
            page_url("https://wiki.example.org", "C#/Notes"),
            "https://wiki.example.org/wiki/C%23%2FNotes"
        );
    }
}
