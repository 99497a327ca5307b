use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::models::{Comment, Thread};

/// Fetch all discussion threads, optionally restricted to one wiki page.
///
/// Head comments are the rows with no parent; ordering is by associated
/// page then comment page so runs are deterministic and resumable.
pub async fn threads(pool: &SqlitePool, page_filter: Option<i64>) -> Result<Vec<Thread>> {
    let base = r"
        SELECT c.cst_page_id, c.cst_assoc_page_id, c.cst_comment_title, p.page_title
        FROM cs_comment_data c
        INNER JOIN page p ON p.page_id = c.cst_assoc_page_id
        WHERE c.cst_parent_page_id IS NULL
        ";

    let rows = if let Some(page_id) = page_filter {
        sqlx::query(&format!(
            "{base} AND c.cst_assoc_page_id = ? ORDER BY c.cst_assoc_page_id, c.cst_page_id"
        ))
        .bind(page_id)
        .fetch_all(pool)
        .await
    } else {
        sqlx::query(&format!(
            "{base} ORDER BY c.cst_assoc_page_id, c.cst_page_id"
        ))
        .fetch_all(pool)
        .await
    }
    .context("Failed to fetch discussion threads")?;

    Ok(rows
        .iter()
        .map(|row| Thread {
            comment_page_id: row.get("cst_page_id"),
            page_id: row.get("cst_assoc_page_id"),
            title: row.get("cst_comment_title"),
            page_title: row.get("page_title"),
        })
        .collect())
}

/// Page ids of a thread's direct replies, in stored (creation) order.
pub async fn reply_page_ids(pool: &SqlitePool, parent_page_id: i64) -> Result<Vec<i64>> {
    let rows = sqlx::query(
        r"
        SELECT c.cst_page_id
        FROM cs_comment_data c
        INNER JOIN (
            SELECT page_id, MIN(created_at) AS created_at
            FROM comment_revision
            GROUP BY page_id
        ) r ON r.page_id = c.cst_page_id
        WHERE c.cst_parent_page_id = ?
        ORDER BY r.created_at, c.cst_page_id
        ",
    )
    .bind(parent_page_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch reply pages")?;

    Ok(rows.iter().map(|row| row.get("cst_page_id")).collect())
}

/// Load one comment: latest body, resolved author, first-revision timestamp.
pub async fn comment(pool: &SqlitePool, page_id: i64) -> Result<Comment> {
    let latest = sqlx::query(
        r"
        SELECT body, author_email, author_real_name
        FROM comment_revision
        WHERE page_id = ?
        ORDER BY rev_id DESC
        LIMIT 1
        ",
    )
    .bind(page_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch comment revision")?
    .with_context(|| format!("Comment page {page_id} has no revisions"))?;

    // Attribution prefers the first contributor with a known email over the
    // most recent editor.
    let first_with_email = sqlx::query(
        r"
        SELECT author_email, author_real_name
        FROM comment_revision
        WHERE page_id = ? AND author_email IS NOT NULL AND author_email != ''
        ORDER BY rev_id ASC
        LIMIT 1
        ",
    )
    .bind(page_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch comment author")?;

    let earliest: String = sqlx::query(
        r"
        SELECT created_at
        FROM comment_revision
        WHERE page_id = ?
        ORDER BY rev_id ASC
        LIMIT 1
        ",
    )
    .bind(page_id)
    .fetch_one(pool)
    .await
    .context("Failed to fetch comment creation time")?
    .get("created_at");

    let (author_email, author_real_name) = match first_with_email {
        Some(row) => (
            Some(row.get::<String, _>("author_email")),
            row.get("author_real_name"),
        ),
        None => (
            row_opt_string(&latest, "author_email"),
            latest.get("author_real_name"),
        ),
    };

    Ok(Comment {
        page_id,
        body: latest.get("body"),
        author_email,
        author_real_name,
        created_at: parse_timestamp(&earliest, page_id)?,
    })
}

/// Keywords associated with a wiki page, the source of derived topic tags.
pub async fn keywords(pool: &SqlitePool, page_id: i64) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT keyword FROM page_keyword WHERE page_id = ? ORDER BY keyword",
    )
    .bind(page_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch page keywords")?;

    Ok(rows.iter().map(|row| row.get("keyword")).collect())
}

fn row_opt_string(row: &sqlx::sqlite::SqliteRow, column: &str) -> Option<String> {
    row.get::<Option<String>, _>(column).filter(|s| !s.is_empty())
}

fn parse_timestamp(value: &str, page_id: i64) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Comment page {page_id} has malformed timestamp '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        let dt = parse_timestamp("2021-03-04T10:30:00Z", 1).unwrap();
        assert_eq!(dt.to_rfc3339(), "2021-03-04T10:30:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("20210304103000", 1).is_err());
    }
}
