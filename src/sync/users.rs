//! Wiki identity → forum username resolution.

use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::forum::{ApiError, CreateUserOutcome, ForumClient};

use super::SyncContext;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("exhausted {attempts} username collision retries for {email}")]
    CollisionRetriesExhausted { email: String, attempts: u32 },
}

/// Maps a wiki author (email + real name) to a forum username.
///
/// Lookup-or-create: an existing account is found by email; otherwise one is
/// created under a username derived from the real name, with a numeric
/// suffix retry on collisions. Resolutions are memoized in the run context.
#[derive(Debug)]
pub struct UserResolver<'a> {
    client: &'a ForumClient,
    config: &'a Config,
}

impl<'a> UserResolver<'a> {
    #[must_use]
    pub fn new(client: &'a ForumClient, config: &'a Config) -> Self {
        Self { client, config }
    }

    /// Resolve an author to a forum username.
    ///
    /// Authors without a usable email resolve to the configured fallback
    /// account rather than failing the thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the forum cannot be queried or collision retries
    /// are exhausted.
    pub async fn resolve(
        &self,
        ctx: &mut SyncContext,
        email: Option<&str>,
        real_name: &str,
    ) -> Result<String, ResolveError> {
        let Some(email) = email.filter(|e| !e.is_empty()) else {
            warn!(real_name, "Author has no email, using fallback account");
            return Ok(self.config.fallback_username.clone());
        };

        let email = normalize_email(email, &self.config.email_domain_rewrites);

        if let Some(username) = ctx.cached_username(&email) {
            return Ok(username.to_string());
        }

        if let Some(username) = self.client.user_by_email(&email).await? {
            ctx.cache_username(&email, &username);
            return Ok(username);
        }

        let candidate = username_candidate(real_name);
        if candidate.is_empty() {
            warn!(email = %email, "Author has no usable real name, using fallback account");
            return Ok(self.config.fallback_username.clone());
        }

        let username = self.create_with_suffix_retry(&email, real_name, &candidate).await?;
        ctx.cache_username(&email, &username);
        Ok(username)
    }

    /// Create an account, appending an incrementing numeric suffix while the
    /// forum reports the username as taken.
    async fn create_with_suffix_retry(
        &self,
        email: &str,
        real_name: &str,
        base: &str,
    ) -> Result<String, ResolveError> {
        for attempt in 0..self.config.user_create_attempts {
            let candidate = if attempt == 0 {
                base.to_string()
            } else {
                format!("{base}{attempt}")
            };

            match self.client.create_user(real_name, &candidate, email).await? {
                CreateUserOutcome::Created => {
                    info!(email = %email, username = %candidate, "Created forum account");
                    return Ok(candidate);
                }
                CreateUserOutcome::UsernameTaken => {}
            }
        }

        Err(ResolveError::CollisionRetriesExhausted {
            email: email.to_string(),
            attempts: self.config.user_create_attempts,
        })
    }
}

/// Lowercase an email and apply the configured legacy-domain rewrites.
#[must_use]
pub fn normalize_email(email: &str, rewrites: &[(String, String)]) -> String {
    let email = email.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return email;
    };
    for (old, new) in rewrites {
        if domain == old {
            return format!("{local}@{new}");
        }
    }
    email
}

/// Candidate forum username derived from a wiki real name.
fn username_candidate(real_name: &str) -> String {
    real_name.trim().replace(' ', ".")
}
