use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Forum API
    pub forum_url: String,
    pub forum_api_key: String,
    pub forum_api_username: String,
    pub request_timeout: Duration,

    // Wiki source
    pub wiki_url: String,
    pub wiki_db_path: PathBuf,

    // Follower directory (optional enrichment)
    pub follower_directory_url: Option<String>,

    // Topic creation
    pub default_category_id: Option<i64>,
    pub tag_group: String,

    // User resolution
    pub fallback_username: String,
    pub email_domain_rewrites: Vec<(String, String)>,
    pub user_create_attempts: u32,

    // Pacing and retries
    pub inter_thread_delay: Duration,
    pub post_retry_attempts: u32,
    pub post_retry_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Forum API
            forum_url: required_env("FORUM_URL")?,
            forum_api_key: required_env("FORUM_API_KEY")?,
            forum_api_username: env_or_default("FORUM_API_USERNAME", "system"),
            request_timeout: Duration::from_secs(parse_env_u64("REQUEST_TIMEOUT_SECS", 30)?),

            // Wiki source
            wiki_url: required_env("WIKI_URL")?,
            wiki_db_path: PathBuf::from(env_or_default("WIKI_DB_PATH", "./data/wiki.sqlite")),

            // Follower directory
            follower_directory_url: optional_env("FOLLOWER_DIRECTORY_URL"),

            // Topic creation
            default_category_id: parse_env_opt_i64("DEFAULT_CATEGORY_ID")?,
            tag_group: env_or_default("TAG_GROUP", "wiki"),

            // User resolution
            fallback_username: required_env("FALLBACK_USERNAME")?,
            email_domain_rewrites: parse_domain_rewrites(&env_or_default(
                "EMAIL_DOMAIN_REWRITES",
                "",
            ))?,
            user_create_attempts: parse_env_u32("USER_CREATE_ATTEMPTS", 10)?,

            // Pacing and retries
            inter_thread_delay: Duration::from_secs(parse_env_u64("INTER_THREAD_DELAY_SECS", 2)?),
            post_retry_attempts: parse_env_u32("POST_RETRY_ATTEMPTS", 3)?,
            post_retry_delay: Duration::from_secs(parse_env_u64("POST_RETRY_DELAY_SECS", 5)?),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.forum_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "FORUM_URL".to_string(),
                message: format!("not a valid URL: '{}'", self.forum_url),
            });
        }
        if url::Url::parse(&self.wiki_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "WIKI_URL".to_string(),
                message: format!("not a valid URL: '{}'", self.wiki_url),
            });
        }
        if self.fallback_username.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "FALLBACK_USERNAME".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.user_create_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "USER_CREATE_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.post_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "POST_RETRY_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_opt_i64(name: &str) -> Result<Option<i64>, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map(Some).map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(None),
    }
}

/// Parse a comma-separated list of `old-domain=new-domain` rewrite pairs.
///
/// The wiki changed email domains at some point; forum accounts were
/// registered under the new domain, so lookups rewrite the legacy one first.
fn parse_domain_rewrites(value: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut rewrites = Vec::new();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((old, new)) = pair.split_once('=') else {
            return Err(ConfigError::InvalidValue {
                name: "EMAIL_DOMAIN_REWRITES".to_string(),
                message: format!("expected 'old=new', got '{pair}'"),
            });
        };
        let (old, new) = (old.trim(), new.trim());
        if old.is_empty() || new.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "EMAIL_DOMAIN_REWRITES".to_string(),
                message: format!("expected 'old=new', got '{pair}'"),
            });
        }
        rewrites.push((old.to_lowercase(), new.to_lowercase()));
    }
    Ok(rewrites)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_domain_rewrites() {
        let rewrites =
            parse_domain_rewrites("old.example.org=new.example.org, legacy.net=current.net")
                .unwrap();
        assert_eq!(
            rewrites,
            vec![
                ("old.example.org".to_string(), "new.example.org".to_string()),
                ("legacy.net".to_string(), "current.net".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_domain_rewrites_empty() {
        assert!(parse_domain_rewrites("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_domain_rewrites_malformed() {
        assert!(parse_domain_rewrites("no-equals-sign").is_err());
        assert!(parse_domain_rewrites("=missing.old").is_err());
    }

    #[test]
    fn test_parse_env_opt_i64_absent() {
        assert_eq!(parse_env_opt_i64("NONEXISTENT_VAR").unwrap(), None);
    }
}
