use std::time::Duration;

use thiserror::Error;

/// Error taxonomy for forum API calls.
///
/// `Transient` errors are retry-eligible (network failures, 5xx responses,
/// explicit rate limiting). `Permanent` errors will not succeed on retry
/// (validation failures, not-found, conflicts) and abort the current run.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transient forum API error{}: {message}", fmt_status(.status))]
    Transient {
        status: Option<u16>,
        /// Server-provided wait hint, when present.
        retry_after: Option<Duration>,
        message: String,
    },
    #[error("permanent forum API error ({status}): {message}")]
    Permanent { status: u16, message: String },
}

impl ApiError {
    /// Classify an unsuccessful HTTP response.
    ///
    /// The raw body is preserved in the message so an aborted run shows the
    /// operator the exact API payload.
    #[must_use]
    pub fn from_response(status: u16, retry_after: Option<Duration>, body: String) -> Self {
        if status == 429 {
            let hint = retry_after.or_else(|| wait_seconds_hint(&body));
            Self::Transient {
                status: Some(status),
                retry_after: hint,
                message: format!("rate limited: {body}"),
            }
        } else if status >= 500 {
            Self::Transient {
                status: Some(status),
                retry_after: None,
                message: body,
            }
        } else {
            Self::Permanent {
                status,
                message: body,
            }
        }
    }

    /// A successful status but an undecodable or incomplete payload.
    #[must_use]
    pub fn unexpected_payload(context: &str, body: &str) -> Self {
        Self::Permanent {
            status: 200,
            message: format!("{context}: {body}"),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            Self::Permanent { .. } => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient {
            status: e.status().map(|s| s.as_u16()),
            retry_after: None,
            message: e.to_string(),
        }
    }
}

/// Extract the `extras.wait_seconds` hint from a rate-limit response body.
fn wait_seconds_hint(body: &str) -> Option<Duration> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("extras")
        .and_then(|e| e.get("wait_seconds"))
        .and_then(serde_json::Value::as_u64)
        .map(Duration::from_secs)
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map_or_else(String::new, |s| format!(" ({s})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_uses_header_hint() {
        let err = ApiError::from_response(429, Some(Duration::from_secs(17)), String::new());
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(17)));
    }

    #[test]
    fn test_rate_limit_falls_back_to_body_hint() {
        let body = r#"{"errors":["slow down"],"extras":{"wait_seconds":30}}"#.to_string();
        let err = ApiError::from_response(429, None, body);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_server_error_is_transient_without_hint() {
        let err = ApiError::from_response(503, None, "unavailable".to_string());
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_client_error_is_permanent() {
        let err = ApiError::from_response(422, None, "title too short".to_string());
        assert!(!err.is_transient());
    }
}
