//! Error types for the fetch/cache/export pipeline.
//!
//! The orchestration in `main.rs` works with `anyhow`; everything below it
//! returns the typed [`Error`] so callers can tell a rejected request from a
//! corrupt snapshot.

use std::path::PathBuf;

/// Maximum number of characters of offending content kept in a parse error.
const EXCERPT_CHARS: usize = 200;

/// A non-success HTTP response from the FAC API.
///
/// Aborts the whole fetch of the affected dataset. Never retried.
#[derive(Debug, thiserror::Error)]
#[error("API request failed with URL {url}, status code {status}, and message: {body}")]
pub struct FetchError {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Errors raised by the fetcher, the snapshot cache and the exporters.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server answered with a non-2xx status.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The request never produced a response (connect failure, timeout, ...).
    /// The only class of failure the fetcher retries.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Base URL or endpoint could not be turned into a request URL.
    #[error("invalid endpoint URL {url}: {reason}")]
    Endpoint { url: String, reason: String },

    /// A fetch was required but no API key was configured.
    #[error("no FAC API key configured (use --api-key, FAC_API_KEY or {key_file})")]
    MissingApiKey { key_file: String },

    /// A snapshot file or a response body is not the expected JSON.
    #[error("failed to parse {origin}: {source} (content starts with: {excerpt:?})")]
    Parse {
        origin: String,
        excerpt: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a [`Error::Parse`] keeping a short excerpt of the offending text.
    pub fn parse(origin: impl Into<String>, content: &str, source: serde_json::Error) -> Self {
        Error::Parse {
            origin: origin.into(),
            excerpt: excerpt(content),
            source,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Error::Csv {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from malformed JSON.
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse { .. })
    }

    /// Whether a fresh attempt of the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}

fn excerpt(content: &str) -> String {
    let trimmed = content.trim_start();
    match trimmed.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_message_carries_url_status_and_body() {
        let err = Error::from(FetchError {
            url: "https://api.fac.gov/general?limit=10&offset=0".to_string(),
            status: 403,
            body: "forbidden".to_string(),
        });
        let msg = err.to_string();
        assert!(msg.contains("https://api.fac.gov/general?limit=10&offset=0"));
        assert!(msg.contains("403"));
        assert!(msg.contains("forbidden"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_error_truncates_excerpt() {
        let content = "x".repeat(500);
        let source = serde_json::from_str::<serde_json::Value>(&content).unwrap_err();
        let err = Error::parse("general_data.json", &content, source);
        assert!(err.is_parse());
        match err {
            Error::Parse { origin, excerpt, .. } => {
                assert_eq!(origin, "general_data.json");
                assert_eq!(excerpt.len(), EXCERPT_CHARS + 3);
                assert!(excerpt.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        let err = Error::Transport {
            url: "https://api.fac.gov/general".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
        };
        assert!(err.is_retryable());
        assert!(!err.is_parse());
    }
}
