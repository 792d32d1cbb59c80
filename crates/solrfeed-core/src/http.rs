//! Blocking JSON POST over a shared async HTTP stack.
//!
//! Uses async reqwest internally on a small shared tokio runtime, but presents
//! a sync interface so the pipeline can stay a plain sequential loop.

use std::sync::LazyLock;
use std::time::Duration;

/// Longest response body excerpt kept in an error message
const ERROR_BODY_LIMIT: usize = 512;

/// Transport settings for the index client.
///
/// Both timeouts default to `None`: the request blocks for as long as the
/// transport allows, so a hung server stalls the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpConfig {
    /// Whole-request deadline (connect + upload + response)
    pub request_timeout: Option<Duration>,
    /// TCP connect deadline
    pub connect_timeout: Option<Duration>,
}

/// Error types for HTTP operations
#[derive(Debug)]
pub enum HttpError {
    /// No HTTP response was obtained (refused, DNS, timeout, broken body)
    Transport { message: String },
    /// Server answered with a non-2xx status
    Status { status: u16, body: String },
    /// Client could not be constructed
    Client { message: String },
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport { message } => write!(f, "transport error: {message}"),
            Self::Status { status, body } if body.is_empty() => write!(f, "HTTP {status}"),
            Self::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Client { message } => write!(f, "cannot build HTTP client: {message}"),
        }
    }
}

impl std::error::Error for HttpError {}

impl HttpError {
    /// Create transport error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Transport {
            message: e.to_string(),
        }
    }
}

/// Shared tokio runtime for HTTP operations.
static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Build an HTTP client honoring the configured timeouts.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client, HttpError> {
    let mut builder = reqwest::Client::builder().pool_max_idle_per_host(8);
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(timeout) = config.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    builder.build().map_err(|e| HttpError::Client {
        message: e.to_string(),
    })
}

/// POST `body` as `application/json` and block until the server answers.
///
/// Any 2xx status is success. Must not be called from inside an async context.
pub fn post_json(client: &reqwest::Client, url: &str, body: Vec<u8>) -> Result<(), HttpError> {
    SHARED_RUNTIME.handle().block_on(async {
        let response = client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| HttpError::from_reqwest(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // Best effort: the status alone is enough to fail the request
        let text = response.text().await.unwrap_or_default();
        Err(HttpError::Status {
            status: status.as_u16(),
            body: excerpt(&text, ERROR_BODY_LIMIT),
        })
    })
}

/// Trim and cut `text` to at most `limit` bytes on a char boundary.
fn excerpt(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
