use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode cache data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request method '{0}' is unsupported by the cache")]
    UnsupportedMethod(String),

    #[error("Refusing to store response with status {0}")]
    UnsuccessfulResponse(u16),

    #[error("Invalid cache name: {0}")]
    InvalidName(String),

    #[error("Response body already consumed")]
    BodyUsed,
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Bad response for {url}: status {status}: {body}")]
    BadResponse { url: String, status: u16, body: String },

    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, url::ParseError),

    #[error("Invalid page message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    #[error("Host error: {0}")]
    Host(String),

    #[error("Cannot {action} while worker is {state}")]
    InvalidState { action: &'static str, state: String },
}

impl WorkerError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(url: &str, status: u16, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        WorkerError::BadResponse {
            url: url.to_string(),
            status,
            body: Self::truncate_body(&text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_truncates_long_bodies() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let err = WorkerError::from_status("/app.js", 500, body.as_bytes());
        let msg = err.to_string();
        assert!(msg.contains("status 500"));
        assert!(msg.contains("truncated, 520 total bytes"));
    }

    #[test]
    fn test_from_status_keeps_short_bodies() {
        let err = WorkerError::from_status("/missing.css", 404, b"Not Found");
        assert_eq!(
            err.to_string(),
            "Bad response for /missing.css: status 404: Not Found"
        );
    }
}
