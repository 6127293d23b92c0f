//! Network access for requests that miss the cache.
//!
//! HTTP error statuses come back as ordinary responses; only transport
//! failures (DNS, refused connections, timeouts) are `NetworkError`s.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use tracing::debug;

use crate::error::NetworkError;
use crate::http::{Request, Response};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// Network backed by a pooled reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }

    fn transport_error(request: &Request, e: reqwest::Error) -> NetworkError {
        NetworkError::Transport {
            url: request.url().to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let method = Method::from_bytes(request.method().as_bytes())
            .map_err(|_| NetworkError::InvalidRequest(format!("bad method {}", request.method())))?;

        let mut headers = header::HeaderMap::new();
        for (name, value) in request.headers() {
            let name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
            headers.append(name, value);
        }

        let response = self
            .client
            .request(method, request.url().clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| Self::transport_error(request, e))?;

        let status = response.status();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::transport_error(request, e))?;

        debug!(url = %request.url(), status = status.as_u16(), bytes = body.len(), "Network response");

        let mut out = Response::new(status.as_u16(), body.to_vec())
            .with_status_text(status.canonical_reason().unwrap_or(""));
        for (name, value) in &response_headers {
            out = out.with_header(name, value);
        }
        Ok(out)
    }
}
