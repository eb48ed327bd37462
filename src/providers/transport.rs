use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::Instant;

use super::types::ProviderFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Outbound request description, independent of the HTTP client in use.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    /// Value of a query parameter, mostly useful to fake transports.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Request(String),
}

/// Outbound network capability handed to providers, the price oracle and the
/// insight backends. Swapped for a fake in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport sharing one connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("walletscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| eyre::eyre!("Failed to build HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        builder = builder.timeout(timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}

/// Send a request bounded by `deadline` and return the raw response.
///
/// Maps 404 to `NotFound`, 429 to `RateLimited` and any other non-2xx status
/// to `UpstreamError`. A transport that does not answer before the deadline
/// yields `Timeout`.
pub async fn send_checked(
    transport: &dyn Transport,
    request: HttpRequest,
    deadline: Instant,
) -> Result<HttpResponse, ProviderFailure> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(ProviderFailure::Timeout);
    }

    let url = request.url.clone();
    let response = match tokio::time::timeout(remaining, transport.send(request, remaining)).await {
        Err(_) | Ok(Err(TransportError::Timeout)) => return Err(ProviderFailure::Timeout),
        Ok(Err(TransportError::Request(msg))) => return Err(ProviderFailure::UpstreamError(msg)),
        Ok(Ok(response)) => response,
    };

    match response.status {
        200..=299 => Ok(response),
        404 => Err(ProviderFailure::NotFound),
        429 => Err(ProviderFailure::RateLimited(format!("HTTP 429 from {}", url))),
        status => Err(ProviderFailure::UpstreamError(format!(
            "HTTP {} from {}: {}",
            status,
            url,
            truncate(&response.body, 200)
        ))),
    }
}

/// `send_checked` followed by JSON decoding of the body.
pub async fn fetch_json<T: DeserializeOwned>(
    transport: &dyn Transport,
    request: HttpRequest,
    deadline: Instant,
) -> Result<T, ProviderFailure> {
    let response = send_checked(transport, request, deadline).await?;
    serde_json::from_str(&response.body)
        .map_err(|e| ProviderFailure::UpstreamError(format!("Malformed response: {}", e)))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
