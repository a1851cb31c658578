//! HTTP transport, pagination and response parsing

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

pub mod ads_http;
pub mod ads_parser;
pub mod oauth;
pub mod pagination;

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// HTTP request error (no response received)
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// Response did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Request signing failed
    #[error("signing error: {0}")]
    SigningError(String),

    /// Non-success status from an endpoint that has no recovery path
    #[error("query failed with status {status}: {url} ({body})")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
        /// Response body, rendered for diagnostics
        body: String,
    },
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// HTTP methods used by the stats workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET, parameters in the query string
    Get,
    /// POST, parameters in a form body
    Post,
}

impl HttpMethod {
    /// Upper-case method name
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status, headers and decoded body of one API response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, keys lower-cased
    pub headers: HashMap<String, String>,
    /// JSON body, `None` when the body was empty or not JSON
    pub body: Option<Value>,
}

impl ApiResponse {
    /// Response with the given status and no headers or body
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Attach a header (name is lower-cased)
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Attach a JSON body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether the status is 200
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Header value parsed as an integer
    ///
    /// Returns `None` when the header is absent or not a number.
    pub fn header_i64(&self, name: &str) -> Option<i64> {
        self.header(name)?.trim().parse().ok()
    }

    /// Body rendered for error messages
    pub fn body_text(&self) -> String {
        match &self.body {
            Some(body) => body.to_string(),
            None => "<no JSON body>".to_string(),
        }
    }

    /// Headers rendered for error messages, sorted by name
    pub fn headers_text(&self) -> String {
        let mut pairs: Vec<_> = self.headers.iter().collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Transport collaborator issuing signed requests against the API
///
/// Implementations return every HTTP status to the caller; only failures
/// without a response (connection errors, timeouts) are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request
    ///
    /// # Arguments
    /// * `method` - GET (params in the query) or POST (params in a form body)
    /// * `url` - Absolute URL, may already carry a query string
    /// * `params` - Additional request parameters
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        params: &[(String, String)],
    ) -> FetcherResult<ApiResponse>;
}
