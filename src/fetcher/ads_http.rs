//! Ads API HTTP client
//!
//! reqwest-backed [`Transport`] with:
//! - OAuth 1.0a signing of every request
//! - Caller-supplied extra headers
//! - Retry with exponential backoff for requests that got no response
//! - Response header capture for cost and rate-limit accounting

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::credentials::Credentials;
use crate::fetcher::oauth::OAuthSigner;
use crate::fetcher::{ApiResponse, FetcherError, FetcherResult, HttpMethod, Transport};
use crate::metrics::{record_retry_backoff, HttpRequestMetrics};
use crate::stats::config::{calculate_backoff, MAX_RETRIES};

/// HTTP connect timeout (seconds) - time to establish TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for the entire request
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Signed HTTP client for the ads API
pub struct AdsHttpClient {
    client: Client,
    signer: OAuthSigner,
    extra_headers: Vec<(String, String)>,
    max_retries: u32,
}

impl AdsHttpClient {
    /// Create a client with default timeouts
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built
    pub fn new(credentials: Credentials) -> FetcherResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetcherError::HttpError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, credentials))
    }

    /// Create a client around an existing reqwest client
    pub fn with_client(client: Client, credentials: Credentials) -> Self {
        Self {
            client,
            signer: OAuthSigner::new(credentials),
            extra_headers: Vec::new(),
            max_retries: MAX_RETRIES,
        }
    }

    /// Headers added to every request
    pub fn with_extra_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.extra_headers = headers;
        self
    }

    /// Set how often a request without response is retried
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn build_request(
        &self,
        method: HttpMethod,
        url: &str,
        params: &[(String, String)],
    ) -> FetcherResult<reqwest::RequestBuilder> {
        let authorization = self.signer.authorization_header(method, url, params)?;

        let mut request = match method {
            HttpMethod::Get => self.client.get(url).query(params),
            HttpMethod::Post => self.client.post(url).form(params),
        };

        request = request.header(reqwest::header::AUTHORIZATION, authorization);
        for (name, value) in &self.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        Ok(request)
    }
}

#[async_trait]
impl Transport for AdsHttpClient {
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        params: &[(String, String)],
    ) -> FetcherResult<ApiResponse> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            // Re-signed per attempt: the nonce must not be reused.
            let request = self.build_request(method, url, params)?;
            let metrics = HttpRequestMetrics::start(method, url, attempt + 1);

            debug!(
                method = %method,
                url = %url,
                params = params.len(),
                attempt = attempt + 1,
                "Sending request"
            );

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    metrics.record_network_error();
                    warn!(
                        "Network error on attempt {}/{}: {}",
                        attempt + 1,
                        self.max_retries + 1,
                        e
                    );
                    last_error = Some(FetcherError::HttpError(e.to_string()));

                    if attempt < self.max_retries {
                        let backoff = calculate_backoff(attempt);
                        record_retry_backoff(backoff, attempt + 1);
                        debug!("Retrying after {:?}", backoff);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status().as_u16();
            metrics.record_complete(status);

            let headers = collect_headers(response.headers());
            let text = response
                .text()
                .await
                .map_err(|e| FetcherError::HttpError(format!("failed to read body: {e}")))?;
            let body = decode_body(&text);

            return Ok(ApiResponse {
                status,
                headers,
                body,
            });
        }

        Err(last_error
            .unwrap_or_else(|| FetcherError::HttpError("All retries exhausted".to_string())))
    }
}

/// Lower-cased header map; values that are not valid strings are skipped
fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

/// JSON body or `None` if the body does not decode
fn decode_body(text: &str) -> Option<Value> {
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            if !text.is_empty() {
                debug!("Response body is not JSON: {}", e);
            }
            None
        }
    }
}

/// Parse an extra header given as `Key: Value`
pub fn parse_header(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once(':')?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}
