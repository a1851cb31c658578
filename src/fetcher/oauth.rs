//! OAuth 1.0a request signing (HMAC-SHA1)
//!
//! Builds the `Authorization` header for a request from the method, the
//! base URL, every query and form parameter, and the `oauth_*` protocol
//! parameters.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::Sha1;
use url::Url;

use crate::credentials::Credentials;
use crate::fetcher::{FetcherError, FetcherResult, HttpMethod};

/// RFC 3986 unreserved characters stay as-is, everything else is escaped
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const NONCE_LENGTH: usize = 32;

/// Percent-encode a value for signature base strings and headers
pub fn oauth_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// Signs requests with a fixed set of credentials
#[derive(Debug, Clone)]
pub struct OAuthSigner {
    credentials: Credentials,
}

impl OAuthSigner {
    /// Create a signer
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// `Authorization` header value with a fresh nonce and the current time
    pub fn authorization_header(
        &self,
        method: HttpMethod,
        url: &str,
        params: &[(String, String)],
    ) -> FetcherResult<String> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LENGTH)
            .map(char::from)
            .collect();
        self.authorization_header_with(method, url, params, &nonce, Utc::now().timestamp())
    }

    /// `Authorization` header value for an explicit nonce and timestamp
    pub fn authorization_header_with(
        &self,
        method: HttpMethod,
        url: &str,
        params: &[(String, String)],
        nonce: &str,
        timestamp: i64,
    ) -> FetcherResult<String> {
        let mut oauth_params = vec![
            ("oauth_consumer_key", self.credentials.consumer_key.clone()),
            ("oauth_nonce", nonce.to_string()),
            ("oauth_signature_method", "HMAC-SHA1".to_string()),
            ("oauth_timestamp", timestamp.to_string()),
            ("oauth_token", self.credentials.token.clone()),
            ("oauth_version", "1.0".to_string()),
        ];

        let signature = self.signature(method, url, params, &oauth_params)?;
        oauth_params.push(("oauth_signature", signature));
        oauth_params.sort();

        let fields = oauth_params
            .iter()
            .map(|(name, value)| format!("{name}=\"{}\"", oauth_encode(value)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {fields}"))
    }

    fn signature(
        &self,
        method: HttpMethod,
        url: &str,
        params: &[(String, String)],
        oauth_params: &[(&str, String)],
    ) -> FetcherResult<String> {
        let parsed = Url::parse(url)
            .map_err(|e| FetcherError::SigningError(format!("invalid URL {url}: {e}")))?;

        let mut pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(name, value)| (oauth_encode(&name), oauth_encode(&value)))
            .collect();
        pairs.extend(
            params
                .iter()
                .map(|(name, value)| (oauth_encode(name), oauth_encode(value))),
        );
        pairs.extend(
            oauth_params
                .iter()
                .map(|(name, value)| (oauth_encode(name), oauth_encode(value))),
        );
        pairs.sort();

        let parameter_string = pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        let base_string = format!(
            "{}&{}&{}",
            method.as_str(),
            oauth_encode(&base_string_uri(&parsed)),
            oauth_encode(&parameter_string)
        );

        let signing_key = format!(
            "{}&{}",
            oauth_encode(&self.credentials.consumer_secret),
            oauth_encode(&self.credentials.token_secret)
        );

        let mut mac = Hmac::<Sha1>::new_from_slice(signing_key.as_bytes())
            .map_err(|e| FetcherError::SigningError(e.to_string()))?;
        mac.update(base_string.as_bytes());

        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

/// Scheme, host, non-default port and path; no query or fragment
fn base_string_uri(url: &Url) -> String {
    let mut base = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        base.push_str(&format!(":{port}"));
    }
    base.push_str(url.path());
    base
}
