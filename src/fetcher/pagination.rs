//! Cursor pagination for ads API listing endpoints
//!
//! Listing responses carry a `data` array and a `next_cursor`. The first
//! request goes to the listing URL as given; every following page is the
//! same URL with `&cursor=<next_cursor>` appended, until the cursor is null.

use percent_encoding::utf8_percent_encode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::fetcher::ads_parser::{parse_next_cursor, parse_page_data};
use crate::fetcher::{FetcherError, FetcherResult, HttpMethod, Transport};

/// Cursor values are query-encoded like any other parameter value
const CURSOR_ENCODE_SET: &percent_encoding::AsciiSet = percent_encoding::NON_ALPHANUMERIC;

/// URL of the page following `url` at `cursor`
pub fn cursor_url(url: &str, cursor: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{url}{separator}cursor={}",
        utf8_percent_encode(cursor, CURSOR_ENCODE_SET)
    )
}

/// Fetch every page of a listing and deserialize its items
///
/// # Errors
/// Returns [`FetcherError::UnexpectedStatus`] if any page is not a 200,
/// or a parse error if an item does not deserialize into `T`
pub async fn fetch_all<T>(transport: &dyn Transport, url: &str) -> FetcherResult<Vec<T>>
where
    T: DeserializeOwned,
{
    let items = fetch_all_values(transport, url).await?;
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .map_err(|e| FetcherError::ParseError(format!("invalid listing item: {e}")))
        })
        .collect()
}

/// Fetch every page of a listing as raw JSON items
pub async fn fetch_all_values(transport: &dyn Transport, url: &str) -> FetcherResult<Vec<Value>> {
    let mut all_items = Vec::new();
    let mut page_url = url.to_string();
    let mut page = 0usize;

    loop {
        page += 1;
        debug!("Fetching page {} of {}", page, url);

        let response = transport.send(HttpMethod::Get, &page_url, &[]).await?;
        if !response.is_success() {
            return Err(FetcherError::UnexpectedStatus {
                status: response.status,
                url: page_url,
                body: response.body_text(),
            });
        }

        let Some(body) = response.body else {
            debug!("Page {} has no JSON body, stopping", page);
            break;
        };

        let items = parse_page_data(&body)?;
        debug!("Received {} items in page {}", items.len(), page);
        all_items.extend(items);

        match parse_next_cursor(&body) {
            Some(cursor) => page_url = cursor_url(url, &cursor),
            None => break,
        }
    }

    debug!(
        "Pagination completed after {} pages. Total items: {}",
        page,
        all_items.len()
    );

    Ok(all_items)
}
