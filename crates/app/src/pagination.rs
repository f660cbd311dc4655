//! Cursor pagination
//!
//! Page tokens are opaque to callers: URL-safe base64 of `<sortValue>|<docId>`.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageTokenError {
    #[error("page token is not valid base64")]
    Encoding,

    #[error("page token is malformed")]
    Malformed,
}

/// Caller supplied page position and size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageRequest {
    /// Token from a previous page; empty or absent for the first page.
    pub token: Option<String>,

    /// Requested size; defaulted and clamped per listing.
    pub size: Option<u32>,
}

impl PageRequest {
    #[must_use]
    pub fn first(size: u32) -> Self {
        Self {
            token: None,
            size: Some(size),
        }
    }

    #[must_use]
    pub fn after(token: impl Into<String>, size: u32) -> Self {
        Self {
            token: Some(token.into()),
            size: Some(size),
        }
    }

    /// The token, with empty strings treated as absent.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.trim().is_empty())
    }

    pub(crate) fn size(&self, limits: PageLimits) -> usize {
        let size = self
            .size
            .unwrap_or(limits.default)
            .clamp(1, limits.max);

        usize::try_from(size).unwrap_or(usize::MAX)
    }
}

/// Default and maximum page sizes of one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageLimits {
    pub(crate) default: u32,
    pub(crate) max: u32,
}

pub(crate) const CATALOG_PAGES: PageLimits = PageLimits {
    default: 25,
    max: 100,
};

pub(crate) const USAGE_PAGES: PageLimits = PageLimits {
    default: 50,
    max: 200,
};

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Present iff more rows exist.
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// Build a page from `size + 1` fetched rows; the extra row only signals
    /// that another page exists.
    pub(crate) fn from_overfetch<F>(mut items: Vec<T>, size: usize, cursor: F) -> Self
    where
        F: Fn(&T) -> (String, String),
    {
        let more = items.len() > size;

        items.truncate(size);

        let next_page_token = more
            .then(|| items.last())
            .flatten()
            .map(|last| {
                let (sort_value, doc_id) = cursor(last);
                encode_token(&sort_value, &doc_id)
            });

        Self {
            items,
            next_page_token,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_page_token: self.next_page_token,
        }
    }
}

pub(crate) fn encode_token(sort_value: &str, doc_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(format!("{sort_value}|{doc_id}"))
}

/// Split a token back into `(sortValue, docId)`.
pub(crate) fn decode_token(token: &str) -> Result<(String, String), PageTokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_error| PageTokenError::Encoding)?;

    let raw = String::from_utf8(bytes).map_err(|_error| PageTokenError::Malformed)?;

    let (sort_value, doc_id) = raw.split_once('|').ok_or(PageTokenError::Malformed)?;

    if doc_id.is_empty() {
        return Err(PageTokenError::Malformed);
    }

    Ok((sort_value.to_string(), doc_id.to_string()))
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn tokens_round_trip_ids_containing_separators() -> TestResult {
        let token = encode_token("42", "user|with|pipes");

        assert_eq!(
            decode_token(&token)?,
            ("42".to_string(), "user|with|pipes".to_string())
        );

        Ok(())
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert_eq!(decode_token("***"), Err(PageTokenError::Encoding));
        assert_eq!(
            decode_token(&URL_SAFE_NO_PAD.encode("no-separator")),
            Err(PageTokenError::Malformed)
        );
    }

    #[test]
    fn sizes_are_defaulted_and_clamped() {
        assert_eq!(PageRequest::default().size(USAGE_PAGES), 50);
        assert_eq!(PageRequest::first(0).size(USAGE_PAGES), 1);
        assert_eq!(PageRequest::first(500).size(USAGE_PAGES), 200);
        assert_eq!(PageRequest::first(500).size(CATALOG_PAGES), 100);
    }

    #[test]
    fn overfetch_sets_the_next_token_only_when_rows_remain() {
        let cursor = |value: &u32| (value.to_string(), format!("doc-{value}"));

        let full = Page::from_overfetch(vec![1, 2, 3], 2, cursor);
        let last = Page::from_overfetch(vec![1, 2], 2, cursor);

        assert_eq!(full.items, vec![1, 2]);
        assert_eq!(full.next_page_token, Some(encode_token("2", "doc-2")));
        assert_eq!(last.next_page_token, None);
    }

    #[test]
    fn blank_tokens_mean_first_page() {
        assert_eq!(PageRequest::after("  ", 10).token(), None);
    }
}
