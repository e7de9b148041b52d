// SPDX-License-Identifier: MIT OR Apache-2.0
//! Citation normalization.
//!
//! Some providers surface citations outside the JSON body (grounding
//! blocks, top-level arrays). The pipeline merges both channels into one
//! list: JSON-body citations first (their ordering takes precedence),
//! then provider-channel ones, de-duplicated preserving first occurrence,
//! filtered to well-formed http(s) URLs.

use std::collections::HashSet;
use url::Url;

/// `true` for an absolute http/https URL with a host.
fn is_http_url(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

/// Merge, de-duplicate and URL-filter citations from the JSON body and a
/// provider-specific channel.
pub fn normalize_citations(json_citations: &[String], channel_citations: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    json_citations
        .iter()
        .chain(channel_citations.iter())
        .filter(|c| is_http_url(c))
        .filter(|c| seen.insert(c.as_str().to_string()))
        .cloned()
        .collect()
}
