//! Internal-link rewriting: turning a Notes-style reference into an
//! external redirect URL, and (optionally) an auxiliary search link.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Encodes everything but unreserved characters, so the raw reference can't
/// smuggle `?`/`&`/`=` into the outer query string.
const QUERY_FRAGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Options that apply to every renderer, resolved once per process
/// invocation from CLI/env configuration.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// External base URL Notes references are rewritten against, e.g.
    /// `https://notes-gateway.example.com/redirect`.
    pub notes_redirect_base: Option<String>,
    /// Base URL for an auxiliary full-text search link alongside internal
    /// references.
    pub box_search_base: Option<String>,
}

/// Builds `<base>[?&]NotesURL=<percent-encoded raw_url>`, choosing `?` or
/// `&` depending on whether `base` already carries a query string.
#[must_use]
pub fn notes_redirect_url(base: &str, raw_url: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    let encoded = utf8_percent_encode(raw_url, QUERY_FRAGMENT);
    format!("{base}{separator}NotesURL={encoded}")
}

/// Builds an auxiliary search link for `query` against `base`, using the
/// same query-string convention as [`notes_redirect_url`].
#[must_use]
pub fn box_search_url(base: &str, query: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    let encoded = utf8_percent_encode(query, QUERY_FRAGMENT);
    format!("{base}{separator}q={encoded}")
}
