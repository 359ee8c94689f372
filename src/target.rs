//! Request target resolution: base URL + input path + query string.

use std::collections::HashSet;
use url::{form_urlencoded, Url};

/// Returns `true` if `input` is already an absolute URL.
fn is_absolute(input: &str) -> bool {
    Url::parse(input).is_ok()
}

/// Joins the base URL and the input, then appends `query`.
///
/// An absolute input ignores the base. Slashes at the seam are normalized so
/// that exactly one separates base and path. The input's own query string is
/// kept and `query` is appended after it; an empty `query` adds nothing.
pub(crate) fn resolve_target(base: Option<&Url>, input: &str, query: &str) -> String {
    let joined = match base {
        Some(base) if !is_absolute(input) => {
            let base = base.as_str().trim_end_matches('/');
            let path = input.trim_start_matches('/');
            if path.is_empty() {
                base.to_string()
            } else {
                format!("{base}/{path}")
            }
        }
        _ => input.to_string(),
    };
    append_query(&joined, query)
}

fn append_query(target: &str, query: &str) -> String {
    if query.is_empty() {
        return target.to_string();
    }
    let (without_fragment, fragment) = match target.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (target, None),
    };
    let separator = match without_fragment.split_once('?') {
        None => "?",
        Some((_, existing)) if existing.is_empty() || existing.ends_with('&') => "",
        Some(_) => "&",
    };
    let mut resolved = format!("{without_fragment}{separator}{query}");
    if let Some(fragment) = fragment {
        resolved.push('#');
        resolved.push_str(fragment);
    }
    resolved
}

/// Returns the keys present in the input's own query string.
pub(crate) fn query_keys(input: &str) -> HashSet<String> {
    let without_fragment = input.split('#').next().unwrap_or_default();
    match without_fragment.split_once('?') {
        Some((_, query)) => form_urlencoded::parse(query.as_bytes())
            .map(|(key, _)| key.into_owned())
            .collect(),
        None => HashSet::new(),
    }
}
