//! URL canonicalization shared by discovery and the workflow engine.

use url::Url;

/// Canonicalize a URL: drop the fragment and any trailing slash.
///
/// Returns `None` for strings that do not parse as absolute URLs.
#[must_use]
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);
    let mut out = url.to_string();
    if out.ends_with('/') {
        out.pop();
    }
    Some(out)
}

/// Host of a URL, if it parses.
#[must_use]
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
}

/// Whether a URL's host matches an allow-list entry (exact or subdomain).
#[must_use]
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.trim().to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}
