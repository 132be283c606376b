//! Deterministic content hashing for evidence snapshots.

use sha2::{Digest, Sha256};

/// Hex sha-256 over `canonical_url`, `markdown` and `html`.
///
/// The three inputs are newline-delimited so reshuffling content between the
/// markdown and html fields cannot collide with the original.
#[must_use]
pub fn content_hash(canonical_url: &str, markdown: &str, html: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_url.as_bytes());
    hasher.update(b"\n");
    hasher.update(markdown.as_bytes());
    hasher.update(b"\n");
    hasher.update(html.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
