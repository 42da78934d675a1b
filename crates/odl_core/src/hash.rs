//! Content-addressed hashing for ontology payloads and artifact bundles.
//!
//! Hash input is domain-prefixed (`v1:`) so a future canonical-form revision
//! can bump the prefix without colliding with existing hashes. Stored hashes
//! are bare hex; the version rides along in the payload.

use sha2::{Digest, Sha256};

/// Current hash domain prefix.
pub const HASH_VERSION: &str = "v1";

/// Hex SHA-256 of canonical ontology bytes.
pub fn content_hash(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(HASH_VERSION.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 over a set of named files, sorted by path.
/// Used for bundle content-addressing.
pub fn files_hash<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut sorted: Vec<(&str, &str)> = files.into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    hasher.update(HASH_VERSION.as_bytes());
    hasher.update(b":");
    for (path, content) in sorted {
        hasher.update(path.as_bytes());
        hasher.update(b":");
        hasher.update(content.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
