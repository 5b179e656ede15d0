//! Payload fingerprints and disk file naming.

use sha2::{Digest, Sha256};

/// Hex characters kept from the digest for a fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// Longest hex-encoded key used verbatim as a file stem.
const MAX_PLAIN_STEM: usize = 200;

/// Compute the fingerprint of a serialized payload.
///
/// The first 16 hex characters (64 bits) of the payload's SHA-256 digest.
/// An identity tag only; collision resistance is not relied on.
/// Stable across processes for identical bytes; short enough to be used
/// as an ETag.
pub fn fingerprint(serialized: &[u8]) -> String {
    let digest = Sha256::digest(serialized);
    let mut out = hex::encode(digest);
    out.truncate(FINGERPRINT_LEN);
    out
}

/// Map a cache key onto a collision-free file name.
///
/// Short keys are hex-encoded so the name decodes back to the key. Long
/// keys fall back to a full SHA-256 digest with an `h-` prefix.
pub fn file_name_for_key(key: &str) -> String {
    let stem = hex::encode(key.as_bytes());
    if stem.len() <= MAX_PLAIN_STEM {
        format!("{stem}.json")
    } else {
        let digest = Sha256::digest(key.as_bytes());
        format!("h-{}.json", hex::encode(digest))
    }
}

/// Recover a key from a file name produced by [`file_name_for_key`].
///
/// Returns `None` for hashed names; those keys are only known from the
/// file body.
pub fn key_from_file_name(name: &str) -> Option<String> {
    let stem = name.strip_suffix(".json")?;
    if stem.starts_with("h-") {
        return None;
    }
    let bytes = hex::decode(stem).ok()?;
    String::from_utf8(bytes).ok()
}
