//! Content fingerprints for fetched bodies.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the full body.
pub fn text_hash(body: &str) -> String {
  let digest = Sha256::digest(body.as_bytes());
  hex::encode(digest)
}

/// The first `max_chars` characters of `body`.
pub fn snippet(body: &str, max_chars: usize) -> String {
  match body.char_indices().nth(max_chars) {
    Some((cut, _)) => body[..cut].to_owned(),
    None => body.to_owned(),
  }
}
