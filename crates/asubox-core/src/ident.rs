//! Container identifier generation.
//!
//! Ids are opaque unique tokens, not content hashes: the same source
//! fetched twice yields two independent containers. Derived from the
//! current time plus 16 random bytes through SHA-256, so collisions
//! are negligible within a process lifetime.

use sha2::{Digest, Sha256};

/// Generate a fresh 64-char hex container id.
pub fn generate() -> String {
    let mut hasher = Sha256::new();
    hasher.update(chrono::Utc::now().timestamp_millis().to_string().as_bytes());
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_fixed_length_hex() {
        let id = generate();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn repeated_generation_never_collides() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate()));
        }
    }
}
