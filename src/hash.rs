//! Field-value hashing for feedrelay.
//!
//! Article identity and comparison values are stored as lowercase hex
//! SHA-1 digests. A fresh hasher is instantiated per call so reuse across
//! concurrent passes can never leak state.

use sha1::{Digest, Sha1};

/// Hash a UTF-8 string to its lowercase hex SHA-1 digest.
pub fn sha1_hex(value: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_hex_known_vector() {
        // `echo -n "hello" | sha1sum`
        assert_eq!(
            sha1_hex("hello"),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }

    #[test]
    fn test_sha1_hex_empty_string() {
        assert_eq!(sha1_hex(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_sha1_hex_is_lowercase() {
        let digest = sha1_hex("Article Title");
        assert_eq!(digest, digest.to_lowercase());
        assert_eq!(digest.len(), 40);
    }

    #[test]
    fn test_sha1_hex_deterministic() {
        assert_eq!(sha1_hex("same input"), sha1_hex("same input"));
        assert_ne!(sha1_hex("one"), sha1_hex("two"));
    }
}
