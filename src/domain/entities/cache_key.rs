//! Content-addressed cache keys.

use sha2::{Digest, Sha256};

/// A content-addressed cache key: the lowercase hex SHA-256 of its input.
///
/// Origin entries are keyed by the remote URL, derived entries by the full
/// request URI, so identical future requests short-circuit to a file send.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hashes `input` into a key. Always 64 lowercase hex characters.
    #[must_use]
    pub fn from_input(input: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_64_lowercase_hex() {
        let key = CacheKey::from_input("http://example.com/img.png");
        assert_eq!(key.as_str().len(), 64);
        assert!(key
            .as_str()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_key_determinism() {
        let a = CacheKey::from_input("http://example.com/a.jpg");
        let b = CacheKey::from_input("http://example.com/a.jpg");
        assert_eq!(a, b);
    }

    #[test]
    fn test_known_digest() {
        // sha256("abc")
        assert_eq!(
            CacheKey::from_input("abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_distinct_inputs_distinct_keys() {
        let a = CacheKey::from_input("http://example.com/a.jpg");
        let b = CacheKey::from_input("http://example.com/b.jpg");
        assert_ne!(a, b);
    }
}
