use depot_types::ObjectHash;
use sha1::{Digest, Sha1};

/// Compute the content address of raw bytes.
pub fn compute_hash(data: &[u8]) -> ObjectHash {
    ObjectHash::digest(data)
}

/// Incremental SHA-1 hasher producing an [`ObjectHash`].
///
/// Used where the hashed input is assembled from several pieces, such as the
/// concatenated child hashes of a tree.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha1,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes into the digest.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Feed the hex rendering of another object's hash.
    pub fn update_hash(&mut self, hash: &ObjectHash) -> &mut Self {
        self.update(hash.to_hex().as_bytes())
    }

    pub fn finalize(self) -> ObjectHash {
        ObjectHash::from_raw(self.inner.finalize().into())
    }

    /// Verify that data produces the expected hash.
    pub fn verify(data: &[u8], expected: &ObjectHash) -> bool {
        compute_hash(data) == *expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(compute_hash(data), compute_hash(data));
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut hasher = ContentHasher::new();
        hasher.update(b"hello ").update(b"world");
        assert_eq!(hasher.finalize(), compute_hash(b"hello world"));
    }

    #[test]
    fn update_hash_feeds_hex_text() {
        let child = compute_hash(b"child");
        let mut hasher = ContentHasher::new();
        hasher.update_hash(&child);
        assert_eq!(hasher.finalize(), compute_hash(child.to_hex().as_bytes()));
    }

    #[test]
    fn verify_correct_and_tampered_data() {
        let hash = compute_hash(b"original");
        assert!(ContentHasher::verify(b"original", &hash));
        assert!(!ContentHasher::verify(b"tampered", &hash));
    }
}
