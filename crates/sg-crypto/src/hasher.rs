use sg_types::Digest;

/// BLAKE3 seeded with `"<tag>:"`, one tag per record kind.
///
/// Only the two tags below exist; blob payloads and tree listings with the
/// same bytes hash apart.
#[derive(Clone, Copy, Debug)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for blob payloads.
    pub const BLOB: Self = Self {
        domain: "sg-blob-v1",
    };
    /// Hasher for flat tree listings.
    pub const TREE: Self = Self {
        domain: "sg-tree-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = self.start();
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Begin an incremental hash already seeded with the domain tag.
    pub fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// Whether `data` hashes to `expected` under this tag.
    pub fn verify(&self, data: &[u8], expected: &Digest) -> bool {
        self.hash(data) == *expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"<html>Hello</html>";
        assert_eq!(ContentHasher::BLOB.hash(data), ContentHasher::BLOB.hash(data));
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        assert_ne!(ContentHasher::BLOB.hash(data), ContentHasher::TREE.hash(data));
    }

    #[test]
    fn domain_hash_differs_from_raw_hash() {
        assert_ne!(ContentHasher::BLOB.hash(b"test"), Digest::of(b"test"));
    }

    #[test]
    fn blob_digest_does_not_verify_as_tree() {
        let digest = ContentHasher::BLOB.hash(b"index.html");
        assert!(ContentHasher::BLOB.verify(b"index.html", &digest));
        assert!(!ContentHasher::BLOB.verify(b"index.htm", &digest));
        assert!(!ContentHasher::TREE.verify(b"index.html", &digest));
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut h = ContentHasher::TREE.start();
        h.update(b"abc");
        let incremental = Digest::from_hash(*h.finalize().as_bytes());
        assert_eq!(incremental, ContentHasher::TREE.hash(b"abc"));
    }
}
