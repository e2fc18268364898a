//! Deterministic digest over a flat tree listing.
//!
//! The listing is sorted by path before hashing, so the digest depends only on
//! the set of `(path, blob digest)` pairs and never on insertion order. Each
//! path is length-prefixed so `("ab", x)` and `("a", "b"…)` cannot collide.
//!
//! Encoding fed to [`ContentHasher::TREE`], per entry in path order:
//!
//! ```text
//! [8 bytes: path length (little-endian u64)]
//! [N bytes: UTF-8 path]
//! [32 bytes: blob digest]
//! ```

use sg_types::Digest;

use crate::hasher::ContentHasher;

/// Compute the tree digest for a set of `(path, blob digest)` pairs.
///
/// Order-independent: callers may pass entries in any order. The empty tree
/// has a well-defined digest of its own.
pub fn tree_digest<'a, I>(entries: I) -> Digest
where
    I: IntoIterator<Item = (&'a str, &'a Digest)>,
{
    let mut sorted: Vec<(&str, &Digest)> = entries.into_iter().collect();
    sorted.sort();

    let mut hasher = ContentHasher::TREE.start();
    hasher.update(&(sorted.len() as u64).to_le_bytes());
    for (path, blob) in sorted {
        hasher.update(&(path.len() as u64).to_le_bytes());
        hasher.update(path.as_bytes());
        hasher.update(blob.as_bytes());
    }
    Digest::from_hash(*hasher.finalize().as_bytes())
}
