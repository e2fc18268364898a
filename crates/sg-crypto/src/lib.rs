//! Content hashing for SiteGraph.
//!
//! - [`ContentHasher`] -- domain-separated BLAKE3 hashing for blobs and trees
//! - [`tree_digest`] -- order-independent digest over a commit's `(path, blob)` pairs

pub mod hasher;
pub mod tree;

pub use hasher::ContentHasher;
pub use tree::tree_digest;
