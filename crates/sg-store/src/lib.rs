//! Record storage for SiteGraph.
//!
//! This crate holds the version graph's data model and the narrow capability
//! traits each engine component consumes:
//!
//! - [`Blob`] -- content-addressed immutable payload
//! - [`TreeEntry`] -- one `path -> blob` row of a commit's flat snapshot
//! - [`Commit`] -- immutable snapshot node with up to two parents
//! - [`Branch`] -- mutable named pointer to a commit
//!
//! # Capabilities
//!
//! - [`BlobStore`] -- insert-if-absent and point lookup by digest
//! - [`CommitStore`] -- commit lookup and tree-entry listing by commit
//! - [`BranchStore`] -- unique branch insert and lookup by `(site, name)`
//! - [`Transactional`] -- all-or-nothing application of a staged [`Transaction`]
//!
//! [`ContentStore`] layers `put`/`get` semantics over any [`BlobStore`], and
//! [`InMemoryGraphStore`] implements every capability for tests and embedding.
//!
//! # Design Rules
//!
//! 1. Blobs, commits, and tree entries are immutable once written.
//! 2. Commits, their tree entries, and branch-head moves are only written
//!    through a [`Transaction`], so a branch never points at a half-written
//!    commit.
//! 3. Branch-head moves are compare-and-swap on the previously observed head.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod content;
pub mod error;
pub mod memory;
pub mod record;
pub mod traits;
pub mod transaction;

pub use content::ContentStore;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryGraphStore;
pub use record::{Blob, Branch, Commit, EntryKind, TreeEntry, REGULAR_FILE_MODE};
pub use traits::{BlobStore, BranchStore, CommitStore, GraphStore, Transactional};
pub use transaction::{HeadUpdate, Transaction};
