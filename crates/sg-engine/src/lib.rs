//! Version engine for SiteGraph.
//!
//! The engine owns every mutation of a site's version graph:
//!
//! - [`VersionEngine::create_branch`] -- new named pointer, optionally at an
//!   existing commit
//! - [`VersionEngine::commit_changes`] -- full-snapshot commit that advances a
//!   branch
//! - [`VersionEngine::merge_branches`] -- two-parent commit taking the source
//!   tree ("theirs")
//!
//! Trees are flat: each commit owns one [`TreeEntry`](sg_store::TreeEntry)
//! per file, and its tree digest is computed over the sorted
//! `(path, blob digest)` pairs. There is no content-level merging.
//!
//! # Modules
//!
//! - [`engine`] -- [`VersionEngine`]
//! - [`ancestry`] -- reachability and first-parent history
//! - [`names`] -- branch name and tree path validation
//! - [`config`] -- [`EngineConfig`] and [`MergePolicy`]
//! - [`error`] -- [`EngineError`]

pub mod ancestry;
pub mod config;
pub mod engine;
pub mod error;
pub mod names;

pub use config::{EngineConfig, MergePolicy};
pub use engine::VersionEngine;
pub use error::{EngineError, Result};
pub use names::{validate_branch_name, validate_tree_layout, validate_tree_path};
