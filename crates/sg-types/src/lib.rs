//! Foundation types for SiteGraph.
//!
//! This crate provides the identifier, digest, and error-classification types
//! shared by every other SiteGraph crate.
//!
//! # Key Types
//!
//! - [`Digest`] -- Content-addressed identifier (BLAKE3 hash)
//! - [`CommitId`], [`BranchId`], [`DeploymentId`] -- UUID v7 record identifiers
//! - [`WorkspaceId`], [`SiteId`], [`EnvironmentId`], [`UserId`] -- tenant and actor identifiers
//! - [`ErrorKind`] -- The caller-facing classification every crate error maps onto

pub mod digest;
pub mod error;
pub mod id;

pub use digest::Digest;
pub use error::{ErrorKind, TypeError};
pub use id::{
    BranchId, CommitId, DeploymentId, EnvironmentId, SiteId, TreeEntryId, UserId, WorkspaceId,
};
