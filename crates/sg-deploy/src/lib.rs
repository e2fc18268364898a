//! Deployment lifecycle for SiteGraph.
//!
//! A [`Deployment`] is one attempt to publish a site at a commit. Its status
//! only ever moves forward:
//!
//! ```text
//! Pending -> Building -> Success
//!                     -> Failed
//! ```
//!
//! [`DeploymentService`] records deployments, publishes a
//! [`DeploymentRequested`](sg_stream::DeploymentRequested) event for each,
//! and exposes the status transitions the build worker drives. Audit writes
//! go to an optional [`AuditSink`] and never fail the operation they
//! describe.

pub mod audit;
pub mod error;
pub mod record;
pub mod service;
pub mod store;

pub use audit::{AuditRecord, AuditSink, InMemoryAuditLog, TracingAuditSink};
pub use error::{DeployError, DeployResult};
pub use record::{Deployment, DeploymentStatus};
pub use service::DeploymentService;
pub use store::{DeploymentStore, InMemoryDeploymentStore};
