//! Deployment event stream for SiteGraph.
//!
//! A stream is an ordered, append-only sequence of messages consumed with
//! consumer-group semantics: a claimed message is invisible to other claims
//! until it is acknowledged (gone for good) or released (claimable again).
//! Delivery is at-least-once.
//!
//! # Modules
//!
//! - [`event`] -- [`StreamMessage`], [`DeploymentRequested`] payload schema
//! - [`traits`] -- [`EventPublisher`] and [`StreamConsumer`]
//! - [`memory`] -- [`InMemoryStream`] for tests and single-process use
//! - [`durable`] -- [`DurableStream`], replayed from a [`StreamLog`]
//! - [`log`] -- length + CRC32 framed record log
//! - [`config`] -- [`StreamConfig`]

pub mod config;
pub mod durable;
pub mod error;
pub mod event;
mod group;
pub mod log;
pub mod memory;
pub mod traits;

pub use config::StreamConfig;
pub use durable::DurableStream;
pub use error::{Result, StreamError};
pub use event::{DeploymentRequested, Fields, MessageId, StreamMessage, DEPLOYMENT_ID_FIELD};
pub use log::{LogRecord, StreamLog};
pub use memory::InMemoryStream;
pub use traits::{EventPublisher, StreamConsumer};
