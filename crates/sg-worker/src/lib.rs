//! Build worker for SiteGraph.
//!
//! The worker is the single consumer of the deployment request stream. For
//! each request it resolves the deployment's commit to its flat tree and
//! writes every file beneath `<workspace>/<site>/<commit>/` in an
//! [`ArtifactStore`], driving the deployment from `Pending` through
//! `Building` to `Success` or `Failed`.
//!
//! # Acknowledgement policy
//!
//! | Situation                              | Status         | Message    |
//! |----------------------------------------|----------------|------------|
//! | Malformed payload, unknown deployment  | unchanged      | ack (drop) |
//! | Deployment already finished            | unchanged      | ack        |
//! | Bad commit ref, missing commit or blob | `Failed`       | ack        |
//! | Invalid stored path                    | `Failed`       | ack        |
//! | Store or artifact I/O error            | stays building | release    |
//! | ...on the last allowed delivery        | `Failed`       | ack        |

pub mod artifact;
pub mod config;
pub mod error;
pub mod render;
pub mod worker;

pub use artifact::{ArtifactStore, LocalArtifactStore, MemoryArtifactStore};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use render::{render, RenderedFile};
pub use worker::{BuildWorker, Outcome, WorkerStats};
