use std::io;

use sg_types::ErrorKind;

use crate::event::MessageId;

/// Errors produced by the event stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// I/O error while reading or writing the stream log.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A message payload does not describe a valid event.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The message id was never published to this stream.
    #[error("unknown message: {0}")]
    UnknownMessage(MessageId),

    /// The stream cannot serve requests right now.
    #[error("stream unavailable: {0}")]
    Unavailable(String),
}

impl StreamError {
    /// Caller-facing classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedPayload(_) | Self::Serialization(_) => ErrorKind::MalformedInput,
            Self::UnknownMessage(_) => ErrorKind::NotFound,
            Self::Io(_) | Self::Unavailable(_) => ErrorKind::TransientIo,
        }
    }
}

/// Convenience alias used throughout the stream crate.
pub type Result<T> = std::result::Result<T, StreamError>;
