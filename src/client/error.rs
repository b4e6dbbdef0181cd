//! Consolidated, client-facing error type: everything a caller of
//! [`crate::client::producer::Producer`] or [`crate::client::Client`] can
//! see, covering the full taxonomy from the error-handling design.

use thiserror::Error;

use crate::backoff::RetryError;
use crate::connection::{self, RequestError};
use crate::protocol::error::Error as ProtocolError;
use crate::protocol::traits::WriteError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("broker connection error: {0}")]
    Connection(#[from] connection::Error),

    #[error("request error: {0}")]
    Request(#[from] RequestError),

    #[error("error encoding request: {0}")]
    Encode(#[from] WriteError),

    #[error("encoded request of {size} bytes exceeds the configured maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    #[error("no leader is currently available for {topic}-{partition}")]
    NoLeader { topic: String, partition: i32 },

    #[error("broker rejected the request for {topic}-{partition}: {protocol_error}")]
    ServerError {
        protocol_error: ProtocolError,
        topic: String,
        partition: i32,
    },

    #[error("gave up after retries: {0}")]
    RetriesExhausted(#[from] RetryError<Box<Error>>),

    #[error("{0} not found in response")]
    InvalidResponse(String),
}

impl Error {
    /// The routing errors that must invalidate cached metadata and are
    /// worth retrying with a refreshed leader; all other errors are
    /// surfaced to the caller as-is.
    pub fn retriable(&self) -> bool {
        match self {
            Self::NoLeader { .. } => true,
            Self::ServerError { protocol_error, .. } => protocol_error.retriable(),
            _ => false,
        }
    }
}
