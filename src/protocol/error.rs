//! Broker-reported error codes.
//!
//! A response's `errorCode` field decodes to `None` when `0` (no error) or
//! `Some(Error)` otherwise. [`Error::retriable`] implements the routing
//! classification from the error taxonomy: which codes invalidate cached
//! metadata and are worth retrying, and which are surfaced to the caller
//! as-is.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("the requested offset is outside the range maintained by the server")]
    OffsetOutOfRange,

    #[error("message contents do not match its CRC")]
    CorruptMessage,

    #[error("this topic/partition does not exist on this broker")]
    UnknownTopicOrPartition,

    #[error("the message has a negative size")]
    InvalidMessageSize,

    #[error("there is no leader for this partition right now")]
    LeaderNotAvailable,

    #[error("the client's metadata is out of date: this broker is not the leader")]
    NotLeaderForPartition,

    #[error("the request exceeded the configured time limit")]
    RequestTimedOut,

    #[error("invalid timestamp in the request")]
    InvalidTimestamp,

    #[error("the message batch is larger than the broker's configured maximum")]
    RecordTooLarge,

    #[error("broker error code {0}")]
    Unknown(i16),
}

impl Error {
    /// Maps a raw `errorCode` to `None` (success) or `Some(Error)`.
    pub fn new(code: i16) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::OffsetOutOfRange),
            2 => Some(Self::CorruptMessage),
            3 => Some(Self::UnknownTopicOrPartition),
            4 => Some(Self::InvalidMessageSize),
            5 => Some(Self::LeaderNotAvailable),
            6 => Some(Self::NotLeaderForPartition),
            7 => Some(Self::RequestTimedOut),
            18 => Some(Self::InvalidTimestamp),
            20 => Some(Self::RecordTooLarge),
            other => Some(Self::Unknown(other)),
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Self::OffsetOutOfRange => 1,
            Self::CorruptMessage => 2,
            Self::UnknownTopicOrPartition => 3,
            Self::InvalidMessageSize => 4,
            Self::LeaderNotAvailable => 5,
            Self::NotLeaderForPartition => 6,
            Self::RequestTimedOut => 7,
            Self::InvalidTimestamp => 18,
            Self::RecordTooLarge => 20,
            Self::Unknown(code) => code,
        }
    }

    /// Routing errors: the client must invalidate the affected topic's
    /// cache entry and may retry with a refreshed leader.
    pub fn retriable(self) -> bool {
        matches!(
            self,
            Self::LeaderNotAvailable | Self::NotLeaderForPartition | Self::UnknownTopicOrPartition
        )
    }
}
