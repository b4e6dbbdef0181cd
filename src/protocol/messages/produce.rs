//! `ProduceRequest`/`ProduceResponse`, version 2.

use std::io::{Cursor, Read, Write};

use super::RequestBody;
use crate::protocol::api_key::ApiKey;
use crate::protocol::api_version::ApiVersion;
use crate::protocol::error::Error;
use crate::protocol::primitives::Array;
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceRequestPartition {
    pub partition: i32,
    /// An encoded [`crate::protocol::message::MessageSet`], wrapped as a
    /// non-null `bytes` field.
    pub message_set: Vec<u8>,
}

impl<W: Write> WriteType<W> for ProduceRequestPartition {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.partition.write(writer)?;
        self.message_set.write(writer)?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for ProduceRequestPartition {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            partition: i32::read(reader)?,
            message_set: Vec::<u8>::read(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceRequestTopic {
    pub topic: String,
    pub partitions: Vec<ProduceRequestPartition>,
}

impl<W: Write> WriteType<W> for ProduceRequestTopic {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.topic.write(writer)?;
        Array::new(self.partitions.clone()).write(writer)?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for ProduceRequestTopic {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            topic: String::read(reader)?,
            partitions: Array::<ProduceRequestPartition>::read(reader)?.into_vec(),
        })
    }
}

/// `acks`: `0` fire-and-forget (broker sends no response at all -- see the
/// Broker Connection's no-pending-entry rule), `1` leader ack, `-1` full ISR
/// ack. `timeout_ms` bounds how long the broker waits on replication before
/// answering; it is not a client-side request timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceRequest {
    pub acks: i16,
    pub timeout_ms: i32,
    pub topics: Vec<ProduceRequestTopic>,
}

impl RequestBody for ProduceRequest {
    type ResponseBody = ProduceResponse;

    const API_KEY: ApiKey = ApiKey::Produce;
    const API_VERSION: ApiVersion = ApiVersion(2);
}

impl<W: Write> WriteType<W> for ProduceRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.acks.write(writer)?;
        self.timeout_ms.write(writer)?;
        Array::new(self.topics.clone()).write(writer)?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for ProduceRequest {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            acks: i16::read(reader)?,
            timeout_ms: i32::read(reader)?,
            topics: Array::<ProduceRequestTopic>::read(reader)?.into_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponsePartition {
    pub partition: i32,
    pub error: Option<Error>,
    /// The offset the broker assigned to the first message of the set.
    pub base_offset: i64,
    pub log_append_time: i64,
}

impl<W: Write> WriteType<W> for ProduceResponsePartition {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.partition.write(writer)?;
        self.error.map(Error::code).unwrap_or(0).write(writer)?;
        self.base_offset.write(writer)?;
        self.log_append_time.write(writer)?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for ProduceResponsePartition {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            partition: i32::read(reader)?,
            error: Error::new(i16::read(reader)?),
            base_offset: i64::read(reader)?,
            log_append_time: i64::read(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponseTopic {
    pub topic: String,
    pub partitions: Vec<ProduceResponsePartition>,
}

impl<W: Write> WriteType<W> for ProduceResponseTopic {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.topic.write(writer)?;
        Array::new(self.partitions.clone()).write(writer)?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for ProduceResponseTopic {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            topic: String::read(reader)?,
            partitions: Array::<ProduceResponsePartition>::read(reader)?.into_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponse {
    pub topics: Vec<ProduceResponseTopic>,
    pub throttle_time_ms: i32,
}

impl<W: Write> WriteType<W> for ProduceResponse {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        Array::new(self.topics.clone()).write(writer)?;
        self.throttle_time_ms.write(writer)?;
        Ok(())
    }
}

impl ReadType<Cursor<Vec<u8>>> for ProduceResponse {
    fn read(reader: &mut Cursor<Vec<u8>>) -> Result<Self, ReadError> {
        Ok(Self {
            topics: Array::<ProduceResponseTopic>::read(reader)?.into_vec(),
            throttle_time_ms: i32::read(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{Message, MessageSet};

    fn sample_message_set() -> Vec<u8> {
        MessageSet::single(Message::new(0, None, Some(b"payload".to_vec())))
            .encode()
            .unwrap()
    }

    #[test]
    fn test_request_roundtrip() {
        let req = ProduceRequest {
            acks: 1,
            timeout_ms: 1500,
            topics: vec![ProduceRequestTopic {
                topic: "orders".to_string(),
                partitions: vec![ProduceRequestPartition {
                    partition: 0,
                    message_set: sample_message_set(),
                }],
            }],
        };

        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();

        let restored = ProduceRequest::read(&mut Cursor::new(buf.as_slice())).unwrap();
        assert_eq!(restored, req);
    }

    #[test]
    fn test_response_roundtrip() {
        let resp = ProduceResponse {
            topics: vec![ProduceResponseTopic {
                topic: "orders".to_string(),
                partitions: vec![ProduceResponsePartition {
                    partition: 0,
                    error: None,
                    base_offset: 42,
                    log_append_time: -1,
                }],
            }],
            throttle_time_ms: 0,
        };

        let mut buf = Vec::new();
        resp.write(&mut buf).unwrap();

        let restored = ProduceResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, resp);
    }

    #[test]
    fn test_response_not_leader_for_partition() {
        let resp = ProduceResponse {
            topics: vec![ProduceResponseTopic {
                topic: "orders".to_string(),
                partitions: vec![ProduceResponsePartition {
                    partition: 0,
                    error: Some(Error::NotLeaderForPartition),
                    base_offset: -1,
                    log_append_time: -1,
                }],
            }],
            throttle_time_ms: 0,
        };

        let mut buf = Vec::new();
        resp.write(&mut buf).unwrap();
        let restored = ProduceResponse::read(&mut Cursor::new(buf)).unwrap();

        let partition = &restored.topics[0].partitions[0];
        assert_eq!(partition.error, Some(Error::NotLeaderForPartition));
        assert!(partition.error.unwrap().retriable());
    }

    #[test]
    fn test_acks_zero_is_fire_and_forget_marker() {
        // acks = 0 carries no special wire shape; the no-response behavior
        // lives in the Broker Connection, not in this codec. This just
        // pins the encoding of the value itself.
        let req = ProduceRequest {
            acks: 0,
            timeout_ms: 0,
            topics: vec![],
        };
        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(&buf[0..2], &[0x00, 0x00]);
    }
}
