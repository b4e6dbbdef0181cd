//! `MetadataRequest`/`MetadataResponse`, version 0.

use std::io::{Cursor, Read, Write};

use super::RequestBody;
use crate::protocol::api_key::ApiKey;
use crate::protocol::api_version::ApiVersion;
use crate::protocol::error::Error;
use crate::protocol::primitives::Array;
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

/// `array<string>` topic names. An empty list asks the broker for metadata
/// about every topic it hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRequest {
    pub topics: Vec<String>,
}

impl RequestBody for MetadataRequest {
    type ResponseBody = MetadataResponse;

    const API_KEY: ApiKey = ApiKey::Metadata;
    const API_VERSION: ApiVersion = ApiVersion(0);
}

impl<W: Write> WriteType<W> for MetadataRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        Array::new(self.topics.clone()).write(writer)
    }
}

impl<R: Read> ReadType<R> for MetadataRequest {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            topics: Array::<String>::read(reader)?.into_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponseBroker {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}

impl<W: Write> WriteType<W> for MetadataResponseBroker {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.node_id.write(writer)?;
        self.host.write(writer)?;
        self.port.write(writer)?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for MetadataResponseBroker {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            node_id: i32::read(reader)?,
            host: String::read(reader)?,
            port: i32::read(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponsePartition {
    pub partition: i32,
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
    pub error: Option<Error>,
}

impl<W: Write> WriteType<W> for MetadataResponsePartition {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.error.map(Error::code).unwrap_or(0).write(writer)?;
        self.partition.write(writer)?;
        self.leader.write(writer)?;
        Array::new(self.replicas.clone()).write(writer)?;
        Array::new(self.isr.clone()).write(writer)?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for MetadataResponsePartition {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let error = Error::new(i16::read(reader)?);
        let partition = i32::read(reader)?;
        let leader = i32::read(reader)?;
        let replicas = Array::<i32>::read(reader)?.into_vec();
        let isr = Array::<i32>::read(reader)?.into_vec();

        Ok(Self {
            partition,
            leader,
            replicas,
            isr,
            error,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponseTopic {
    pub topic: String,
    pub error: Option<Error>,
    pub partitions: Vec<MetadataResponsePartition>,
}

impl<W: Write> WriteType<W> for MetadataResponseTopic {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.error.map(Error::code).unwrap_or(0).write(writer)?;
        self.topic.write(writer)?;
        Array::new(self.partitions.clone()).write(writer)?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for MetadataResponseTopic {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let error = Error::new(i16::read(reader)?);
        let topic = String::read(reader)?;
        let partitions = Array::<MetadataResponsePartition>::read(reader)?.into_vec();

        Ok(Self {
            topic,
            error,
            partitions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponse {
    pub brokers: Vec<MetadataResponseBroker>,
    pub topics: Vec<MetadataResponseTopic>,
}

impl<W: Write> WriteType<W> for MetadataResponse {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        Array::new(self.brokers.clone()).write(writer)?;
        Array::new(self.topics.clone()).write(writer)?;
        Ok(())
    }
}

impl ReadType<Cursor<Vec<u8>>> for MetadataResponse {
    fn read(reader: &mut Cursor<Vec<u8>>) -> Result<Self, ReadError> {
        Ok(Self {
            brokers: Array::<MetadataResponseBroker>::read(reader)?.into_vec(),
            topics: Array::<MetadataResponseTopic>::read(reader)?.into_vec(),
        })
    }
}
