//! The producer record on the wire: [`Message`] and the [`MessageSet`] that
//! frames one or more of them.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_message_sets>

use std::io::{Cursor, Read, Write};

use super::traits::{ReadError, ReadType, WriteError, WriteType};

/// Message format version fixed by this client: `magic = 1`.
pub const MAGIC: i8 = 1;

/// One producer record: `{ crc, magic, attributes, timestamp, key, value }`.
///
/// `crc` is CRC-32 (IEEE polynomial, `0xEDB88320`) over every byte that
/// follows it -- `magic`, `attributes`, `timestamp`, `key`, `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub magic: i8,
    pub attributes: i8,
    pub timestamp: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

impl Message {
    pub fn new(timestamp: i64, key: Option<Vec<u8>>, value: Option<Vec<u8>>) -> Self {
        Self {
            magic: MAGIC,
            attributes: 0,
            timestamp,
            key,
            value,
        }
    }

    fn encode_tail(&self) -> Result<Vec<u8>, WriteError> {
        let mut buf = Vec::new();
        self.magic.write(&mut buf)?;
        self.attributes.write(&mut buf)?;
        self.timestamp.write(&mut buf)?;
        self.key.write(&mut buf)?;
        self.value.write(&mut buf)?;
        Ok(buf)
    }

    pub fn crc(&self) -> Result<u32, WriteError> {
        Ok(crc32fast::hash(&self.encode_tail()?))
    }
}

impl<W: Write> WriteType<W> for Message {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let tail = self.encode_tail()?;
        let crc = crc32fast::hash(&tail);
        (crc as i32).write(writer)?;
        writer.write_all(&tail)?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for Message {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let wire_crc = i32::read(reader)? as u32;
        let magic = i8::read(reader)?;
        let attributes = i8::read(reader)?;
        let timestamp = i64::read(reader)?;
        let key = Option::<Vec<u8>>::read(reader)?;
        let value = Option::<Vec<u8>>::read(reader)?;

        let message = Self {
            magic,
            attributes,
            timestamp,
            key,
            value,
        };

        let tail = message
            .encode_tail()
            .map_err(|e| ReadError::MalformedInput(e.to_string()))?;
        let computed_crc = crc32fast::hash(&tail);
        if computed_crc != wire_crc {
            return Err(ReadError::MalformedInput(format!(
                "message crc mismatch: wire={wire_crc:#010x}, computed={computed_crc:#010x}"
            )));
        }

        Ok(message)
    }
}

/// One entry of a [`MessageSet`]: `{ offset, size, message }`.
///
/// On produce the client always writes `offset = 0`; the broker assigns
/// the real offset and returns it as `baseOffset` in the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSetEntry {
    pub offset: i64,
    pub message: Message,
}

impl<W: Write> WriteType<W> for MessageSetEntry {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.offset.write(writer)?;
        let mut encoded = Vec::new();
        self.message.write(&mut encoded)?;
        let size = i32::try_from(encoded.len()).map_err(WriteError::Overflow)?;
        size.write(writer)?;
        writer.write_all(&encoded)?;
        Ok(())
    }
}

/// A sequence of [`MessageSetEntry`] values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageSet(pub Vec<MessageSetEntry>);

impl MessageSet {
    /// Wraps a single record destined for `send()` with the `offset = 0`
    /// placeholder the broker overwrites on append.
    pub fn single(message: Message) -> Self {
        Self(vec![MessageSetEntry { offset: 0, message }])
    }

    pub fn encode(&self) -> Result<Vec<u8>, WriteError> {
        let mut buf = Vec::new();
        for entry in &self.0 {
            entry.write(&mut buf)?;
        }
        Ok(buf)
    }

    /// Decodes every entry in `buf`. A half-written entry at the tail (as
    /// can happen when a fetch response is size-limited) is silently
    /// dropped rather than treated as an error -- this client's core never
    /// issues fetches, but the decoder is still exercised by round-trip
    /// tests.
    pub fn decode(buf: &[u8]) -> Result<Self, ReadError> {
        let len = buf.len() as u64;
        let mut cursor = Cursor::new(buf);
        let mut entries = Vec::new();

        while cursor.position() < len {
            let start = cursor.position();
            let offset = match i64::read(&mut cursor) {
                Ok(v) => v,
                Err(ReadError::TruncatedInput(_)) if cursor.position() == start => break,
                Err(e) => return Err(e),
            };
            let size = i32::read(&mut cursor)?;
            let size = usize::try_from(size)?;
            let remaining = (len - cursor.position()) as usize;
            if size > remaining {
                break;
            }
            let message = Message::read(&mut cursor)?;
            entries.push(MessageSetEntry { offset, message });
        }

        Ok(Self(entries))
    }
}
