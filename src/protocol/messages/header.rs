use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::ApiVersion,
    traits::{ReadError, ReadType, WriteError, WriteType},
};

/// The fixed portion of the [request envelope](crate::protocol::messages)
/// that precedes the request body.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestHeader {
    pub api_key: ApiKey,
    pub api_version: ApiVersion,
    pub correlation_id: i32,
    pub client_id: String,
}

impl<W: Write> WriteType<W> for RequestHeader {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        i16::from(self.api_key).write(writer)?;
        self.api_version.0.write(writer)?;
        self.correlation_id.write(writer)?;
        self.client_id.write(writer)?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for RequestHeader {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            api_key: ApiKey::from(i16::read(reader)?),
            api_version: ApiVersion(i16::read(reader)?),
            correlation_id: i32::read(reader)?,
            client_id: String::read(reader)?,
        })
    }
}

/// The fixed portion of the [response envelope](crate::protocol::messages)
/// that precedes the response body: just the echoed correlation id.
#[derive(Debug, PartialEq, Eq)]
pub struct ResponseHeader {
    pub correlation_id: i32,
}

impl<W: Write> WriteType<W> for ResponseHeader {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.correlation_id.write(writer)
    }
}

impl<R: Read> ReadType<R> for ResponseHeader {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            correlation_id: i32::read(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_request_header_roundtrip() {
        let header = RequestHeader {
            api_key: ApiKey::Produce,
            api_version: ApiVersion(2),
            correlation_id: 7,
            client_id: "my-client".to_string(),
        };

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();

        let restored = RequestHeader::read(&mut Cursor::new(buf.as_slice())).unwrap();
        assert_eq!(restored, header);
    }

    #[test]
    fn test_response_header_roundtrip() {
        let header = ResponseHeader { correlation_id: 99 };

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();

        let restored = ResponseHeader::read(&mut Cursor::new(buf.as_slice())).unwrap();
        assert_eq!(restored, header);
    }

    proptest::proptest! {
        #[test]
        fn proptest_request_header_roundtrip(
            api_key_code: i16,
            api_version: ApiVersion,
            correlation_id: i32,
            client_id in "[a-zA-Z0-9._-]{0,32}",
        ) {
            let header = RequestHeader {
                api_key: ApiKey::from(api_key_code),
                api_version,
                correlation_id,
                client_id,
            };

            let mut buf = Vec::new();
            header.write(&mut buf).unwrap();

            let restored = RequestHeader::read(&mut Cursor::new(buf.as_slice())).unwrap();
            assert_eq!(restored, header);
        }
    }
}
