//! Per-API request/response schemas built atop [`crate::protocol::codec`]
//! and [`crate::protocol::primitives`].
//!
//! This client fixes exactly one wire version per API (`MetadataRequest`
//! v0 and `ProduceRequest` v2, per spec); [`RequestBody::API_VERSION`]
//! records which one so the Broker Connection can stamp it into the
//! request header without the caller having to know. Dispatch on decode is
//! by [`ApiKey`] match, not by a polymorphic body type -- see DESIGN.md for
//! why that's a deliberate departure from a dynamically-typed body.

use std::io::Cursor;

use super::api_key::ApiKey;
use super::api_version::ApiVersion;
use super::traits::{ReadError, ReadType, WriteError, WriteType};

pub mod header;
pub mod metadata;
pub mod produce;

pub use header::{RequestHeader, ResponseHeader};
pub use metadata::{MetadataRequest, MetadataResponse};
pub use produce::{ProduceRequest, ProduceResponse};

/// A request body tagged with the API it belongs to and its fixed wire
/// version.
pub trait RequestBody: WriteType<Vec<u8>> {
    type ResponseBody: ReadType<Cursor<Vec<u8>>>;

    const API_KEY: ApiKey;
    const API_VERSION: ApiVersion;
}

pub fn encode_body<T>(body: &T) -> Result<Vec<u8>, WriteError>
where
    T: WriteType<Vec<u8>>,
{
    let mut buf = Vec::new();
    body.write(&mut buf)?;
    Ok(buf)
}

pub fn decode_body<T>(buf: Vec<u8>) -> Result<T, ReadError>
where
    T: ReadType<Cursor<Vec<u8>>>,
{
    let mut cursor = Cursor::new(buf);
    T::read(&mut cursor)
}
