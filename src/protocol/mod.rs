//! The wire protocol: primitive types, the Bytes Codec built on them, and
//! the per-API request/response schemas.

pub mod api_key;
pub mod api_version;
pub mod codec;
pub mod error;
pub mod message;
pub mod messages;
pub mod primitives;
pub mod traits;
