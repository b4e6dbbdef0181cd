use std::io::{Read, Write};

use thiserror::Error;

/// Errors produced while decoding a response body.
///
/// `TruncatedInput` covers every case where the reader ran past the end of
/// the borrowed slice. `MalformedInput` covers structurally invalid bytes:
/// bad UTF-8, a length prefix that is negative but not the null sentinel,
/// a length prefix that overflows `usize`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReadError {
    #[error("truncated input: {0}")]
    TruncatedInput(#[from] std::io::Error),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("malformed input: {0}")]
    Overflow(#[from] std::num::TryFromIntError),
}

pub trait ReadType<R>: Sized
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError>;
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WriteError {
    #[error("cannot write data: {0}")]
    Io(#[from] std::io::Error),

    #[error("overflow converting integer: {0}")]
    Overflow(#[from] std::num::TryFromIntError),

    #[error("builder already consumed by take_bytes")]
    Consumed,
}

pub trait WriteType<W>: Sized
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError>;
}
