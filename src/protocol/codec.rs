//! The Bytes Codec: a growable, append-only [`Builder`] and a positional,
//! non-destructive [`Reader`], dual to each other over the primitive wire
//! types in [`super::primitives`].
//!
//! Every higher-level request/response schema in [`super::messages`] is
//! expressed as a sequence of these primitive operations, so correctness of
//! the whole client rests on these two types round-tripping exactly.

use std::io::Cursor;

use super::primitives::Array;
use super::traits::{ReadError, ReadType, WriteError, WriteType};

/// Append-only byte buffer builder.
///
/// Each `add_*` method appends one primitive wire value and returns `&mut
/// Self` so calls can be chained. After [`Builder::take_bytes`] the builder
/// is consumed; further appends fail with [`WriteError::Consumed`].
#[derive(Debug, Default)]
pub struct Builder {
    buf: Vec<u8>,
    consumed: bool,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_consumed(&self) -> Result<(), WriteError> {
        if self.consumed {
            Err(WriteError::Consumed)
        } else {
            Ok(())
        }
    }

    pub fn add_int8(&mut self, v: i8) -> Result<&mut Self, WriteError> {
        self.check_consumed()?;
        v.write(&mut self.buf)?;
        Ok(self)
    }

    pub fn add_int16(&mut self, v: i16) -> Result<&mut Self, WriteError> {
        self.check_consumed()?;
        v.write(&mut self.buf)?;
        Ok(self)
    }

    pub fn add_int32(&mut self, v: i32) -> Result<&mut Self, WriteError> {
        self.check_consumed()?;
        v.write(&mut self.buf)?;
        Ok(self)
    }

    pub fn add_int64(&mut self, v: i64) -> Result<&mut Self, WriteError> {
        self.check_consumed()?;
        v.write(&mut self.buf)?;
        Ok(self)
    }

    pub fn add_string(&mut self, v: Option<&str>) -> Result<&mut Self, WriteError> {
        self.check_consumed()?;
        v.map(str::to_owned).write(&mut self.buf)?;
        Ok(self)
    }

    pub fn add_bytes(&mut self, v: Option<&[u8]>) -> Result<&mut Self, WriteError> {
        self.check_consumed()?;
        v.map(<[u8]>::to_vec).write(&mut self.buf)?;
        Ok(self)
    }

    /// Appends an `array<T>`. `items = None` encodes the null array.
    pub fn add_array<T>(&mut self, items: Option<Vec<T>>) -> Result<&mut Self, WriteError>
    where
        T: WriteType<Vec<u8>>,
    {
        self.check_consumed()?;
        Array(items).write(&mut self.buf)?;
        Ok(self)
    }

    /// Marks the builder consumed and returns the accumulated bytes. Any
    /// further `add_*` call on this builder fails with
    /// [`WriteError::Consumed`].
    pub fn take_bytes(&mut self) -> Vec<u8> {
        self.consumed = true;
        std::mem::take(&mut self.buf)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Positional, non-destructive reader over a borrowed byte slice.
///
/// Reads never allocate beyond the bytes actually consumed (the `bytes`
/// primitive is copied into an owned `Vec<u8>` only because callers need an
/// owned value past the lifetime of the read; no extra copies beyond that
/// are made).
#[derive(Debug)]
pub struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(buf),
        }
    }

    pub fn length(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn eof(&self) -> bool {
        self.position() as usize >= self.length()
    }

    pub fn read_int8(&mut self) -> Result<i8, ReadError> {
        i8::read(&mut self.cursor)
    }

    pub fn read_int16(&mut self) -> Result<i16, ReadError> {
        i16::read(&mut self.cursor)
    }

    pub fn read_int32(&mut self) -> Result<i32, ReadError> {
        i32::read(&mut self.cursor)
    }

    pub fn read_int64(&mut self) -> Result<i64, ReadError> {
        i64::read(&mut self.cursor)
    }

    pub fn read_string(&mut self) -> Result<Option<String>, ReadError> {
        Option::<String>::read(&mut self.cursor)
    }

    pub fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, ReadError> {
        Option::<Vec<u8>>::read(&mut self.cursor)
    }

    pub fn read_array<T>(&mut self) -> Result<Option<Vec<T>>, ReadError>
    where
        T: ReadType<Cursor<&'a [u8]>>,
    {
        Ok(Array::<T>::read(&mut self.cursor)?.0)
    }
}
