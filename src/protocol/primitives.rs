//! Primitive wire types.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_types>

use std::io::{Read, Write};

use super::traits::{ReadError, ReadType, WriteError, WriteType};

macro_rules! impl_fixed_width_int {
    ($ty:ty, $size:expr) => {
        impl<R: Read> ReadType<R> for $ty {
            fn read(reader: &mut R) -> Result<Self, ReadError> {
                let mut buf = [0u8; $size];
                reader.read_exact(&mut buf)?;
                Ok(<$ty>::from_be_bytes(buf))
            }
        }

        impl<W: Write> WriteType<W> for $ty {
            fn write(&self, writer: &mut W) -> Result<(), WriteError> {
                writer.write_all(&self.to_be_bytes())?;
                Ok(())
            }
        }
    };
}

impl_fixed_width_int!(i8, 1);
impl_fixed_width_int!(i16, 2);
impl_fixed_width_int!(i32, 4);
impl_fixed_width_int!(i64, 8);

/// The `string` wire primitive: an `int16` length `N` followed by `N` bytes
/// of UTF-8, with length `-1` denoting null.
///
/// This is the generic, nullable form. Call sites that know the field is
/// never null (e.g. `clientId`, a topic name) read/write a plain
/// [`String`] below instead.
impl<R: Read> ReadType<R> for Option<String> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i16::read(reader)?;
        match len {
            l if l < -1 => Err(ReadError::MalformedInput(format!(
                "invalid negative length for nullable string: {l}"
            ))),
            -1 => Ok(None),
            l => {
                let len = usize::try_from(l)?;
                let mut buf = vec![0u8; len];
                reader.read_exact(&mut buf)?;
                let s = String::from_utf8(buf)
                    .map_err(|e| ReadError::MalformedInput(e.to_string()))?;
                Ok(Some(s))
            }
        }
    }
}

impl<W: Write> WriteType<W> for Option<String> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(s) => s.write(writer),
            None => (-1i16).write(writer),
        }
    }
}

/// Non-nullable `string`. Fails with `MalformedInput` if the wire value is
/// the null sentinel -- callers that need nullability use `Option<String>`.
impl<R: Read> ReadType<R> for String {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Option::<String>::read(reader)?
            .ok_or_else(|| ReadError::MalformedInput("unexpected null string".to_string()))
    }
}

impl<W: Write> WriteType<W> for String {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let len = i16::try_from(self.len()).map_err(WriteError::Overflow)?;
        len.write(writer)?;
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

/// The `bytes` wire primitive: an `int32` length `N` followed by `N` raw
/// bytes, with length `-1` denoting null.
impl<R: Read> ReadType<R> for Option<Vec<u8>> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i32::read(reader)?;
        match len {
            l if l < -1 => Err(ReadError::MalformedInput(format!(
                "invalid negative length for nullable bytes: {l}"
            ))),
            -1 => Ok(None),
            l => {
                let len = usize::try_from(l)?;
                let mut buf = vec![0u8; len];
                reader.read_exact(&mut buf)?;
                Ok(Some(buf))
            }
        }
    }
}

impl<W: Write> WriteType<W> for Option<Vec<u8>> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(buf) => {
                let len = i32::try_from(buf.len()).map_err(WriteError::Overflow)?;
                len.write(writer)?;
                writer.write_all(buf)?;
                Ok(())
            }
            None => (-1i32).write(writer),
        }
    }
}

/// Non-nullable `bytes`.
impl<R: Read> ReadType<R> for Vec<u8> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Option::<Vec<u8>>::read(reader)?
            .ok_or_else(|| ReadError::MalformedInput("unexpected null bytes".to_string()))
    }
}

impl<W: Write> WriteType<W> for Vec<u8> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        Some(self.clone()).write(writer)
    }
}

/// The `array<T>` wire primitive: an `int32` count `N` followed by `N`
/// encodings of `T`, with count `-1` denoting null.
///
/// Generic over `T` so one implementation covers every element type the
/// protocol needs (`int32`, `string`, nested structures, ...) instead of
/// the one-impl-per-element-type approach a non-generic codec would need.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Array<T>(pub Option<Vec<T>>);

impl<T> Array<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self(Some(items))
    }

    pub fn null() -> Self {
        Self(None)
    }

    pub fn into_vec(self) -> Vec<T> {
        self.0.unwrap_or_default()
    }
}

impl<R, T> ReadType<R> for Array<T>
where
    R: Read,
    T: ReadType<R>,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i32::read(reader)?;
        match len {
            l if l < -1 => Err(ReadError::MalformedInput(format!(
                "invalid negative length for array: {l}"
            ))),
            -1 => Ok(Self(None)),
            l => {
                let len = usize::try_from(l)?;
                let mut items = Vec::with_capacity(len.min(1 << 16));
                for _ in 0..len {
                    items.push(T::read(reader)?);
                }
                Ok(Self(Some(items)))
            }
        }
    }
}

impl<W, T> WriteType<W> for Array<T>
where
    W: Write,
    T: WriteType<W>,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match &self.0 {
            Some(items) => {
                let len = i32::try_from(items.len()).map_err(WriteError::Overflow)?;
                len.write(writer)?;
                for item in items {
                    item.write(writer)?;
                }
                Ok(())
            }
            None => (-1i32).write(writer),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    macro_rules! test_roundtrip {
        ($ty:ty, $test_name:ident, $value:expr) => {
            #[test]
            fn $test_name() {
                let value: $ty = $value;
                let mut buf = vec![];
                value.write(&mut buf).unwrap();

                let mut cursor = Cursor::new(buf);
                let restored = <$ty>::read(&mut cursor).unwrap();
                assert_eq!(value, restored);
            }
        };
    }

    test_roundtrip!(i8, test_i8_roundtrip, -53);
    test_roundtrip!(i16, test_i16_roundtrip, 3541);
    test_roundtrip!(i32, test_i32_roundtrip, 162534612);
    test_roundtrip!(i64, test_i64_roundtrip, -9_000_000_000_000);
    test_roundtrip!(String, test_string_roundtrip, "dart-kafka".to_string());
    test_roundtrip!(
        Option<String>,
        test_nullable_string_some_roundtrip,
        Some("hi".to_string())
    );
    test_roundtrip!(Option<String>, test_nullable_string_none_roundtrip, None);
    test_roundtrip!(Vec<u8>, test_bytes_roundtrip, vec![12, 43, 83]);
    test_roundtrip!(Array<i32>, test_array_roundtrip, Array::new(vec![1, 2, 3]));

    #[test]
    fn test_nullable_bytes_null_is_four_ff_bytes() {
        let mut buf = vec![];
        None::<Vec<u8>>.write(&mut buf).unwrap();
        assert_eq!(buf, vec![0xFF, 0xFF, 0xFF, 0xFF]);

        let restored = Option::<Vec<u8>>::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, None);
    }

    #[test]
    fn test_nullable_string_read_negative_length() {
        let mut buf = vec![];
        (-2i16).write(&mut buf).unwrap();

        let err = Option::<String>::read(&mut Cursor::new(buf)).unwrap_err();
        assert_matches!(err, ReadError::MalformedInput(_));
    }

    #[test]
    fn test_array_read_negative_length() {
        let mut buf = vec![];
        (-2i32).write(&mut buf).unwrap();

        let err = Array::<i32>::read(&mut Cursor::new(buf)).unwrap_err();
        assert_matches!(err, ReadError::MalformedInput(_));
    }

    #[test]
    fn test_truncated_read_is_truncated_input() {
        let buf = vec![0x00];
        let err = i32::read(&mut Cursor::new(buf)).unwrap_err();
        assert_matches!(err, ReadError::TruncatedInput(_));
    }

    proptest::proptest! {
        #[test]
        fn proptest_i32_roundtrip(value: i32) {
            let mut buf = vec![];
            value.write(&mut buf).unwrap();
            let restored = i32::read(&mut Cursor::new(buf)).unwrap();
            assert_eq!(value, restored);
        }

        #[test]
        fn proptest_i64_roundtrip(value: i64) {
            let mut buf = vec![];
            value.write(&mut buf).unwrap();
            let restored = i64::read(&mut Cursor::new(buf)).unwrap();
            assert_eq!(value, restored);
        }

        // Bounded so the encoded byte length never overflows the wire's
        // `int16` length prefix.
        #[test]
        fn proptest_string_roundtrip(value in "[a-zA-Z0-9 ]{0,64}") {
            let mut buf = vec![];
            value.write(&mut buf).unwrap();
            let restored = String::read(&mut Cursor::new(buf)).unwrap();
            assert_eq!(value, restored);
        }

        #[test]
        fn proptest_nullable_string_roundtrip(value in proptest::option::of("[a-zA-Z0-9 ]{0,64}")) {
            let mut buf = vec![];
            value.write(&mut buf).unwrap();
            let restored = Option::<String>::read(&mut Cursor::new(buf)).unwrap();
            assert_eq!(value, restored);
        }

        // Bounded so the encoded byte length never overflows the wire's
        // `int32` length prefix.
        #[test]
        fn proptest_bytes_roundtrip(value in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..128)) {
            let mut buf = vec![];
            value.write(&mut buf).unwrap();
            let restored = Vec::<u8>::read(&mut Cursor::new(buf)).unwrap();
            assert_eq!(value, restored);
        }

        #[test]
        fn proptest_array_i32_roundtrip(values in proptest::collection::vec(proptest::prelude::any::<i32>(), 0..32)) {
            let value = Array::new(values);
            let mut buf = vec![];
            value.write(&mut buf).unwrap();
            let restored = Array::<i32>::read(&mut Cursor::new(buf)).unwrap();
            assert_eq!(value, restored);
        }
    }
}
