//! A simple trait for binary (de)serialization using std `Read` and `Write` traits, plus the
//! Bitcoin-style variable-length integer ("varint") free functions it builds on.

use hex::FromHexError;
use std::{
    fmt::Debug,
    io::{Cursor, Error as IOError, Read, Write},
};
use thiserror::Error;

/// Errors related to serialization of types.
#[derive(Debug, Error)]
pub enum SerError {
    /// VarInts must be minimal. A peer that sends a longer-than-necessary prefix is either
    /// buggy or attempting to exploit a parser that doesn't check this.
    #[error("attempted to deserialize a non-minimal VarInt")]
    NonMinimalVarInt,

    /// The reader ran out of bytes before a field was fully read.
    #[error("unexpected end of input while reading a field")]
    ShortRead,

    /// A declared element count would require reading more bytes than remain in a sane buffer.
    #[error("declared count {0} exceeds the safety cap for this field")]
    OversizedVarInt(u64),

    /// IOError bubbled up from a `Write`/`Read` passed to a `ByteFormat` implementation.
    #[error(transparent)]
    IOError(#[from] IOError),

    /// `deserialize_hex` encountered an error on its input.
    #[error(transparent)]
    FromHexError(#[from] FromHexError),

    /// An error raised by a component call during data structure (de)serialization.
    #[error("error in component (de)serialization: {0}")]
    ComponentError(String),

    /// Failed to pass a limit to an iterated deserializer that requires one.
    #[error("deserialization of this struct needs additional length information")]
    RequiresLimit,
}

/// Type alias for serialization errors.
pub type SerResult<T> = Result<T, SerError>;

/// Safety cap on a single length-prefixed byte blob, checked against the declared VarInt before
/// any allocation is attempted. A handful of attacker-controlled bytes can otherwise claim a
/// length up to `u64::MAX` and force a multi-gigabyte allocation before the read ever fails.
pub const MAX_PREFIXED_BYTES: u64 = 4 * 1024 * 1024;

/// Calculates the minimum prefix length for a VarInt encoding `number`.
pub fn prefix_byte_len(number: u64) -> u8 {
    match number {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Matches the length of the VarInt to the 1-byte flag that introduces it.
pub fn first_byte_from_len(number: u8) -> Option<u8> {
    match number {
        3 => Some(0xfd),
        5 => Some(0xfe),
        9 => Some(0xff),
        _ => None,
    }
}

/// Matches the VarInt prefix flag to the serialized length it introduces.
pub fn prefix_len_from_first_byte(number: u8) -> u8 {
    match number {
        0..=0xfc => 1,
        0xfd => 3,
        0xfe => 5,
        0xff => 9,
    }
}

/// Writes a Bitcoin-style VarInt.
pub fn write_compact_int<W>(writer: &mut W, number: u64) -> Result<usize, SerError>
where
    W: Write,
{
    let prefix_len = prefix_byte_len(number);
    let written: usize = match first_byte_from_len(prefix_len) {
        None => writer.write(&[number as u8])?,
        Some(prefix) => {
            let mut written = writer.write(&[prefix])?;
            let body = number.to_le_bytes();
            written += writer.write(&body[..prefix_len as usize - 1])?;
            written
        }
    };
    Ok(written)
}

/// Reads a Bitcoin-style VarInt, rejecting any non-canonical (non-minimal) encoding.
pub fn read_compact_int<R>(reader: &mut R) -> Result<u64, SerError>
where
    R: Read,
{
    let mut prefix = [0u8; 1];
    reader.read_exact(&mut prefix).map_err(|_| SerError::ShortRead)?;
    let prefix_len = prefix_len_from_first_byte(prefix[0]);

    let number = if prefix_len > 1 {
        let mut buf = [0u8; 8];
        reader
            .read_exact(&mut buf[..prefix_len as usize - 1])
            .map_err(|_| SerError::ShortRead)?;
        u64::from_le_bytes(buf)
    } else {
        prefix[0] as u64
    };

    let minimal_length = prefix_byte_len(number);
    if minimal_length < prefix_len {
        Err(SerError::NonMinimalVarInt)
    } else {
        Ok(number)
    }
}

/// A trait for deserializing from `std::io::Read` and serializing to `std::io::Write`, shared by
/// every wire-format type in this crate and its consumers. We provide blanket implementations
/// for `u8` and `Vec<T: ByteFormat>`.
pub trait ByteFormat {
    /// An associated error type. Consuming crates define their own so that, e.g., a transaction
    /// parse error can carry transaction-specific context while still converting from `SerError`.
    type Error: From<SerError> + From<IOError> + std::error::Error;

    /// Returns the byte-length of the serialized data structure.
    fn serialized_length(&self) -> usize;

    /// Reads a little-endian `u32`.
    fn read_u32_le<R>(reader: &mut R) -> Result<u32, Self::Error>
    where
        R: Read,
    {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).map_err(|_| SerError::ShortRead)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a little-endian `i32`.
    fn read_i32_le<R>(reader: &mut R) -> Result<i32, Self::Error>
    where
        R: Read,
    {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).map_err(|_| SerError::ShortRead)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Reads a little-endian `u64`.
    fn read_u64_le<R>(reader: &mut R) -> Result<u64, Self::Error>
    where
        R: Read,
    {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf).map_err(|_| SerError::ShortRead)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a little-endian `i64`.
    fn read_i64_le<R>(reader: &mut R) -> Result<i64, Self::Error>
    where
        R: Read,
    {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf).map_err(|_| SerError::ShortRead)?;
        Ok(i64::from_le_bytes(buf))
    }

    /// Reads a Bitcoin-style VarInt.
    fn read_compact_int<R>(reader: &mut R) -> Result<u64, Self::Error>
    where
        R: Read,
    {
        read_compact_int(reader).map_err(Into::into)
    }

    /// Reads a length-prefixed vector of `ByteFormat` items.
    fn read_prefix_vec<R, E, I>(reader: &mut R) -> Result<Vec<I>, Self::Error>
    where
        R: Read,
        E: Into<Self::Error> + From<SerError> + From<IOError> + std::error::Error,
        I: ByteFormat<Error = E>,
    {
        let items = Self::read_compact_int(reader)?;
        let mut ret = vec![];
        for _ in 0..items {
            ret.push(I::read_from(reader, 0).map_err(Into::into)?);
        }
        Ok(ret)
    }

    /// Reads a length-prefixed blob of raw bytes (`varint(len) || bytes[len]`).
    fn read_prefix_bytes<R>(reader: &mut R) -> Result<Vec<u8>, Self::Error>
    where
        R: Read,
    {
        let len = Self::read_compact_int(reader)?;
        if len > MAX_PREFIXED_BYTES {
            return Err(SerError::OversizedVarInt(len).into());
        }
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf).map_err(|_| SerError::ShortRead)?;
        Ok(buf)
    }

    /// Writes a little-endian `u32`.
    fn write_u32_le<W>(writer: &mut W, number: u32) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        Ok(writer.write(&number.to_le_bytes())?)
    }

    /// Writes a little-endian `i32`.
    fn write_i32_le<W>(writer: &mut W, number: i32) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        Ok(writer.write(&number.to_le_bytes())?)
    }

    /// Writes a little-endian `u64`.
    fn write_u64_le<W>(writer: &mut W, number: u64) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        Ok(writer.write(&number.to_le_bytes())?)
    }

    /// Writes a little-endian `i64`.
    fn write_i64_le<W>(writer: &mut W, number: i64) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        Ok(writer.write(&number.to_le_bytes())?)
    }

    /// Writes a Bitcoin-style VarInt.
    fn write_compact_int<W>(writer: &mut W, number: u64) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        write_compact_int(writer, number).map_err(Into::into)
    }

    /// Writes a length-prefixed vector of `ByteFormat` items.
    fn write_prefix_vec<W, E, I>(writer: &mut W, vector: &[I]) -> Result<usize, Self::Error>
    where
        W: Write,
        E: Into<Self::Error> + From<SerError> + From<IOError> + std::error::Error,
        I: ByteFormat<Error = E>,
    {
        let mut written = Self::write_compact_int(writer, vector.len() as u64)?;
        for i in vector.iter() {
            written += i.write_to(writer).map_err(Into::into)?;
        }
        Ok(written)
    }

    /// Writes a length-prefixed blob of raw bytes.
    fn write_prefix_bytes<W>(writer: &mut W, bytes: &[u8]) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        let mut written = Self::write_compact_int(writer, bytes.len() as u64)?;
        written += writer.write(bytes)?;
        Ok(written)
    }

    /// Deserializes an instance of `Self` from a `std::io::Read`. The `limit` argument is used
    /// only when deserializing collections that have no self-describing length prefix, and
    /// specifies a maximum number of instances of the underlying type to read.
    fn read_from<R>(reader: &mut R, limit: usize) -> Result<Self, Self::Error>
    where
        R: Read,
        Self: std::marker::Sized;

    /// Decodes a hex string to a `Vec<u8>`, deserializes an instance of `Self` from that vector.
    fn deserialize_hex(s: &str) -> Result<Self, Self::Error>
    where
        Self: std::marker::Sized,
    {
        let v: Vec<u8> = hex::decode(s).map_err(SerError::from)?;
        let mut cursor = Cursor::new(v);
        Self::read_from(&mut cursor, 0)
    }

    /// Serializes `Self` to a `std::io::Write`. Following `Write` trait conventions, its `Ok`
    /// type is a `usize` denoting the number of bytes written.
    fn write_to<W>(&self, writer: &mut W) -> Result<usize, Self::Error>
    where
        W: Write;

    /// Serializes `self` to a vector, returns the hex-encoded vector.
    fn serialize_hex(&self) -> Result<String, Self::Error> {
        let mut v: Vec<u8> = vec![];
        self.write_to(&mut v)?;
        Ok(hex::encode(v))
    }
}

impl<E, I> ByteFormat for Vec<I>
where
    E: From<SerError> + From<IOError> + std::error::Error,
    I: ByteFormat<Error = E>,
{
    type Error = E;

    fn serialized_length(&self) -> usize {
        self.iter().map(|v| v.serialized_length()).sum()
    }

    fn read_from<R>(reader: &mut R, limit: usize) -> Result<Self, Self::Error>
    where
        R: Read,
        Self: std::marker::Sized,
    {
        let mut v = vec![];
        for _ in 0..limit {
            v.push(I::read_from(reader, 0)?);
        }
        Ok(v)
    }

    fn write_to<W>(&self, writer: &mut W) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        let mut written = 0;
        for v in self.iter() {
            written += v.write_to(writer)?;
        }
        Ok(written)
    }
}

impl ByteFormat for u8 {
    type Error = SerError;

    fn serialized_length(&self) -> usize {
        1
    }

    fn read_from<R>(reader: &mut R, _limit: usize) -> SerResult<Self>
    where
        R: Read,
        Self: std::marker::Sized,
    {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf).map_err(|_| SerError::ShortRead)?;
        Ok(buf[0])
    }

    fn write_to<W>(&self, writer: &mut W) -> SerResult<usize>
    where
        W: Write,
    {
        Ok(writer.write(&[*self])?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn it_matches_byte_len_and_prefix() {
        let cases = [
            (1, 1, None),
            (0xff, 3, Some(0xfd)),
            (0xffff_ffff, 5, Some(0xfe)),
            (0xffff_ffff_ffff_ffff, 9, Some(0xff)),
        ];
        for case in cases.iter() {
            assert_eq!(prefix_byte_len(case.0), case.1);
            assert_eq!(first_byte_from_len(case.1), case.2);
        }
    }

    #[test]
    fn it_round_trips_varints_at_boundaries() {
        let cases = [0u64, 0xfc, 0xfd, 0xffff, 0x1_0000, 0xffff_ffff, 0x1_0000_0000];
        for case in cases.iter() {
            let mut buf = vec![];
            write_compact_int(&mut buf, *case).unwrap();
            let mut cursor = Cursor::new(buf);
            assert_eq!(read_compact_int(&mut cursor).unwrap(), *case);
        }
    }

    #[test]
    fn it_rejects_non_minimal_varints() {
        // 0xfd prefix followed by a value that fits in one byte.
        let buf = vec![0xfd, 0x01, 0x00];
        let mut cursor = Cursor::new(buf);
        match read_compact_int(&mut cursor) {
            Err(SerError::NonMinimalVarInt) => {}
            other => panic!("expected NonMinimalVarInt, got {:?}", other),
        }
    }

    #[test]
    fn it_rejects_an_oversized_prefixed_byte_blob_before_allocating() {
        // A VarInt claiming a length far past MAX_PREFIXED_BYTES, with no actual data behind it.
        let mut buf = vec![];
        write_compact_int(&mut buf, MAX_PREFIXED_BYTES + 1).unwrap();
        let mut cursor = Cursor::new(buf);
        match <u8 as ByteFormat>::read_prefix_bytes(&mut cursor) {
            Err(SerError::OversizedVarInt(n)) => assert_eq!(n, MAX_PREFIXED_BYTES + 1),
            other => panic!("expected OversizedVarInt, got {:?}", other),
        }
    }
}
