//! Bitcoin's double-SHA-256 ("Hash256") digest and the streaming writer that produces it.

use sha2::{Digest as Sha2Digest, Sha256};
use std::io::{Read, Result as IOResult, Write};

use crate::{
    hashes::marked::{Digest, MarkedDigestWriter},
    ser::{ByteFormat, SerError, SerResult},
};

/// A raw 32-byte double-SHA-256 digest, stored in natural (internal) byte order. Hex rendering
/// for display is the caller's responsibility via `reversed()` + `hex::encode`, since this type
/// carries no notion of which semantic digest (txid, wtxid, block hash, ...) it represents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256Digest([u8; 32]);

impl Hash256Digest {
    /// Wrap a raw 32-byte array.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return a copy of this digest with its bytes reversed (natural <-> display order).
    pub fn reversed(&self) -> Self {
        let mut buf = self.0;
        buf.reverse();
        Self(buf)
    }

    /// Render this digest as display-order (byte-reversed) hex, the form used in block
    /// explorers and RPC output.
    pub fn to_be_hex(&self) -> String {
        hex::encode(self.reversed().0)
    }

    /// Parse a display-order (byte-reversed) hex string into a natural-order digest.
    pub fn from_be_hex(s: &str) -> SerResult<Self> {
        let d = Self::deserialize_hex(s)?;
        Ok(d.reversed())
    }

    /// Compare two digests as big-endian unsigned 256-bit integers. Used by the proof-of-work
    /// check, which compares a block hash (natural order on the wire) against a target by
    /// treating both as big-endian numbers -- i.e. by comparing their *reversed* byte strings.
    pub fn le_bytes_as_be_uint(&self) -> [u8; 32] {
        self.reversed().0
    }
}

impl AsRef<[u8]> for Hash256Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8; 32]> for Hash256Digest {
    fn as_ref(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash256Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Digest for Hash256Digest {}

impl ByteFormat for Hash256Digest {
    type Error = SerError;

    fn serialized_length(&self) -> usize {
        32
    }

    fn read_from<R>(reader: &mut R, _limit: usize) -> SerResult<Self>
    where
        R: Read,
        Self: std::marker::Sized,
    {
        let mut buf = [0u8; 32];
        reader.read_exact(&mut buf).map_err(|_| SerError::ShortRead)?;
        Ok(Self(buf))
    }

    fn write_to<W>(&self, writer: &mut W) -> SerResult<usize>
    where
        W: Write,
    {
        Ok(writer.write(&self.0)?)
    }
}

/// A struct that exposes a Bitcoin-style Hash256 `Write` interface by wrapping an internal SHA2
/// instance. Writing incrementally and calling `finish()` is equivalent to, but avoids
/// allocating a buffer for, hashing the concatenation of everything written.
///
/// ```
/// use std::io::Write;
/// use wire_codec::hashes::{Hash256Writer, MarkedDigestWriter};
///
/// let mut w = Hash256Writer::default();
/// w.write_all(&[0u8; 32]).unwrap();
/// let _digest = w.finish();
/// ```
#[derive(Default)]
pub struct Hash256Writer {
    internal: Sha256,
}

impl Write for Hash256Writer {
    fn write(&mut self, buf: &[u8]) -> IOResult<usize> {
        Write::write(&mut self.internal, buf)
    }

    fn flush(&mut self) -> IOResult<()> {
        Ok(())
    }
}

impl MarkedDigestWriter<Hash256Digest> for Hash256Writer {
    fn finish(self) -> Hash256Digest {
        let first = self.internal.finalize();
        let second = Sha256::digest(first);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&second[..]);
        Hash256Digest(digest)
    }
}

/// Double-SHA-256 of `data`, in one call, for callers that already have the full buffer in hand
/// rather than streaming it (e.g. Merkle node hashing).
pub fn hash256(data: &[u8]) -> Hash256Digest {
    let mut w = Hash256Writer::default();
    w.write_all(data).expect("writing to a Vec-backed hasher cannot fail");
    w.finish()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn it_ignores_flush() {
        let mut w = Hash256Writer::default();
        w.write_all(&[0]).unwrap();
        w.flush().unwrap();
        assert_eq!(
            w.finish(),
            Hash256Digest::deserialize_hex(
                "1406e05881e299367766d313e26c05564ec91bf721d31726bd6e46e60689539a"
            )
            .unwrap()
        );
    }

    #[test]
    fn it_matches_the_one_shot_helper() {
        let mut w = Hash256Writer::default();
        w.write_all(&[0]).unwrap();
        assert_eq!(hash256(&[0]), w.finish());
    }
}
