//! Marker traits that disambiguate same-length digests (txid vs. wtxid vs. sighash vs. block
//! hash) at the type level, so a caller cannot accidentally pass one where another is expected.

use std::io::Write;

/// A plain cryptographic digest type: fixed-length, comparable, displayable as hex.
pub trait Digest: Clone + PartialEq + Eq + AsRef<[u8]> {}

/// A newtype wrapping a raw `Digest` with a specific semantic meaning (e.g. "this 32 bytes is a
/// txid, not a wtxid"). Implementors are produced by the `mark_hash256!` macro.
pub trait MarkedDigest: Clone + PartialEq + Eq {
    /// The underlying unmarked digest type.
    type Digest: Digest;

    /// Wrap a raw digest, marking it with this type's meaning.
    fn new(digest: Self::Digest) -> Self;

    /// Return the wrapped digest in its natural (internal, non-reversed) byte order.
    fn internal(&self) -> Self::Digest;

    /// Copy the wrapped digest's bytes out as a `Vec<u8>`, natural order.
    fn bytes(&self) -> Vec<u8>;
}

/// A `std::io::Write` sink that accumulates bytes and produces a `MarkedDigest`-compatible
/// digest on `finish()`. Used so hashing can happen in a single streaming pass instead of
/// building an intermediate buffer (important for the BIP143 sighash, which hashes several
/// sub-regions without ever materializing the whole transaction).
pub trait MarkedDigestWriter<D>: Write + Default
where
    D: Digest,
{
    /// Consume the writer and produce the final digest.
    fn finish(self) -> D;
}
