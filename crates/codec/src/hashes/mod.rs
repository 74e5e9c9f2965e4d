//! Utilities for working with cryptographic digests, and disambiguating digests via marker
//! traits so that, e.g., a txid and a wtxid (both 32-byte `Hash256Digest`s) cannot be confused
//! at the type level.

/// Marker traits for digests and marked (semantically-tagged) digests.
pub mod marked;

/// Bitcoin-style double-SHA-256 digest and streaming writer.
pub mod hash256;

pub use hash256::*;
pub use marked::*;
