//! Wire-format primitives shared by every Bitcoin consensus type: little-endian integer and
//! VarInt I/O, length-prefixed byte blobs, and marked double-SHA-256 digests that keep txids,
//! wtxids, and block hashes from being confused with one another at the type level.
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod macros;

pub mod hashes;
pub mod ser;

pub use hashes::*;
pub use ser::*;
