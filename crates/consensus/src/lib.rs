//! Bit-exact Bitcoin block and transaction data model: wire-format parse/serialize, txid/wtxid,
//! Merkle trees, legacy and BIP143 signature-hash pre-images, stand-alone block verification, and
//! the BIP37 Bloom filter transaction scanner. Script *execution*, key primitives, chain storage,
//! and p2p messaging are out of scope and consumed as external collaborators (see each module's
//! doc comment for the boundary).
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod bloom;
pub mod consts;
pub mod error;
pub mod hashes;
pub mod merkle;
pub mod sighash;
pub mod types;
pub mod verify;

pub use error::{BlockError, FilterError, TxError};
