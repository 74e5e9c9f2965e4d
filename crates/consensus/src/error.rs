//! Typed error taxonomy, layered so that a codec failure converts into a transaction failure
//! converts into a block-verification failure, without flattening everything into one kind list.

use std::io::Error as IOError;
use thiserror::Error;
use wire_codec::ser::SerError;

/// Errors raised while parsing, serializing, or computing a sighash for a single transaction.
#[derive(Debug, Error)]
pub enum TxError {
    /// Bubbled up from the underlying wire codec (short read, bad VarInt, bad hex, ...).
    #[error(transparent)]
    SerError(#[from] SerError),

    /// IOError bubbled up from a `Write`/`Read` passed to a `ByteFormat` implementation.
    #[error(transparent)]
    IOError(#[from] IOError),

    /// The witness marker/flag pair was present but the flag byte was not `0x01`.
    #[error("unsupported witness flag bytes: {0:?}")]
    BadMarker([u8; 2]),

    /// The witness marker/flag were present (claiming at least one witness) but every input's
    /// witness stack was empty.
    #[error("witness marker set but no input carries a non-empty witness")]
    SuperfluousWitness,

    /// A transaction declared zero inputs with no witness marker/flag following, which is
    /// ambiguous between "truly empty" and "malformed witness transaction". See
    /// `ParseOptions::allow_zero_input_legacy`.
    #[error("zero-input transaction with no witness flag; ambiguous, set allow_zero_input_legacy to accept")]
    AmbiguousZeroInputs,

    /// The declared input count exceeds the safety cap derived from the remaining buffer size.
    #[error("declared input count {0} is implausibly large")]
    OversizedInputCount(u64),

    /// The declared output count exceeds the safety cap derived from the remaining buffer size.
    #[error("declared output count {0} is implausibly large")]
    OversizedOutputCount(u64),

    /// An output's value was negative and not the `-1` SIGHASH_SINGLE sentinel.
    #[error("output value {0} is negative")]
    NegativeValue(i64),

    /// An output's value exceeded `MAX_MONEY`.
    #[error("output value {0} exceeds MAX_MONEY")]
    ValueOutOfRange(i64),

    /// The witness-sighash routine was asked to sign an input index out of range for the tx.
    #[error("input index {0} out of range for this transaction")]
    InputIndexOutOfRange(usize),
}

/// Errors raised while validating a stand-alone block against consensus rules.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Bubbled up from transaction parsing/serialization.
    #[error(transparent)]
    TxError(#[from] TxError),

    /// Bubbled up from the underlying wire codec.
    #[error(transparent)]
    SerError(#[from] SerError),

    /// IOError bubbled up from a `Write`/`Read` passed to a `ByteFormat` implementation.
    #[error(transparent)]
    IOError(#[from] IOError),

    /// A block claimed to carry transactions but the list was empty.
    #[error("block has no transactions")]
    EmptyTransactions,

    /// The declared transaction count exceeds the safety cap derived from `MAX_BLOCK_SIZE`.
    #[error("declared transaction count {0} is implausibly large")]
    OversizedTransactionCount(u64),

    /// A transaction had no inputs or no outputs.
    #[error("transaction has no inputs or no outputs")]
    EmptyInputsOrOutputs,

    /// Two inputs, in this transaction or across the block, referenced the same outpoint.
    #[error("duplicated outpoint")]
    DuplicatedOutPoint,

    /// The coinbase's `script_sig` was shorter than 2 or longer than 100 bytes.
    #[error("coinbase script_sig length {0} out of range [2, 100]")]
    CoinbaseScriptSizeOutOfRange(usize),

    /// BIP34 height-in-coinbase push did not match the supplied height.
    #[error("coinbase height push did not match expected height {0}")]
    CoinbaseHeightMismatch(i32),

    /// A non-coinbase transaction (index > 0) had an input with the coinbase sentinel outpoint.
    #[error("unexpected coinbase-sentinel input in a non-coinbase transaction")]
    UnexpectedCoinbaseInput,

    /// The transaction at index 0 was not a coinbase, or a later transaction was.
    #[error("transaction at index 0 is not a coinbase, or a later transaction is")]
    FirstTxNotCoinbase,

    /// The block's classic serialization exceeded `MAX_BLOCK_SIZE`.
    #[error("block size {0} exceeds MAX_BLOCK_SIZE")]
    LargerThanMaxBlockSize(usize),

    /// The computed txid Merkle root did not match the header's `merkle_root`.
    #[error("computed merkle root does not match header")]
    MerkleMismatch,

    /// The block's transaction list contained two consecutive transactions with equal txids
    /// (the CVE-2012-2459 duplicate-leaf malleability guard).
    #[error("two consecutive transactions share a txid (CVE-2012-2459)")]
    DuplicateTransaction,

    /// Summed sigops across all transactions exceeded `MAX_BLOCK_SIGOPS`.
    #[error("sigop count {0} exceeds MAX_BLOCK_SIGOPS")]
    TooManySigops(u32),

    /// `block_hash`, interpreted big-endian, exceeded the target decoded from `bits`.
    #[error("block hash does not satisfy the proof-of-work target")]
    ProofOfWorkInvalid,

    /// `bits` decoded to a target with the compact-float sign bit set.
    #[error("bits field decodes to a negative target")]
    NegativeTarget,

    /// `time` was further than `ALLOWED_TIME_DRIFT` seconds in the future.
    #[error("block timestamp {0} is too far in the future")]
    TimestampTooFarInFuture(u32),

    /// At least one transaction carried a witness but the coinbase had no witness-commitment
    /// output.
    #[error("a transaction carries a witness but the coinbase has no witness commitment")]
    WitnessWithoutCommitment,

    /// The coinbase had a witness-commitment output but the committed hash did not match
    /// `SHA256d(witness_merkle_root || witness_reserved_value)`.
    #[error("witness commitment hash mismatch")]
    WitnessCommitmentMismatch,

    /// The coinbase's witness-commitment output was present but the coinbase input's witness
    /// was not exactly one 32-byte push (the witness reserved value).
    #[error("witness reserved value is not a single 32-byte push")]
    WitnessInvalidNonceSize,
}

/// Errors raised while sizing, parsing, or evaluating a Bloom filter.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Bubbled up from the underlying wire codec.
    #[error(transparent)]
    SerError(#[from] SerError),

    /// IOError bubbled up from a `Write`/`Read` passed to a `ByteFormat` implementation.
    #[error(transparent)]
    IOError(#[from] IOError),

    /// The filter's data bitmap exceeded `MAX_BLOOM_FILTER_SIZE` bytes.
    #[error("bloom filter data length {0} exceeds MAX_BLOOM_FILTER_SIZE")]
    FilterTooLarge(usize),

    /// The filter requested more hash functions than `MAX_HASH_FUNCS`.
    #[error("bloom filter requested {0} hash functions, exceeding MAX_HASH_FUNCS")]
    TooManyHashFuncs(u32),

    /// A partial Merkle tree's flag bits and hash list were inconsistent with its own traversal
    /// (ran out of bits or hashes while walking it).
    #[error("malformed partial merkle tree")]
    MalformedPartialMerkleTree,

    /// A serialized filter's update-flag byte was not 0 (None), 1 (All), or 2 (P2PubkeyOnly).
    #[error("unrecognized bloom filter update flag byte: {0:#x}")]
    InvalidUpdateFlag(u8),
}
