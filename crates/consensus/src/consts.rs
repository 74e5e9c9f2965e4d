//! Consensus-critical constants. Listed here verbatim, as named constants rather than scattered
//! literals, because consumers test against exact values.

/// Maximum serialized (classic, no-witness) size of a block, in bytes.
pub const MAX_BLOCK_SIZE: usize = 1_000_000;

/// Maximum total sigop count across all transactions in a block.
pub const MAX_BLOCK_SIGOPS: u32 = (MAX_BLOCK_SIZE / 50) as u32;

/// Maximum value of a single output, and the maximum possible total money supply, in satoshis.
pub const MAX_MONEY: i64 = 2_100_000_000_000_000;

/// Number of confirmations before a coinbase output may be spent. A block-chain collaborator
/// concern; not enforced by this crate's stand-alone verifier.
pub const COINBASE_MATURITY: u32 = 100;

/// Values below this are interpreted as a block height; values at or above it are interpreted
/// as a Unix timestamp, when deciding how a transaction's `lock_time` constrains it.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Fixed serialized size of a block header.
pub const HEADER_SIZE: usize = 80;

/// Maximum allowed clock skew, in seconds, for a block's timestamp to be in the future.
pub const ALLOWED_TIME_DRIFT: u32 = 7200;

/// The six-byte prefix (`OP_RETURN push(0x24) 0xaa21a9ed`) that identifies a witness-commitment
/// output in the coinbase transaction, per BIP141.
pub const WITNESS_COMMITMENT_PREFIX: [u8; 6] = [0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];

/// The `bits` value of the easiest possible proof-of-work target, used by test fixtures and the
/// test-only nonce grinder.
pub const EASIEST_DIFFICULTY_TARGET: u32 = 0x207f_ffff;

/// Maximum size, in bytes, of a Bloom filter's data bitmap (BIP37).
pub const MAX_BLOOM_FILTER_SIZE: usize = 36_000;

/// Maximum number of hash functions a Bloom filter may specify (BIP37).
pub const MAX_HASH_FUNCS: u32 = 50;

/// Multiplicative constant BIP37 mixes into each hash function's seed.
pub const BLOOM_SEED_MULTIPLIER: u32 = 0xFBA4_C795;

/// Minimum and maximum valid length, in bytes, of a coinbase input's `script_sig`.
pub const COINBASE_SCRIPT_SIG_MIN: usize = 2;
/// See [`COINBASE_SCRIPT_SIG_MIN`].
pub const COINBASE_SCRIPT_SIG_MAX: usize = 100;

/// The `sequence` value that disables this input's relative lock-time.
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// The `index` half of the sentinel outpoint that marks a coinbase input.
pub const COINBASE_OUTPOINT_INDEX: u32 = 0xFFFF_FFFF;

/// Marker byte introducing a BIP144 (segwit) transaction serialization.
pub const WITNESS_MARKER: u8 = 0x00;
/// Flag byte following [`WITNESS_MARKER`]; only `0x01` is recognized.
pub const WITNESS_FLAG: u8 = 0x01;

/// Smallest possible classic-serialized size of a single input (36-byte outpoint, 1-byte
/// empty `script_sig` length, 4-byte sequence).
pub const MIN_INPUT_SIZE: usize = 41;
/// Smallest possible serialized size of a single output (8-byte value, 1-byte empty
/// `script_pubkey` length).
pub const MIN_OUTPUT_SIZE: usize = 9;

/// No valid transaction inside a `MAX_BLOCK_SIZE`-bounded block can declare more inputs than
/// this; used to reject an implausible VarInt count before attempting to allocate for it.
pub const MAX_INPUT_COUNT: u64 = (MAX_BLOCK_SIZE / MIN_INPUT_SIZE) as u64;
/// See [`MAX_INPUT_COUNT`], for outputs.
pub const MAX_OUTPUT_COUNT: u64 = (MAX_BLOCK_SIZE / MIN_OUTPUT_SIZE) as u64;

/// Smallest possible classic-serialized size of a transaction: 4-byte version, one 1-input,
/// 1-output VarInt pair at their own minimums, 4-byte lock_time.
pub const MIN_TX_SIZE: usize = 4 + 1 + MIN_INPUT_SIZE + 1 + MIN_OUTPUT_SIZE + 4;

/// No valid block bounded by `MAX_BLOCK_SIZE` can declare more transactions than this.
pub const MAX_TX_COUNT: u64 = (MAX_BLOCK_SIZE / MIN_TX_SIZE) as u64;
