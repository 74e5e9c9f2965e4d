//! The block header and block body: fixed 80-byte header fields, proof-of-work and timestamp
//! checks, and the `header + Option<transactions>` body that carries the header alongside the
//! transaction list a `block` P2P message delivers (a bare `headers` message is a different,
//! out-of-scope wire type -- see the module doc on [`Block`]).

use std::{
    cell::RefCell,
    io::{Read, Write},
};

use wire_codec::{hashes::MarkedDigest, ser::ByteFormat};

use crate::{
    consts::{ALLOWED_TIME_DRIFT, HEADER_SIZE, MAX_TX_COUNT},
    error::BlockError,
    hashes::{BlockHash, MerkleRoot},
    types::tx::Transaction,
};

/// Decode Bitcoin's compact ("bits") difficulty encoding into a 256-bit big-endian target.
///
/// `bits` packs a 1-byte exponent and 3-byte mantissa; bit 23 of the mantissa word is a sign flag
/// that, per consensus, must never be set for a legitimate target.
pub fn decode_compact_target(bits: u32) -> Result<[u8; 32], BlockError> {
    if bits & 0x0080_0000 != 0 {
        return Err(BlockError::NegativeTarget);
    }
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x007f_ffff;
    let mut target = [0u8; 32];
    if exponent == 0 || mantissa == 0 {
        return Ok(target);
    }
    if exponent <= 3 {
        let shift = 8 * (3 - exponent);
        let value = mantissa >> shift;
        target[31] = (value & 0xff) as u8;
        if exponent >= 2 {
            target[30] = ((value >> 8) & 0xff) as u8;
        }
        if exponent >= 3 {
            target[29] = ((value >> 16) & 0xff) as u8;
        }
    } else {
        let pos = 32usize.saturating_sub(exponent);
        if pos < 32 {
            target[pos] = ((mantissa >> 16) & 0xff) as u8;
        }
        if pos + 1 < 32 {
            target[pos + 1] = ((mantissa >> 8) & 0xff) as u8;
        }
        if pos + 2 < 32 {
            target[pos + 2] = (mantissa & 0xff) as u8;
        }
    }
    Ok(target)
}

/// An 80-byte Bitcoin block header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockHeader {
    /// Block version / feature-signaling bits.
    pub version: i32,
    /// The previous block's hash.
    pub prev_block: BlockHash,
    /// The root of this block's transaction Merkle tree.
    pub merkle_root: MerkleRoot,
    /// Seconds since the Unix epoch, as claimed by the miner.
    pub time: u32,
    /// Compact-encoded proof-of-work target.
    pub bits: u32,
    /// The value the miner varied to find a hash meeting the target.
    pub nonce: u32,
}

impl BlockHeader {
    /// Construct a new header.
    pub fn new(
        version: i32,
        prev_block: BlockHash,
        merkle_root: MerkleRoot,
        time: u32,
        bits: u32,
        nonce: u32,
    ) -> Self {
        Self {
            version,
            prev_block,
            merkle_root,
            time,
            bits,
            nonce,
        }
    }

    /// This header's identity hash: double-SHA-256 over its fixed 80-byte serialization.
    pub fn block_hash(&self) -> BlockHash {
        let mut buf = [0u8; HEADER_SIZE];
        let mut cursor = &mut buf[..];
        self.write_to(&mut cursor).expect("writing to a fixed buffer cannot fail");
        BlockHash::new(wire_codec::hashes::hash256(&buf))
    }

    /// Decode `bits` into a 256-bit big-endian target.
    pub fn target(&self) -> Result<[u8; 32], BlockError> {
        decode_compact_target(self.bits)
    }

    /// `true` iff `block_hash`, interpreted as a big-endian integer, is at or below the target
    /// decoded from `bits`.
    pub fn check_proof_of_work(&self) -> Result<(), BlockError> {
        let target = self.target()?;
        let hash = self.block_hash().0.le_bytes_as_be_uint();
        if hash > target {
            Err(BlockError::ProofOfWorkInvalid)
        } else {
            Ok(())
        }
    }

    /// `true` iff `time` is no more than [`ALLOWED_TIME_DRIFT`] seconds past `now`. The
    /// median-time-past lower bound is a block-chain-collaborator concern, not checked here.
    pub fn check_timestamp(&self, now: u32) -> Result<(), BlockError> {
        if self.time > now.saturating_add(ALLOWED_TIME_DRIFT) {
            Err(BlockError::TimestampTooFarInFuture(self.time))
        } else {
            Ok(())
        }
    }

    /// Test-only nonce grinder: increments `nonce` until `check_proof_of_work` passes. An
    /// uninterruptible CPU loop; production code paths never call this.
    pub fn solve(&mut self) {
        while self.check_proof_of_work().is_err() {
            self.nonce = self.nonce.wrapping_add(1);
        }
    }
}

impl ByteFormat for BlockHeader {
    type Error = BlockError;

    fn serialized_length(&self) -> usize {
        HEADER_SIZE
    }

    fn read_from<R>(reader: &mut R, _limit: usize) -> Result<Self, Self::Error>
    where
        R: Read,
    {
        let version = Self::read_i32_le(reader).map_err(BlockError::from)?;
        let prev_block = BlockHash::read_from(reader, 0).map_err(BlockError::from)?;
        let merkle_root = MerkleRoot::read_from(reader, 0).map_err(BlockError::from)?;
        let time = Self::read_u32_le(reader).map_err(BlockError::from)?;
        let bits = Self::read_u32_le(reader).map_err(BlockError::from)?;
        let nonce = Self::read_u32_le(reader).map_err(BlockError::from)?;
        Ok(Self {
            version,
            prev_block,
            merkle_root,
            time,
            bits,
            nonce,
        })
    }

    fn write_to<W>(&self, writer: &mut W) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        let mut written = Self::write_i32_le(writer, self.version).map_err(BlockError::from)?;
        written += self.prev_block.write_to(writer).map_err(BlockError::from)?;
        written += self.merkle_root.write_to(writer).map_err(BlockError::from)?;
        written += Self::write_u32_le(writer, self.time).map_err(BlockError::from)?;
        written += Self::write_u32_le(writer, self.bits).map_err(BlockError::from)?;
        written += Self::write_u32_le(writer, self.nonce).map_err(BlockError::from)?;
        Ok(written)
    }
}

/// A block: its header, plus (when carried) its transaction list. `None` represents an
/// in-memory, header-only value -- useful for constructing a headers chain without bodies; the
/// wire `block` message itself always carries a transaction list, so [`Block::read_from`] always
/// produces `Some`. Parsing a bare `headers` P2P message is a different, out-of-scope wire type;
/// use [`BlockHeader::read_from`] directly for that.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Block {
    header: BlockHeader,
    transactions: Option<Vec<Transaction>>,
    #[serde(skip)]
    merkle_cache: RefCell<Option<MerkleRoot>>,
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.transactions == other.transactions
    }
}
impl Eq for Block {}

impl Block {
    /// Construct a new block.
    pub fn new(header: BlockHeader, transactions: Option<Vec<Transaction>>) -> Self {
        Self {
            header,
            transactions,
            merkle_cache: RefCell::new(None),
        }
    }

    /// This block's header.
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// This block's transactions, if carried.
    pub fn transactions(&self) -> Option<&[Transaction]> {
        self.transactions.as_deref()
    }

    /// This block's identity hash (delegates to the header).
    pub fn block_hash(&self) -> BlockHash {
        self.header.block_hash()
    }

    /// The coinbase transaction, if this block carries transactions.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.as_ref().and_then(|txs| txs.first())
    }

    /// The computed txid Merkle root over this block's transactions, cached after first
    /// computation. `None` if this block carries no transaction list.
    pub fn computed_merkle_root(&self) -> Option<MerkleRoot> {
        let txs = self.transactions.as_ref()?;
        if let Some(root) = *self.merkle_cache.borrow() {
            return Some(root);
        }
        let root = MerkleRoot::new(crate::merkle::txid_merkle_root(txs));
        *self.merkle_cache.borrow_mut() = Some(root);
        Some(root)
    }

    /// Classic (no-witness) serialized size of the whole block, in bytes.
    pub fn classic_size(&self) -> usize {
        let mut size = HEADER_SIZE;
        if let Some(txs) = &self.transactions {
            size += wire_codec::ser::prefix_byte_len(txs.len() as u64) as usize;
            size += txs.iter().map(Transaction::classic_size).sum::<usize>();
        }
        size
    }
}

impl ByteFormat for Block {
    type Error = BlockError;

    fn serialized_length(&self) -> usize {
        let mut len = HEADER_SIZE;
        if let Some(txs) = &self.transactions {
            len += wire_codec::ser::prefix_byte_len(txs.len() as u64) as usize;
            len += txs.iter().map(Transaction::serialized_length).sum::<usize>();
        }
        len
    }

    fn read_from<R>(reader: &mut R, _limit: usize) -> Result<Self, Self::Error>
    where
        R: Read,
    {
        let header = BlockHeader::read_from(reader, 0)?;
        let n_tx = wire_codec::ser::read_compact_int(reader).map_err(BlockError::from)?;
        if n_tx > MAX_TX_COUNT {
            return Err(BlockError::OversizedTransactionCount(n_tx));
        }
        let mut transactions = Vec::with_capacity(n_tx as usize);
        for _ in 0..n_tx {
            transactions.push(Transaction::read_from(reader, 0)?);
        }
        Ok(Self::new(header, Some(transactions)))
    }

    fn write_to<W>(&self, writer: &mut W) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        let mut written = self.header.write_to(writer)?;
        if let Some(txs) = &self.transactions {
            written +=
                wire_codec::ser::write_compact_int(writer, txs.len() as u64).map_err(BlockError::from)?;
            for tx in txs {
                written += tx.write_to(writer)?;
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        consts::EASIEST_DIFFICULTY_TARGET,
        types::{
            script::ScriptSig,
            tx::coinbase_outpoint,
            txin::Input,
            txout::Output,
        },
    };

    fn sample_header() -> BlockHeader {
        BlockHeader::new(
            1,
            BlockHash::default(),
            MerkleRoot::default(),
            0,
            EASIEST_DIFFICULTY_TARGET,
            0,
        )
    }

    #[test]
    fn it_round_trips_a_header() {
        let header = sample_header();
        let hex = header.serialize_hex().unwrap();
        assert_eq!(hex.len(), HEADER_SIZE * 2);
        let parsed = BlockHeader::deserialize_hex(&hex).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn it_rejects_a_negative_target() {
        match decode_compact_target(0x0080_0000) {
            Err(BlockError::NegativeTarget) => {}
            other => panic!("expected NegativeTarget, got {:?}", other),
        }
    }

    #[test]
    fn it_decodes_the_genesis_bits() {
        let target = decode_compact_target(0x1d00_ffff).unwrap();
        let mut expected = [0u8; 32];
        expected[3] = 0x00;
        expected[4] = 0xff;
        expected[5] = 0xff;
        assert_eq!(target, expected);
    }

    #[test]
    fn it_solves_at_the_easiest_difficulty() {
        let mut header = sample_header();
        header.solve();
        assert!(header.check_proof_of_work().is_ok());
    }

    #[test]
    fn it_rejects_a_future_timestamp() {
        let mut header = sample_header();
        header.time = 10_000;
        match header.check_timestamp(0) {
            Err(BlockError::TimestampTooFarInFuture(_)) => {}
            other => panic!("expected TimestampTooFarInFuture, got {:?}", other),
        }
    }

    #[test]
    fn it_computes_a_single_coinbase_merkle_root() {
        let coinbase = Transaction::new(
            1,
            vec![Input::new(coinbase_outpoint(), ScriptSig::new(vec![0x01, 0x02]), 0xffff_ffff)],
            vec![Output::new(5_000_000_000i64, vec![])],
            0,
        );
        let txid = coinbase.txid();
        let block = Block::new(sample_header(), Some(vec![coinbase]));
        assert_eq!(block.computed_merkle_root().unwrap().0, txid.internal());
    }

    #[test]
    fn it_parses_the_mainnet_genesis_block_and_matches_the_known_hash() {
        // The literal mainnet genesis block, byte-for-byte. Its block hash, in display order, is
        // the canonical `000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f`.
        let hex = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c0101000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";
        let block = Block::deserialize_hex(hex).unwrap();
        assert_eq!(
            block.block_hash().to_be_hex(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
        let coinbase = block.coinbase().unwrap();
        assert_eq!(block.computed_merkle_root().unwrap().0, coinbase.txid().internal());
        assert_eq!(block.header().merkle_root.0, coinbase.txid().internal());
    }

    #[test]
    fn it_rejects_an_implausibly_large_declared_transaction_count() {
        let mut bytes = sample_header().serialize_hex().map(|h| hex::decode(h).unwrap()).unwrap();
        wire_codec::ser::write_compact_int(&mut bytes, MAX_TX_COUNT + 1).unwrap();
        let mut cursor = std::io::Cursor::new(bytes);
        match Block::read_from(&mut cursor, 0) {
            Err(BlockError::OversizedTransactionCount(n)) => assert_eq!(n, MAX_TX_COUNT + 1),
            other => panic!("expected OversizedTransactionCount, got {:?}", other),
        }
    }
}
