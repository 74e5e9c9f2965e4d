//! BIP37 Bloom filters and the transaction scanner built on them: a lightweight client loads a
//! probabilistic filter into a full node, which tests every transaction in a block against it and
//! replies with a [`FilteredBlock`] carrying only the matches plus a [`crate::merkle::PartialMerkleTree`]
//! proving their inclusion. What remains external is the `filterload`/`filteradd`/`filterclear` P2P
//! message plumbing that carries a [`BloomFilter`] over the wire -- the filter, its match
//! predicate, and the scan itself are implemented here.

use std::io::{Read, Write};

use log::debug;
use wire_codec::{hashes::MarkedDigest, ser::ByteFormat};

use crate::{
    consts::{BLOOM_SEED_MULTIPLIER, MAX_BLOOM_FILTER_SIZE, MAX_HASH_FUNCS},
    error::FilterError,
    merkle::PartialMerkleTree,
    types::{
        block::{Block, BlockHeader},
        script::{BitcoinScript, ScriptType},
        tx::Transaction,
    },
};

const LN2: f64 = std::f64::consts::LN_2;

/// How a matched output's outpoint should be folded back into the filter, per BIP37. A lightweight
/// client uses this to keep tracking a chain of spends without re-announcing its whole watch-list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BloomUpdateFlag {
    /// Never insert a matched output's outpoint into the filter.
    None,
    /// Always insert a matched output's outpoint into the filter.
    All,
    /// Insert a matched output's outpoint only when the output's script classifies as a bare
    /// public key or witness-pubkey-hash form (i.e. a shape the spending input cannot be matched
    /// on by script content alone).
    P2PubkeyOnly,
}

impl BloomUpdateFlag {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::None),
            1 => Some(Self::All),
            2 => Some(Self::P2PubkeyOnly),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::All => 1,
            Self::P2PubkeyOnly => 2,
        }
    }
}

/// MurmurHash3 (x86_32 variant), as BIP37 specifies for Bloom filter hashing. Not a
/// cryptographic hash; used purely for its speed and distribution.
fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h1 = seed;
    let chunks = data.chunks_exact(4);
    let tail = chunks.remainder();

    for chunk in chunks {
        let mut k1 = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let mut k1: u32 = 0;
    for (i, byte) in tail.iter().enumerate().rev() {
        k1 ^= (*byte as u32) << (8 * i);
    }
    if !tail.is_empty() {
        k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85eb_ca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2_ae35);
    h1 ^= h1 >> 16;
    h1
}

/// A BIP37 Bloom filter: a fixed-size bit array, tested and updated through `n_hash_funcs`
/// independent `MurmurHash3` draws salted by `tweak`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BloomFilter {
    data: Vec<u8>,
    n_hash_funcs: u32,
    tweak: u32,
    flags: BloomUpdateFlag,
}

impl BloomFilter {
    /// Construct a filter directly from its wire parameters.
    pub fn new(
        data: Vec<u8>,
        n_hash_funcs: u32,
        tweak: u32,
        flags: BloomUpdateFlag,
    ) -> Result<Self, FilterError> {
        if data.len() > MAX_BLOOM_FILTER_SIZE {
            return Err(FilterError::FilterTooLarge(data.len()));
        }
        if n_hash_funcs > MAX_HASH_FUNCS {
            return Err(FilterError::TooManyHashFuncs(n_hash_funcs));
        }
        Ok(Self {
            data,
            n_hash_funcs,
            tweak,
            flags,
        })
    }

    /// Size a new, empty filter for `n_elements` expected insertions at a target
    /// `false_positive_rate`, per the standard BIP37 sizing formula, clamping the bitmap and hash
    /// function count to the protocol maxima.
    pub fn with_false_positive_rate(
        n_elements: usize,
        false_positive_rate: f64,
        tweak: u32,
        flags: BloomUpdateFlag,
    ) -> Self {
        let n = (n_elements.max(1)) as f64;
        let size_bits = (-1.0 / (LN2 * LN2) * n * false_positive_rate.ln())
            .min((MAX_BLOOM_FILTER_SIZE * 8) as f64);
        let size_bytes = ((size_bits / 8.0).ceil() as usize).clamp(1, MAX_BLOOM_FILTER_SIZE);
        let n_hash_funcs = (((size_bytes * 8) as f64 / n) * LN2) as u32;
        let n_hash_funcs = n_hash_funcs.clamp(1, MAX_HASH_FUNCS);
        Self {
            data: vec![0u8; size_bytes],
            n_hash_funcs,
            tweak,
            flags,
        }
    }

    /// This filter's `update_flag`.
    pub fn flags(&self) -> BloomUpdateFlag {
        self.flags
    }

    fn bit_index(&self, hash_func_index: u32, data: &[u8]) -> u32 {
        let seed = hash_func_index
            .wrapping_mul(BLOOM_SEED_MULTIPLIER)
            .wrapping_add(self.tweak);
        murmur3_32(data, seed) % (self.data.len() as u32 * 8)
    }

    /// Insert `data` into the filter, setting one bit per hash function.
    pub fn insert(&mut self, data: &[u8]) {
        if self.data.is_empty() {
            return;
        }
        for i in 0..self.n_hash_funcs {
            let index = self.bit_index(i, data);
            self.data[(index >> 3) as usize] |= 1 << (7 & index);
        }
    }

    /// `true` iff every bit `data` would set is already set -- i.e. `data` may have been
    /// inserted (false positives are possible by design; false negatives are not).
    pub fn contains(&self, data: &[u8]) -> bool {
        if self.data.is_empty() {
            return false;
        }
        (0..self.n_hash_funcs).all(|i| {
            let index = self.bit_index(i, data);
            self.data[(index >> 3) as usize] & (1 << (7 & index)) != 0
        })
    }
}

impl ByteFormat for BloomFilter {
    type Error = FilterError;

    fn serialized_length(&self) -> usize {
        wire_codec::ser::prefix_byte_len(self.data.len() as u64) as usize + self.data.len() + 9
    }

    fn read_from<R>(reader: &mut R, _limit: usize) -> Result<Self, Self::Error>
    where
        R: Read,
    {
        let data = Self::read_prefix_bytes(reader)?;
        let n_hash_funcs = Self::read_u32_le(reader)?;
        let tweak = Self::read_u32_le(reader)?;
        let mut flag_byte = [0u8; 1];
        reader
            .read_exact(&mut flag_byte)
            .map_err(|_| wire_codec::ser::SerError::ShortRead)?;
        let flags = BloomUpdateFlag::from_byte(flag_byte[0])
            .ok_or(FilterError::InvalidUpdateFlag(flag_byte[0]))?;
        Self::new(data, n_hash_funcs, tweak, flags)
    }

    fn write_to<W>(&self, writer: &mut W) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        let mut written = Self::write_prefix_bytes(writer, &self.data)?;
        written += Self::write_u32_le(writer, self.n_hash_funcs)?;
        written += Self::write_u32_le(writer, self.tweak)?;
        written += writer.write(&[self.flags.to_byte()])?;
        Ok(written)
    }
}

/// A block filtered against a [`BloomFilter`]: the original header, a compact proof
/// ([`PartialMerkleTree`]) that the matched transactions belong under its Merkle root, and the
/// matched transactions themselves in block order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilteredBlock {
    /// The scanned block's header, unchanged.
    pub header: BlockHeader,
    /// Proof that `matched_tx`'s txids belong under `header.merkle_root`.
    pub partial_merkle_tree: PartialMerkleTree,
    /// The transactions that matched the filter, in their original block order.
    pub matched_tx: Vec<Transaction>,
}

fn output_matches(tx: &Transaction, filter: &BloomFilter) -> Vec<bool> {
    tx.outputs()
        .iter()
        .map(|output| {
            output
                .script_pubkey
                .iter_pushes()
                .iter()
                .any(|push| filter.contains(push))
        })
        .collect()
}

fn input_matches(tx: &Transaction, filter: &BloomFilter) -> bool {
    tx.inputs().iter().any(|input| {
        let mut outpoint_bytes = Vec::with_capacity(36);
        input
            .outpoint
            .write_to(&mut outpoint_bytes)
            .expect("writing to a Vec cannot fail");
        if filter.contains(&outpoint_bytes) {
            return true;
        }
        input
            .script_sig
            .iter_pushes()
            .iter()
            .any(|push| filter.contains(push))
    })
}

/// `true` iff a matched output's script shape is one BIP37 considers worth tracking by outpoint
/// under [`BloomUpdateFlag::P2PubkeyOnly`] -- a bare public key or a witness-pubkey-hash, neither
/// of which a spending input's `script_sig`/witness can otherwise be matched on by content.
fn is_pubkey_like(script_type: &ScriptType) -> bool {
    matches!(script_type, ScriptType::P2PK | ScriptType::P2WPKH)
}

/// Scan `block`'s transactions against `filter`, matching on txid, output script pushes, input
/// outpoints, and input `script_sig` pushes, mutating `filter` to insert matched outpoints
/// according to its `update_flag`. Returns the header, matched transactions, and a partial Merkle
/// tree proving their inclusion under the block's Merkle root.
pub fn scan_block(block: &Block, filter: &mut BloomFilter) -> Option<FilteredBlock> {
    let transactions = block.transactions()?;
    let txids: Vec<_> = transactions.iter().map(|tx| tx.txid().internal()).collect();

    let mut matches = Vec::with_capacity(transactions.len());
    for (tx, txid) in transactions.iter().zip(txids.iter()) {
        let mut matched = filter.contains(txid.as_ref());

        let out_hits = output_matches(tx, filter);
        if out_hits.iter().any(|hit| *hit) {
            matched = true;
        }
        for (index, hit) in out_hits.iter().enumerate() {
            if !*hit {
                continue;
            }
            let insert = match filter.flags() {
                BloomUpdateFlag::None => false,
                BloomUpdateFlag::All => true,
                BloomUpdateFlag::P2PubkeyOnly => {
                    is_pubkey_like(&tx.outputs()[index].standard_type())
                }
            };
            if insert {
                let mut outpoint_bytes = Vec::with_capacity(36);
                crate::types::txin::Outpoint::new(tx.txid(), index as u32)
                    .write_to(&mut outpoint_bytes)
                    .expect("writing to a Vec cannot fail");
                filter.insert(&outpoint_bytes);
            }
        }

        if input_matches(tx, filter) {
            matched = true;
        }

        if matched {
            debug!(target: "bloom", "transaction {} matched filter", txid.to_be_hex());
        }
        matches.push(matched);
    }

    let partial_merkle_tree =
        PartialMerkleTree::build(transactions.len() as u32, &txids, &matches);
    let matched_tx = transactions
        .iter()
        .zip(matches.iter())
        .filter_map(|(tx, hit)| hit.then(|| tx.clone()))
        .collect();

    Some(FilteredBlock {
        header: *block.header(),
        partial_merkle_tree,
        matched_tx,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{
        script::ScriptSig,
        tx::coinbase_outpoint,
        txin::{Input, Outpoint},
        txout::Output,
    };
    #[test]
    fn it_matches_a_known_fp_rate_vector() {
        // A filter sized for 3 elements at a 1% false-positive rate, then loaded with exactly
        // those 3 elements, must report them all present -- Bloom filters never false-negative.
        let mut filter =
            BloomFilter::with_false_positive_rate(3, 0.01, 0, BloomUpdateFlag::All);
        let elements: [&[u8]; 3] = [
            &hex::decode("755db28227a6e673d79a1f88f271a3c388aaadba").unwrap(),
            &hex::decode("08e5238ed70e3b402ce8a2b3aab62c698d6fe881").unwrap(),
            &hex::decode("aceb11c31423daeea4e1c8d877a0c7ae2acfab0a").unwrap(),
        ];
        for e in elements.iter() {
            filter.insert(e);
        }
        for e in elements.iter() {
            assert!(filter.contains(e));
        }
        assert!(!filter.contains(b"nonexistent input"));
    }

    #[test]
    fn it_rejects_an_oversized_filter() {
        match BloomFilter::new(vec![0u8; MAX_BLOOM_FILTER_SIZE + 1], 5, 0, BloomUpdateFlag::None) {
            Err(FilterError::FilterTooLarge(_)) => {}
            other => panic!("expected FilterTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn it_rejects_too_many_hash_funcs() {
        match BloomFilter::new(vec![0u8; 8], MAX_HASH_FUNCS + 1, 0, BloomUpdateFlag::None) {
            Err(FilterError::TooManyHashFuncs(_)) => {}
            other => panic!("expected TooManyHashFuncs, got {:?}", other),
        }
    }

    #[test]
    fn it_round_trips_through_serialization() {
        let filter = BloomFilter::with_false_positive_rate(10, 0.001, 5, BloomUpdateFlag::All);
        let hex = filter.serialize_hex().unwrap();
        let parsed = BloomFilter::deserialize_hex(&hex).unwrap();
        assert_eq!(parsed, filter);
    }

    fn coinbase_tx() -> Transaction {
        Transaction::new(
            1,
            vec![Input::new(coinbase_outpoint(), ScriptSig::new(vec![0x01, 0x02]), 0xffff_ffff)],
            vec![Output::new(5_000_000_000i64, vec![])],
            0,
        )
    }

    #[test]
    fn it_matches_a_transaction_by_txid_and_builds_a_partial_tree() {
        let coinbase = coinbase_tx();
        let spender = Transaction::new(
            1,
            vec![Input::new(Outpoint::new(coinbase.txid(), 0), ScriptSig::new(vec![]), 0)],
            vec![Output::new(1, vec![0x51])],
            0,
        );
        let txs = vec![coinbase, spender.clone()];
        let root = crate::merkle::txid_merkle_root(&txs);
        let header = BlockHeader::new(
            1,
            Default::default(),
            crate::hashes::MerkleRoot::new(root),
            0,
            crate::consts::EASIEST_DIFFICULTY_TARGET,
            0,
        );
        let block = Block::new(header, Some(txs));

        let mut filter =
            BloomFilter::with_false_positive_rate(1, 0.01, 0, BloomUpdateFlag::None);
        filter.insert(spender.txid().as_ref());

        let filtered = scan_block(&block, &mut filter).unwrap();
        assert_eq!(filtered.matched_tx.len(), 1);
        assert_eq!(filtered.matched_tx[0].txid(), spender.txid());
        let (root_check, matched_positions) = filtered.partial_merkle_tree.extract_root().unwrap();
        assert_eq!(root_check, root);
        assert_eq!(matched_positions, vec![1]);
    }

    #[test]
    fn it_inserts_matched_outpoints_under_update_all() {
        let coinbase = coinbase_tx();
        let mut filter = BloomFilter::with_false_positive_rate(1, 0.01, 0, BloomUpdateFlag::All);
        // Matching the coinbase output's empty script_pubkey is degenerate; instead match by
        // inserting a push from the non-coinbase spender's script_sig and confirm its spent
        // outpoint gets folded back in as a side effect of the output-push match on a prior tx.
        let mut witness_out = Output::new(1, vec![0x51, 0x02, 0xaa, 0xbb]);
        witness_out.script_pubkey = crate::types::script::ScriptPubkey::new(vec![
            0x04, 0xde, 0xad, 0xbe, 0xef,
        ]);
        let tx = Transaction::new(1, coinbase.inputs().to_vec(), vec![witness_out], 0);
        filter.insert(&[0xde, 0xad, 0xbe, 0xef]);

        let block = Block::new(
            BlockHeader::new(
                1,
                Default::default(),
                crate::hashes::MerkleRoot::new(tx.txid().internal()),
                0,
                crate::consts::EASIEST_DIFFICULTY_TARGET,
                0,
            ),
            Some(vec![tx.clone()]),
        );
        let filtered = scan_block(&block, &mut filter).unwrap();
        assert_eq!(filtered.matched_tx.len(), 1);

        let mut outpoint_bytes = Vec::new();
        Outpoint::new(tx.txid(), 0).write_to(&mut outpoint_bytes).unwrap();
        assert!(filter.contains(&outpoint_bytes));
    }

    #[test]
    fn murmur3_matches_a_known_vector() {
        // "hello" with seed 0, a widely-cited MurmurHash3 x86_32 test vector.
        assert_eq!(murmur3_32(b"hello", 0), 0x248b_fa47);
    }

    #[test]
    fn bloom_update_flag_round_trips_through_the_wire_byte() {
        for flag in [BloomUpdateFlag::None, BloomUpdateFlag::All, BloomUpdateFlag::P2PubkeyOnly] {
            assert_eq!(BloomUpdateFlag::from_byte(flag.to_byte()), Some(flag));
        }
    }
}
