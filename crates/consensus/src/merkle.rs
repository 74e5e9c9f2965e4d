//! Merkle tree construction over txids and wtxids, and BIP37 partial Merkle tree construction /
//! root extraction used by the Bloom filter scanner.

use std::io::{Read, Write};

use wire_codec::{
    hashes::{Hash256Digest, MarkedDigest},
    ser::ByteFormat,
};

use crate::{error::FilterError, types::tx::Transaction};

/// Combine a block's transactions' txids into a Merkle root, applying Bitcoin's duplicate-last-
/// leaf rule for odd-sized levels.
pub fn txid_merkle_root(transactions: &[Transaction]) -> Hash256Digest {
    let leaves: Vec<Hash256Digest> =
        transactions.iter().map(|tx| tx.txid().internal()).collect();
    merkle_root(&leaves)
}

/// Combine a block's transactions' wtxids into the witness Merkle root (BIP141); the coinbase's
/// contribution is its wtxid, which [`Transaction::wtxid`] already fixes at the all-zero hash.
pub fn witness_merkle_root(transactions: &[Transaction]) -> Hash256Digest {
    let leaves: Vec<Hash256Digest> =
        transactions.iter().map(|tx| tx.wtxid().internal()).collect();
    merkle_root(&leaves)
}

/// Build a Merkle root over arbitrary natural-order leaves, duplicating the last leaf of any
/// odd-sized level (the classic Bitcoin Merkle tree, malleable by design -- see
/// [`has_consecutive_duplicate`] for the consensus guard this implies for block verification).
pub fn merkle_root(leaves: &[Hash256Digest]) -> Hash256Digest {
    if leaves.is_empty() {
        return Hash256Digest::default();
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            let mut buf = Vec::with_capacity(64);
            buf.extend_from_slice(left.as_ref());
            buf.extend_from_slice(right.as_ref());
            next.push(wire_codec::hashes::hash256(&buf));
        }
        level = next;
    }
    level[0]
}

/// `true` iff `leaves` contains two consecutive equal entries. Bitcoin's duplicate-last-leaf
/// Merkle rule lets an attacker forge a second, distinct-looking block with the same Merkle root
/// by duplicating a transaction (CVE-2012-2459); the standard guard is to reject any block whose
/// transaction list contains two consecutive transactions with identical txids before trusting
/// its Merkle root.
pub fn has_consecutive_duplicate(leaves: &[Hash256Digest]) -> bool {
    leaves.windows(2).any(|w| w[0] == w[1])
}

fn tree_width(height: usize, n_leaves: usize) -> usize {
    (n_leaves + (1 << height) - 1) >> height
}

fn calc_hash(height: usize, pos: usize, leaves: &[Hash256Digest]) -> Hash256Digest {
    if height == 0 {
        return leaves[pos];
    }
    let left = calc_hash(height - 1, pos * 2, leaves);
    let width = tree_width(height - 1, leaves.len());
    let right = if pos * 2 + 1 < width {
        calc_hash(height - 1, pos * 2 + 1, leaves)
    } else {
        left
    };
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(left.as_ref());
    buf.extend_from_slice(right.as_ref());
    wire_codec::hashes::hash256(&buf)
}

#[allow(clippy::too_many_arguments)]
fn traverse_and_build(
    height: usize,
    pos: usize,
    leaves: &[Hash256Digest],
    matches: &[bool],
    bits: &mut Vec<bool>,
    hashes: &mut Vec<Hash256Digest>,
) {
    let start = pos << height;
    let end = ((pos + 1) << height).min(matches.len());
    let parent_matches = matches[start.min(matches.len())..end].iter().any(|m| *m);
    bits.push(parent_matches);
    if height == 0 || !parent_matches {
        hashes.push(calc_hash(height, pos, leaves));
    } else {
        traverse_and_build(height - 1, pos * 2, leaves, matches, bits, hashes);
        if pos * 2 + 1 < tree_width(height - 1, leaves.len()) {
            traverse_and_build(height - 1, pos * 2 + 1, leaves, matches, bits, hashes);
        }
    }
}

/// A BIP37 partial Merkle tree: a compact proof that a subset of leaves, selected by a Bloom
/// filter match, belongs under a given (recomputable) root.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PartialMerkleTree {
    /// The total number of leaves (transactions) in the original tree.
    pub total_transactions: u32,
    /// Hashes emitted during the depth-first traversal: one per non-matching subtree and one per
    /// matching leaf.
    pub hashes: Vec<Hash256Digest>,
    /// One flag bit per node visited during the depth-first traversal, `true` iff that node's
    /// subtree contains a matched leaf.
    pub flags: Vec<bool>,
}

impl PartialMerkleTree {
    /// Build a partial Merkle tree over `leaves`, given a parallel `matches` bit-vector.
    pub fn build(total_transactions: u32, leaves: &[Hash256Digest], matches: &[bool]) -> Self {
        let mut bits = Vec::new();
        let mut hashes = Vec::new();
        if !leaves.is_empty() {
            let mut height = 0usize;
            while tree_width(height, leaves.len()) > 1 {
                height += 1;
            }
            traverse_and_build(height, 0, leaves, matches, &mut bits, &mut hashes);
        }
        Self {
            total_transactions,
            hashes,
            flags: bits,
        }
    }

    /// Recompute this tree's Merkle root and the positions of its matched leaves, by replaying
    /// the same depth-first traversal [`PartialMerkleTree::build`] used to produce it.
    pub fn extract_root(&self) -> Result<(Hash256Digest, Vec<usize>), FilterError> {
        if self.total_transactions == 0 {
            return Ok((Hash256Digest::default(), Vec::new()));
        }
        let mut height = 0usize;
        while tree_width(height, self.total_transactions as usize) > 1 {
            height += 1;
        }
        let mut bit_idx = 0usize;
        let mut hash_idx = 0usize;
        let mut matched = Vec::new();
        let root = traverse_and_extract(
            height,
            0,
            self.total_transactions as usize,
            &self.flags,
            &self.hashes,
            &mut bit_idx,
            &mut hash_idx,
            &mut matched,
        )?;
        if bit_idx != self.flags.len() || hash_idx != self.hashes.len() {
            return Err(FilterError::MalformedPartialMerkleTree);
        }
        Ok((root, matched))
    }
}

#[allow(clippy::too_many_arguments)]
fn traverse_and_extract(
    height: usize,
    pos: usize,
    n_leaves: usize,
    bits: &[bool],
    hashes: &[Hash256Digest],
    bit_idx: &mut usize,
    hash_idx: &mut usize,
    matched: &mut Vec<usize>,
) -> Result<Hash256Digest, FilterError> {
    let parent_matches = *bits.get(*bit_idx).ok_or(FilterError::MalformedPartialMerkleTree)?;
    *bit_idx += 1;
    if height == 0 || !parent_matches {
        let hash = *hashes.get(*hash_idx).ok_or(FilterError::MalformedPartialMerkleTree)?;
        *hash_idx += 1;
        if height == 0 && parent_matches {
            matched.push(pos);
        }
        Ok(hash)
    } else {
        let left = traverse_and_extract(
            height - 1,
            pos * 2,
            n_leaves,
            bits,
            hashes,
            bit_idx,
            hash_idx,
            matched,
        )?;
        let width = tree_width(height - 1, n_leaves);
        let right = if pos * 2 + 1 < width {
            traverse_and_extract(
                height - 1,
                pos * 2 + 1,
                n_leaves,
                bits,
                hashes,
                bit_idx,
                hash_idx,
                matched,
            )?
        } else {
            left
        };
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(left.as_ref());
        buf.extend_from_slice(right.as_ref());
        Ok(wire_codec::hashes::hash256(&buf))
    }
}

impl ByteFormat for PartialMerkleTree {
    type Error = FilterError;

    fn serialized_length(&self) -> usize {
        let n_bit_bytes = (self.flags.len() + 7) / 8;
        4 + wire_codec::ser::prefix_byte_len(self.hashes.len() as u64) as usize
            + self.hashes.len() * 32
            + wire_codec::ser::prefix_byte_len(n_bit_bytes as u64) as usize
            + n_bit_bytes
    }

    fn read_from<R>(reader: &mut R, _limit: usize) -> Result<Self, Self::Error>
    where
        R: Read,
    {
        let total_transactions = Self::read_u32_le(reader)?;
        // A partial tree's hash list can never be longer than the transaction count it claims to
        // summarize, and its flag-bit byte string can never exceed one bit per leaf's worth of
        // tree nodes; reject a wildly oversized VarInt before allocating or looping on it.
        let max_nodes = total_transactions as u64 + 1;
        let n_hashes = wire_codec::ser::read_compact_int(reader)?;
        if n_hashes > max_nodes {
            return Err(FilterError::MalformedPartialMerkleTree);
        }
        let mut hashes = Vec::with_capacity(n_hashes as usize);
        for _ in 0..n_hashes {
            hashes.push(Hash256Digest::read_from(reader, 0)?);
        }
        let n_bit_bytes = wire_codec::ser::read_compact_int(reader)?;
        if n_bit_bytes > max_nodes {
            return Err(FilterError::MalformedPartialMerkleTree);
        }
        let mut bit_bytes = vec![0u8; n_bit_bytes as usize];
        reader
            .read_exact(&mut bit_bytes)
            .map_err(|_| wire_codec::ser::SerError::ShortRead)?;
        let mut flags = Vec::with_capacity(bit_bytes.len() * 8);
        for (i, byte) in bit_bytes.iter().enumerate() {
            for bit in 0..8 {
                flags.push((byte >> bit) & 1 != 0);
            }
            let _ = i;
        }
        Ok(Self {
            total_transactions,
            hashes,
            flags,
        })
    }

    fn write_to<W>(&self, writer: &mut W) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        let mut written = Self::write_u32_le(writer, self.total_transactions)?;
        written += wire_codec::ser::write_compact_int(writer, self.hashes.len() as u64)?;
        for hash in &self.hashes {
            written += hash.write_to(writer)?;
        }
        let n_bit_bytes = (self.flags.len() + 7) / 8;
        let mut bit_bytes = vec![0u8; n_bit_bytes];
        for (i, flag) in self.flags.iter().enumerate() {
            if *flag {
                bit_bytes[i / 8] |= 1 << (i % 8);
            }
        }
        written += wire_codec::ser::write_compact_int(writer, bit_bytes.len() as u64)?;
        written += writer.write(&bit_bytes)?;
        Ok(written)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn leaf(byte: u8) -> Hash256Digest {
        Hash256Digest::new([byte; 32])
    }

    #[test]
    fn it_returns_the_single_leaf_as_root() {
        assert_eq!(merkle_root(&[leaf(1)]), leaf(1));
    }

    #[test]
    fn it_duplicates_the_last_leaf_for_odd_counts() {
        let three = merkle_root(&[leaf(1), leaf(2), leaf(3)]);
        let four = merkle_root(&[leaf(1), leaf(2), leaf(3), leaf(3)]);
        assert_eq!(three, four);
    }

    #[test]
    fn it_flags_consecutive_duplicate_leaves() {
        assert!(has_consecutive_duplicate(&[leaf(1), leaf(1), leaf(2)]));
        assert!(!has_consecutive_duplicate(&[leaf(1), leaf(2), leaf(3)]));
    }

    #[test]
    fn it_builds_and_extracts_a_partial_tree_with_one_match() {
        let leaves = vec![leaf(1), leaf(2), leaf(3), leaf(4)];
        let expected_root = merkle_root(&leaves);
        let matches = vec![false, true, false, false];
        let tree = PartialMerkleTree::build(4, &leaves, &matches);
        let (root, matched) = tree.extract_root().unwrap();
        assert_eq!(root, expected_root);
        assert_eq!(matched, vec![1]);
    }

    #[test]
    fn it_round_trips_a_partial_tree_through_serialization() {
        let leaves = vec![leaf(1), leaf(2), leaf(3)];
        let matches = vec![true, false, false];
        let tree = PartialMerkleTree::build(3, &leaves, &matches);
        let hex = tree.serialize_hex().unwrap();
        let parsed = PartialMerkleTree::deserialize_hex(&hex).unwrap();
        assert_eq!(parsed.total_transactions, tree.total_transactions);
        assert_eq!(parsed.hashes, tree.hashes);
        assert_eq!(&parsed.flags[..tree.flags.len()], &tree.flags[..]);
    }

    #[test]
    fn it_rejects_a_hash_count_larger_than_the_claimed_transaction_count() {
        // total_transactions = 1, but the hash-count VarInt claims far more hashes than a tree
        // over a single transaction could ever have.
        let mut bytes = 1u32.to_le_bytes().to_vec();
        wire_codec::ser::write_compact_int(&mut bytes, 1_000).unwrap();
        let mut cursor = std::io::Cursor::new(bytes);
        match PartialMerkleTree::read_from(&mut cursor, 0) {
            Err(FilterError::MalformedPartialMerkleTree) => {}
            other => panic!("expected MalformedPartialMerkleTree, got {:?}", other),
        }
    }
}
