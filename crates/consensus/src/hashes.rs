//! Marked `Hash256Digest` types used throughout this crate. Keeping txid, wtxid, and block hash
//! as distinct types (rather than all being a bare 32-byte array) prevents a whole class of bugs
//! where one gets passed where another is expected.

use wire_codec::mark_hash256;

mark_hash256!(
    /// A transaction's identifier: double-SHA-256 of its classic (no-witness) serialization.
    Txid
);

mark_hash256!(
    /// A transaction's witness identifier: double-SHA-256 of its BIP144 serialization. Defined
    /// to be the all-zero hash for the coinbase transaction (BIP141).
    Wtxid
);

mark_hash256!(
    /// A block header's identifier: double-SHA-256 of its fixed 80-byte serialization.
    BlockHash
);

mark_hash256!(
    /// The root of a txid or wtxid Merkle tree. Kept distinct from a bare `Txid`/`BlockHash` so a
    /// Merkle root can never be passed where an actual transaction or block identity is expected.
    MerkleRoot
);

#[cfg(test)]
mod test {
    use super::*;
    use wire_codec::ser::ByteFormat;

    #[test]
    fn it_serializes_and_deserializes_hash256digests() {
        let zero = "0".repeat(64);
        let parsed = Txid::deserialize_hex(&zero).unwrap();
        assert_eq!(parsed.serialized_length(), 32);
        assert_eq!(parsed, Txid::default());
        assert_eq!(parsed.serialize_hex().unwrap(), zero);
    }
}
