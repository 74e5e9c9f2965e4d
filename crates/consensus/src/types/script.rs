//! Opaque script byte-arrays and the static (non-executing) analyses the codec and sighash
//! builder need from them: sigop counting, `OP_CODESEPARATOR` stripping, and pattern
//! classification. Actual script *execution* is out of scope and lives behind the external
//! `ScriptInterpreter` collaborator.

use wire_codec::{impl_script_conversion, wrap_prefixed_byte_vector};

use crate::consts::WITNESS_COMMITMENT_PREFIX;

const OP_0: u8 = 0x00;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const OP_RETURN: u8 = 0x6a;
const OP_EQUAL: u8 = 0x87;
const OP_HASH160: u8 = 0xa9;
const OP_DUP: u8 = 0x76;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKSIGVERIFY: u8 = 0xad;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

/// `OP_CODESEPARATOR`: the opcode the legacy sighash routine strips from `scriptCode`.
pub const OP_CODESEPARATOR: u8 = 0xab;

wrap_prefixed_byte_vector!(
    /// An opaque `scriptSig`: the unlocking script carried by a transaction input.
    ScriptSig
);
wrap_prefixed_byte_vector!(
    /// An opaque `scriptPubKey`: the locking script carried by a transaction output.
    ScriptPubkey
);
wrap_prefixed_byte_vector!(
    /// A generic opaque script, used as the `script_code` argument to sighash construction
    /// (which may be a `scriptPubKey`, a P2SH redeem script, or a P2WSH witness script).
    Script
);
wrap_prefixed_byte_vector!(
    /// One item on a witness stack: an opaque, length-prefixed byte string.
    WitnessStackItem
);

impl_script_conversion!(Script, ScriptSig);
impl_script_conversion!(Script, ScriptPubkey);
impl_script_conversion!(ScriptSig, ScriptPubkey);

/// The witness stack carried by a single input: an ordered, length-prefixed list of
/// [`WitnessStackItem`]s. An empty witness (zero items) is distinct from "no witness field at
/// all" only at the block-serialization level (the marker/flag bytes); structurally every input
/// always has a `Witness`, which may simply be empty.
pub type Witness = Vec<WitnessStackItem>;

/// Shape-only classification of a `scriptPubKey`. Recognizing a shape says nothing about
/// whether the script is spendable or standard policy; it is purely pattern matching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptType {
    /// `<pubkey> OP_CHECKSIG`
    P2PK,
    /// `OP_DUP OP_HASH160 <20-byte hash> OP_EQUALVERIFY OP_CHECKSIG`
    P2PKH,
    /// `OP_HASH160 <20-byte hash> OP_EQUAL`
    P2SH,
    /// `OP_0 <20-byte hash>` (witness version 0, program length 20)
    P2WPKH,
    /// `OP_0 <32-byte hash>` (witness version 0, program length 32)
    P2WSH,
    /// `OP_RETURN push(0x24) 0xaa21a9ed <32-byte hash>`, a BIP141 witness commitment.
    WitnessCommitment([u8; 32]),
    /// Anything not matching a recognized shape.
    Other,
}

impl ScriptPubkey {
    /// Classify this script's shape. See [`ScriptType`].
    pub fn standard_type(&self) -> ScriptType {
        let b = self.items();
        match b.len() {
            35 if b[0] == 0x21 && b[34] == OP_CHECKSIG => ScriptType::P2PK,
            67 if b[0] == 0x41 && b[66] == OP_CHECKSIG => ScriptType::P2PK,
            25 if b[0] == OP_DUP
                && b[1] == OP_HASH160
                && b[2] == 0x14
                && b[23] == OP_EQUALVERIFY
                && b[24] == OP_CHECKSIG =>
            {
                ScriptType::P2PKH
            }
            23 if b[0] == OP_HASH160 && b[1] == 0x14 && b[22] == OP_EQUAL => ScriptType::P2SH,
            22 if b[0] == OP_0 && b[1] == 0x14 => ScriptType::P2WPKH,
            34 if b[0] == OP_0 && b[1] == 0x20 => ScriptType::P2WSH,
            _ if b.len() >= 38 && b[..6] == WITNESS_COMMITMENT_PREFIX[..] => {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&b[6..38]);
                ScriptType::WitnessCommitment(hash)
            }
            _ => ScriptType::Other,
        }
    }

    /// `true` if this script is an `OP_RETURN` data carrier (including, but not limited to,
    /// witness commitments).
    pub fn is_op_return(&self) -> bool {
        self.items().first() == Some(&OP_RETURN)
    }
}

/// A static script traversal, shared by every opaque script newtype via their common byte
/// representation.
pub trait BitcoinScript: AsRef<[u8]> {
    /// Count signature-verification operations in this script, per the legacy (non-segwit)
    /// consensus rule. `accurate` controls whether `OP_CHECKMULTISIG(VERIFY)` is counted
    /// precisely (by inspecting the small-integer push that immediately precedes it) or
    /// conservatively as 20; legacy `scriptSig` sigop counting (which cannot see the redeem
    /// script) always uses `accurate = false`.
    fn sigop_count(&self, accurate: bool) -> u32 {
        let bytes = self.as_ref();
        let mut count = 0u32;
        let mut last_opcode: Option<u8> = None;
        let mut i = 0usize;
        while i < bytes.len() {
            let opcode = bytes[i];
            match opcode {
                OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                    count += 1;
                    i += 1;
                }
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    if accurate {
                        count += match last_opcode {
                            Some(op) if (OP_1..=OP_16).contains(&op) => {
                                u32::from(op - OP_1 + 1)
                            }
                            _ => 20,
                        };
                    } else {
                        count += 20;
                    }
                    i += 1;
                }
                0x01..=0x4b => {
                    // Direct push of `opcode` bytes of data.
                    i += 1 + opcode as usize;
                }
                OP_PUSHDATA1 => {
                    if i + 1 >= bytes.len() {
                        break;
                    }
                    let len = bytes[i + 1] as usize;
                    i += 2 + len;
                }
                OP_PUSHDATA2 => {
                    if i + 2 >= bytes.len() {
                        break;
                    }
                    let len = u16::from_le_bytes([bytes[i + 1], bytes[i + 2]]) as usize;
                    i += 3 + len;
                }
                OP_PUSHDATA4 => {
                    if i + 4 >= bytes.len() {
                        break;
                    }
                    let len = u32::from_le_bytes([
                        bytes[i + 1],
                        bytes[i + 2],
                        bytes[i + 3],
                        bytes[i + 4],
                    ]) as usize;
                    i += 5 + len;
                }
                _ => {
                    i += 1;
                }
            }
            last_opcode = Some(opcode);
            if i > bytes.len() {
                break;
            }
        }
        count
    }

    /// Remove every standalone occurrence of `op_code` from this script, leaving data pushes
    /// untouched (a byte inside a push's payload that happens to equal `op_code` is data, not an
    /// opcode, and is never stripped). Used by the legacy sighash routine to remove
    /// `OP_CODESEPARATOR` from `scriptCode` before hashing it.
    fn strip_op(&self, op_code: u8) -> Vec<u8> {
        let bytes = self.as_ref();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0usize;
        while i < bytes.len() {
            let opcode = bytes[i];
            match opcode {
                0x01..=0x4b => {
                    let end = (i + 1 + opcode as usize).min(bytes.len());
                    out.extend_from_slice(&bytes[i..end]);
                    i = end;
                }
                OP_PUSHDATA1 if i + 1 < bytes.len() => {
                    let len = bytes[i + 1] as usize;
                    let end = (i + 2 + len).min(bytes.len());
                    out.extend_from_slice(&bytes[i..end]);
                    i = end;
                }
                OP_PUSHDATA2 if i + 2 < bytes.len() => {
                    let len = u16::from_le_bytes([bytes[i + 1], bytes[i + 2]]) as usize;
                    let end = (i + 3 + len).min(bytes.len());
                    out.extend_from_slice(&bytes[i..end]);
                    i = end;
                }
                OP_PUSHDATA4 if i + 4 < bytes.len() => {
                    let len = u32::from_le_bytes([
                        bytes[i + 1],
                        bytes[i + 2],
                        bytes[i + 3],
                        bytes[i + 4],
                    ]) as usize;
                    let end = (i + 5 + len).min(bytes.len());
                    out.extend_from_slice(&bytes[i..end]);
                    i = end;
                }
                _ => {
                    if opcode != op_code {
                        out.push(opcode);
                    }
                    i += 1;
                }
            }
        }
        out
    }

    /// Iterate over every literal data push in this script, in encounter order, skipping opcodes
    /// that carry no payload. A truncated trailing push (its declared length runs past the end of
    /// the script) is dropped rather than yielded short. Used by the Bloom filter scanner to test
    /// each push against a filter.
    fn iter_pushes(&self) -> Vec<&[u8]> {
        let bytes = self.as_ref();
        let mut out = Vec::new();
        let mut i = 0usize;
        while i < bytes.len() {
            let opcode = bytes[i];
            match opcode {
                0x01..=0x4b => {
                    let end = i + 1 + opcode as usize;
                    if end > bytes.len() {
                        break;
                    }
                    out.push(&bytes[i + 1..end]);
                    i = end;
                }
                OP_PUSHDATA1 if i + 1 < bytes.len() => {
                    let len = bytes[i + 1] as usize;
                    let start = i + 2;
                    let end = start + len;
                    if end > bytes.len() {
                        break;
                    }
                    out.push(&bytes[start..end]);
                    i = end;
                }
                OP_PUSHDATA2 if i + 2 < bytes.len() => {
                    let len = u16::from_le_bytes([bytes[i + 1], bytes[i + 2]]) as usize;
                    let start = i + 3;
                    let end = start + len;
                    if end > bytes.len() {
                        break;
                    }
                    out.push(&bytes[start..end]);
                    i = end;
                }
                OP_PUSHDATA4 if i + 4 < bytes.len() => {
                    let len = u32::from_le_bytes([
                        bytes[i + 1],
                        bytes[i + 2],
                        bytes[i + 3],
                        bytes[i + 4],
                    ]) as usize;
                    let start = i + 5;
                    let end = start + len;
                    if end > bytes.len() {
                        break;
                    }
                    out.push(&bytes[start..end]);
                    i = end;
                }
                _ => {
                    i += 1;
                }
            }
        }
        out
    }
}

impl BitcoinScript for Script {}
impl BitcoinScript for ScriptSig {}
impl BitcoinScript for ScriptPubkey {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn it_classifies_standard_script_shapes() {
        let mut p2pkh_bytes = vec![OP_DUP, OP_HASH160, 0x14];
        p2pkh_bytes.extend_from_slice(&[0u8; 20]);
        p2pkh_bytes.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        assert_eq!(ScriptPubkey::new(p2pkh_bytes).standard_type(), ScriptType::P2PKH);

        let mut p2sh_bytes = vec![OP_HASH160, 0x14];
        p2sh_bytes.extend_from_slice(&[0u8; 20]);
        p2sh_bytes.push(OP_EQUAL);
        assert_eq!(ScriptPubkey::new(p2sh_bytes).standard_type(), ScriptType::P2SH);

        let mut p2wpkh_bytes = vec![OP_0, 0x14];
        p2wpkh_bytes.extend_from_slice(&[0u8; 20]);
        assert_eq!(ScriptPubkey::new(p2wpkh_bytes).standard_type(), ScriptType::P2WPKH);
    }

    #[test]
    fn it_counts_checkmultisig_accurately_when_preceded_by_a_small_int() {
        // OP_2 <pub> <pub> OP_2 OP_CHECKMULTISIG, accurate counting should read the trailing
        // OP_2 as "2 sigops", not the conservative fallback of 20.
        let mut script = vec![OP_1 + 1]; // OP_2
        script.push(0x21);
        script.extend_from_slice(&[0u8; 33]);
        script.push(0x21);
        script.extend_from_slice(&[0u8; 33]);
        script.push(OP_1 + 1); // OP_2
        script.push(OP_CHECKMULTISIG);
        let script = Script::new(script);
        assert_eq!(script.sigop_count(true), 2);
        assert_eq!(script.sigop_count(false), 20);
    }

    #[test]
    fn it_strips_codeseparator_but_not_matching_push_data() {
        let script = Script::new(vec![0x01, OP_CODESEPARATOR, OP_CODESEPARATOR, OP_CHECKSIG]);
        let stripped = script.strip_op(OP_CODESEPARATOR);
        // The first OP_CODESEPARATOR byte is data (pushed by `0x01`), and must survive; only
        // the standalone opcode instance is removed.
        assert_eq!(stripped, vec![0x01, OP_CODESEPARATOR, OP_CHECKSIG]);
    }

    #[test]
    fn it_iterates_data_pushes() {
        // <3-byte push> OP_DUP <20-byte push>
        let mut bytes = vec![0x03, 0xaa, 0xbb, 0xcc, OP_DUP, 0x14];
        bytes.extend_from_slice(&[0x11; 20]);
        let script = Script::new(bytes);
        let pushes = script.iter_pushes();
        assert_eq!(pushes, vec![&[0xaa, 0xbb, 0xcc][..], &[0x11; 20][..]]);
    }

    #[test]
    fn it_recognizes_a_witness_commitment() {
        let mut bytes = WITNESS_COMMITMENT_PREFIX.to_vec();
        bytes.extend_from_slice(&[0x11; 32]);
        let script = ScriptPubkey::new(bytes);
        match script.standard_type() {
            ScriptType::WitnessCommitment(h) => assert_eq!(h, [0x11; 32]),
            other => panic!("expected WitnessCommitment, got {:?}", other),
        }
    }

    #[test]
    fn it_recognizes_a_witness_commitment_with_trailing_bytes() {
        // BIP141 only requires the output to start with the prefix and 32-byte hash; extra
        // trailing push data is explicitly allowed and must not fall through to `Other`.
        let mut bytes = WITNESS_COMMITMENT_PREFIX.to_vec();
        bytes.extend_from_slice(&[0x22; 32]);
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let script = ScriptPubkey::new(bytes);
        match script.standard_type() {
            ScriptType::WitnessCommitment(h) => assert_eq!(h, [0x22; 32]),
            other => panic!("expected WitnessCommitment, got {:?}", other),
        }
    }
}
