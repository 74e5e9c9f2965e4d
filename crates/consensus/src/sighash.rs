//! Signature-hash ("sighash") pre-image construction: the legacy (pre-segwit) algorithm and the
//! BIP143 witness algorithm. Both are pure functions of their arguments -- neither one mutates
//! the transaction passed in, and neither touches script *execution*, which remains the
//! `ScriptInterpreter` collaborator's job. The 32-byte digest each produces is what an external
//! `Signer` actually signs.

use std::io::Write;

use wire_codec::{
    hashes::{Hash256Digest, Hash256Writer, MarkedDigestWriter},
    ser::ByteFormat,
};

use crate::{
    error::TxError,
    types::{
        script::{Script, ScriptSig, Witness, OP_CODESEPARATOR},
        tx::Transaction,
        txout::Output,
    },
};

/// `SIGHASH_ALL`: sign every input and every output. The implicit default when the low five bits
/// of a sighash byte match neither [`SIGHASH_NONE`] nor [`SIGHASH_SINGLE`] -- this includes the
/// non-canonical but historically-legal `sighash_byte = 0`.
pub const SIGHASH_ALL: u8 = 0x01;
/// `SIGHASH_NONE`: sign every input, no outputs. Outputs may be added or reordered freely.
pub const SIGHASH_NONE: u8 = 0x02;
/// `SIGHASH_SINGLE`: sign every input and exactly the output sharing the signed input's index.
pub const SIGHASH_SINGLE: u8 = 0x03;
/// `SIGHASH_ANYONECANPAY`: a modifier bit, OR'd onto one of the base flags above, restricting the
/// signature to commit to only the input being signed rather than the whole input list.
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// The literal pre-image Satoshi's original client returns for a `SIGHASH_SINGLE` (or
/// `SIGHASH_SINGLE | SIGHASH_ANYONECANPAY`) signature over an input index with no corresponding
/// output, instead of raising an error. A historical mainnet transaction actually appears in the
/// chain relying on this behavior, so it is permanent consensus law and must be reproduced
/// bit-for-bit rather than "fixed".
pub fn sighash_single_bug() -> Hash256Digest {
    let mut bytes = [0u8; 32];
    bytes[0] = 0x01;
    Hash256Digest::new(bytes)
}

fn base_flag(sighash_byte: u8) -> u8 {
    sighash_byte & 0x1f
}

fn is_anyonecanpay(sighash_byte: u8) -> bool {
    sighash_byte & SIGHASH_ANYONECANPAY != 0
}

/// Compute the legacy (pre-segwit) signature-hash pre-image digest for input `input_index` of
/// `tx`, under `sighash_byte`, using `script_code` as the script being satisfied (ordinarily the
/// prevout's `scriptPubKey`, or the redeem/witness script in P2SH/P2WSH cases).
///
/// `tx` is never mutated; a modified copy is built internally per the steps below, serialized
/// classically, and hashed:
/// 1. Every input's `script_sig` is cleared and its witness dropped; `script_code`, with any
///    `OP_CODESEPARATOR` bytes stripped, becomes `input_index`'s `script_sig`.
/// 2. `SIGHASH_NONE` empties the outputs and zeroes every other input's `sequence`.
/// 3. `SIGHASH_SINGLE` truncates the outputs to `input_index + 1`, blanks every earlier output to
///    the `(-1, empty)` sentinel, and zeroes every other input's `sequence` -- unless
///    `input_index` has no corresponding output, in which case [`sighash_single_bug`] is returned
///    immediately without touching the copy.
/// 4. `SIGHASH_ANYONECANPAY` drops every input but `input_index`'s.
/// 5. The result is serialized classically, `sighash_byte` is appended as a little-endian `u32`,
///    and the whole thing is double-SHA-256'd.
pub fn legacy_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    sighash_byte: u8,
) -> Result<Hash256Digest, TxError> {
    if input_index >= tx.inputs().len() {
        return Err(TxError::InputIndexOutOfRange(input_index));
    }

    let base = base_flag(sighash_byte);
    if base == SIGHASH_SINGLE && input_index >= tx.outputs().len() {
        return Ok(sighash_single_bug());
    }

    let stripped: ScriptSig = script_code.strip_op(OP_CODESEPARATOR).into();

    let mut inputs: Vec<_> = tx
        .inputs()
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let mut input = input.clone();
            input.witness = Witness::new();
            input.script_sig = if i == input_index {
                stripped.clone()
            } else {
                ScriptSig::null()
            };
            input
        })
        .collect();

    let mut outputs = tx.outputs().to_vec();

    match base {
        SIGHASH_NONE => {
            outputs.clear();
            zero_other_sequences(&mut inputs, input_index);
        }
        SIGHASH_SINGLE => {
            outputs.truncate(input_index + 1);
            for output in outputs.iter_mut().take(input_index) {
                *output = Output::excluded();
            }
            zero_other_sequences(&mut inputs, input_index);
        }
        _ => {}
    }

    if is_anyonecanpay(sighash_byte) {
        inputs = vec![inputs[input_index].clone()];
    }

    let copy = Transaction::new(tx.version(), inputs, outputs, tx.lock_time());
    let mut buf = Vec::with_capacity(copy.classic_size() + 4);
    copy.write_classic(&mut buf)?;
    buf.extend_from_slice(&(sighash_byte as u32).to_le_bytes());
    Ok(wire_codec::hashes::hash256(&buf))
}

fn zero_other_sequences(inputs: &mut [crate::types::txin::Input], input_index: usize) {
    for (i, input) in inputs.iter_mut().enumerate() {
        if i != input_index {
            input.sequence = 0;
        }
    }
}

/// Compute the BIP143 witness signature-hash pre-image digest for input `input_index` of `tx`.
///
/// Unlike the legacy routine, this never reserializes the whole transaction; it hashes a handful
/// of sub-regions (prevouts, sequences, outputs) once each and assembles them according to the
/// table in BIP143. `script_code` is the script actually committed to (the P2WSH witness script,
/// or `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG` for a P2WPKH's implied scriptCode);
/// `prevout_value` is the satoshi value of the output `tx`'s `input_index`'th input spends.
///
/// Like the legacy routine, `SIGHASH_SINGLE` over an input index with no corresponding output
/// returns [`sighash_single_bug`] rather than erroring -- BIP143 explicitly inherits this legacy
/// behavior for that one case.
pub fn witness_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    prevout_value: i64,
    sighash_byte: u8,
) -> Result<Hash256Digest, TxError> {
    if input_index >= tx.inputs().len() {
        return Err(TxError::InputIndexOutOfRange(input_index));
    }

    let base = base_flag(sighash_byte);
    let is_single = base == SIGHASH_SINGLE;
    let is_none = base == SIGHASH_NONE;
    let anyonecanpay = is_anyonecanpay(sighash_byte);

    if is_single && input_index >= tx.outputs().len() {
        return Ok(sighash_single_bug());
    }

    let hash_prevouts = if anyonecanpay {
        Hash256Digest::default()
    } else {
        let mut w = Hash256Writer::default();
        for input in tx.inputs() {
            input.outpoint.write_to(&mut w)?;
        }
        w.finish()
    };

    let hash_sequence = if anyonecanpay || is_single || is_none {
        Hash256Digest::default()
    } else {
        let mut w = Hash256Writer::default();
        for input in tx.inputs() {
            w.write_all(&input.sequence.to_le_bytes())
                .expect("writing to a hash writer cannot fail");
        }
        w.finish()
    };

    let hash_outputs = if is_none {
        Hash256Digest::default()
    } else if is_single {
        let mut w = Hash256Writer::default();
        tx.outputs()[input_index].write_to(&mut w)?;
        w.finish()
    } else {
        let mut w = Hash256Writer::default();
        for output in tx.outputs() {
            output.write_to(&mut w)?;
        }
        w.finish()
    };

    let input = &tx.inputs()[input_index];
    let mut w = Hash256Writer::default();
    w.write_all(&tx.version().to_le_bytes())
        .expect("writing to a hash writer cannot fail");
    hash_prevouts.write_to(&mut w)?;
    hash_sequence.write_to(&mut w)?;
    input.outpoint.write_to(&mut w)?;
    script_code.write_to(&mut w)?;
    w.write_all(&prevout_value.to_le_bytes())
        .expect("writing to a hash writer cannot fail");
    w.write_all(&input.sequence.to_le_bytes())
        .expect("writing to a hash writer cannot fail");
    hash_outputs.write_to(&mut w)?;
    w.write_all(&tx.lock_time().to_le_bytes())
        .expect("writing to a hash writer cannot fail");
    w.write_all(&(sighash_byte as u32).to_le_bytes())
        .expect("writing to a hash writer cannot fail");
    Ok(w.finish())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::txin::{Input, Outpoint};

    fn one_in_one_out() -> Transaction {
        Transaction::new(
            1,
            vec![Input::new(Outpoint::null(), ScriptSig::new(vec![]), 0xffff_ffff)],
            vec![Output::new(1_000, vec![0x76, 0xa9])],
            0,
        )
    }

    #[test]
    fn it_returns_the_one_hash_bug_for_legacy_single_out_of_range() {
        // Single input, no outputs: SIGHASH_SINGLE has nothing to commit to.
        let tx = Transaction::new(
            1,
            vec![Input::new(Outpoint::null(), ScriptSig::new(vec![]), 0xffff_ffff)],
            vec![],
            0,
        );
        let digest = legacy_sighash(&tx, 0, &Script::new(vec![]), SIGHASH_SINGLE).unwrap();
        assert_eq!(digest, sighash_single_bug());
        let mut expected = [0u8; 32];
        expected[0] = 1;
        assert_eq!(digest.as_ref(), &expected[..]);
    }

    #[test]
    fn it_returns_the_one_hash_bug_for_witness_single_out_of_range() {
        let tx = Transaction::new(
            1,
            vec![Input::new(Outpoint::null(), ScriptSig::new(vec![]), 0xffff_ffff)],
            vec![],
            0,
        );
        let digest =
            witness_sighash(&tx, 0, &Script::new(vec![]), 1_000, SIGHASH_SINGLE).unwrap();
        assert_eq!(digest, sighash_single_bug());
    }

    #[test]
    fn it_accepts_the_non_canonical_zero_sighash_byte_as_all() {
        let tx = one_in_one_out();
        let all = legacy_sighash(&tx, 0, &Script::new(vec![0x51]), SIGHASH_ALL).unwrap();
        let zero = legacy_sighash(&tx, 0, &Script::new(vec![0x51]), 0x00).unwrap();
        assert_eq!(all, zero);
    }

    #[test]
    fn it_differs_between_sighash_modes() {
        let tx = one_in_one_out();
        let script = Script::new(vec![0x51]);
        let all = legacy_sighash(&tx, 0, &script, SIGHASH_ALL).unwrap();
        let none = legacy_sighash(&tx, 0, &script, SIGHASH_NONE).unwrap();
        let single = legacy_sighash(&tx, 0, &script, SIGHASH_SINGLE).unwrap();
        assert_ne!(all, none);
        assert_ne!(all, single);
        assert_ne!(none, single);
    }

    #[test]
    fn it_rejects_an_out_of_range_input_index() {
        let tx = one_in_one_out();
        match legacy_sighash(&tx, 5, &Script::new(vec![]), SIGHASH_ALL) {
            Err(TxError::InputIndexOutOfRange(5)) => {}
            other => panic!("expected InputIndexOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn it_ignores_other_inputs_sequence_under_single_and_none() {
        let script = Script::new(vec![]);
        let build = |other_sequence: u32| {
            Transaction::new(
                1,
                vec![
                    Input::new(Outpoint::null(), ScriptSig::new(vec![]), 5),
                    Input::new(Outpoint::null(), ScriptSig::new(vec![]), other_sequence),
                ],
                vec![Output::new(1, vec![]), Output::new(2, vec![])],
                0,
            )
        };
        let a = witness_sighash(&build(6), 0, &script, 10, SIGHASH_SINGLE).unwrap();
        let b = witness_sighash(&build(999), 0, &script, 10, SIGHASH_SINGLE).unwrap();
        assert_eq!(a, b, "SIGHASH_SINGLE must not commit to other inputs' sequence numbers");

        let all_a = witness_sighash(&build(6), 0, &script, 10, SIGHASH_ALL).unwrap();
        let all_b = witness_sighash(&build(999), 0, &script, 10, SIGHASH_ALL).unwrap();
        assert_ne!(all_a, all_b, "SIGHASH_ALL must commit to every input's sequence number");
    }

    #[test]
    fn it_differs_between_witness_sighash_modes() {
        let tx = one_in_one_out();
        let script = Script::new(vec![0x51]);
        let all = witness_sighash(&tx, 0, &script, 1_000, SIGHASH_ALL).unwrap();
        let none = witness_sighash(&tx, 0, &script, 1_000, SIGHASH_NONE).unwrap();
        assert_ne!(all, none);
    }
}
