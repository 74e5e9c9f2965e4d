//! Stand-alone block and transaction validation: the checks a node applies to a candidate block
//! before it may be linked into a chain. Nothing here touches a UTXO set, chain height beyond the
//! single BIP34 coinbase check, or script execution -- those are the `ChainContext` and
//! `ScriptInterpreter` collaborators' jobs (see the crate-level docs).

use std::collections::HashSet;

use log::{debug, warn};

use wire_codec::hashes::MarkedDigest;

use crate::{
    consts::{MAX_BLOCK_SIGOPS, MAX_BLOCK_SIZE, MAX_MONEY, WITNESS_COMMITMENT_PREFIX},
    error::{BlockError, TxError},
    hashes::MerkleRoot,
    merkle,
    types::{
        block::Block,
        script::{BitcoinScript, ScriptType},
        tx::Transaction,
        txin::Outpoint,
    },
};

/// Which height-dependent rules [`verify_transactions`] should apply. Distinct from a boolean
/// parameter so call sites read as `BlockVerifyFlags { height_in_coinbase: true }` rather than a
/// bare `true` whose meaning isn't visible at the call site.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockVerifyFlags {
    /// Enforce BIP34: the coinbase's `script_sig` must begin with a minimal push of the block's
    /// height. Only checked when a height is also supplied to [`verify_transactions`].
    pub height_in_coinbase: bool,
}

/// Header-only checks: proof-of-work and timestamp. Does not require the block's transactions.
pub fn verify_header(block: &Block, now: u32) -> Result<(), BlockError> {
    block.header().check_proof_of_work()?;
    block.header().check_timestamp(now)?;
    debug!(target: "verify", "header {} passed proof-of-work and timestamp checks", block.block_hash().to_be_hex());
    Ok(())
}

/// Full structural, Merkle, sigop, coinbase, and witness-commitment validation of `block`'s
/// transaction list. `height`, when known, enables the BIP34 check per `flags`.
pub fn verify_transactions(
    block: &Block,
    height: Option<i32>,
    flags: BlockVerifyFlags,
) -> Result<(), BlockError> {
    let transactions = block.transactions().ok_or(BlockError::EmptyTransactions)?;
    if transactions.is_empty() {
        return Err(BlockError::EmptyTransactions);
    }

    if block.classic_size() > MAX_BLOCK_SIZE {
        warn!(target: "verify", "block {} exceeds MAX_BLOCK_SIZE", block.block_hash().to_be_hex());
        return Err(BlockError::LargerThanMaxBlockSize(block.classic_size()));
    }

    if !transactions[0].is_coinbase() {
        return Err(BlockError::FirstTxNotCoinbase);
    }
    if transactions[1..].iter().any(Transaction::is_coinbase) {
        return Err(BlockError::FirstTxNotCoinbase);
    }

    if flags.height_in_coinbase {
        if let Some(h) = height {
            if h >= 0 {
                check_bip34_height(&transactions[0], h)?;
            }
        }
    }

    let txids: Vec<_> = transactions.iter().map(|tx| tx.txid().internal()).collect();
    if merkle::has_consecutive_duplicate(&txids) {
        return Err(BlockError::DuplicateTransaction);
    }
    let computed_root = block
        .computed_merkle_root()
        .expect("transactions list was just confirmed present");
    if computed_root != block.header().merkle_root {
        warn!(target: "verify", "block {} merkle root mismatch", block.block_hash().to_be_hex());
        return Err(BlockError::MerkleMismatch);
    }

    let total_sigops: u32 = transactions
        .iter()
        .map(|tx| {
            tx.inputs()
                .iter()
                .map(|i| i.script_sig.sigop_count(false))
                .sum::<u32>()
                + tx.outputs()
                    .iter()
                    .map(|o| o.script_pubkey.sigop_count(false))
                    .sum::<u32>()
        })
        .sum();
    if total_sigops > MAX_BLOCK_SIGOPS {
        return Err(BlockError::TooManySigops(total_sigops));
    }

    for tx in transactions {
        verify_transaction(tx)?;
    }

    let mut seen_outpoints: HashSet<Outpoint> = HashSet::new();
    for tx in transactions {
        for input in tx.inputs() {
            if !tx.is_coinbase() && !seen_outpoints.insert(input.outpoint) {
                return Err(BlockError::DuplicatedOutPoint);
            }
        }
    }

    check_witness_commitment(transactions)?;

    debug!(
        target: "verify",
        "block {} passed structural validation ({} transactions)",
        block.block_hash().to_be_hex(),
        transactions.len()
    );
    Ok(())
}

/// Per-transaction structural invariants, independent of any containing block: non-empty inputs
/// and outputs, no duplicate outpoints within the transaction itself, output values in range, the
/// coinbase `script_sig` length bound, and no non-coinbase input using the coinbase sentinel.
pub fn verify_transaction(tx: &Transaction) -> Result<(), BlockError> {
    if tx.inputs().is_empty() || tx.outputs().is_empty() {
        return Err(BlockError::EmptyInputsOrOutputs);
    }
    if tx.classic_size() > MAX_BLOCK_SIZE {
        return Err(BlockError::LargerThanMaxBlockSize(tx.classic_size()));
    }

    let is_coinbase = tx.is_coinbase();
    let mut seen = HashSet::with_capacity(tx.inputs().len());
    let mut total_out: i64 = 0;
    for input in tx.inputs() {
        if !seen.insert(input.outpoint) {
            return Err(BlockError::DuplicatedOutPoint);
        }
        if !is_coinbase && input.is_coinbase() {
            return Err(BlockError::UnexpectedCoinbaseInput);
        }
    }
    for output in tx.outputs() {
        if output.value < 0 {
            return Err(TxError::NegativeValue(output.value).into());
        }
        total_out = total_out.saturating_add(output.value);
    }
    if total_out > MAX_MONEY {
        return Err(TxError::ValueOutOfRange(total_out).into());
    }

    if is_coinbase && !tx.inputs()[0].coinbase_script_len_valid() {
        return Err(BlockError::CoinbaseScriptSizeOutOfRange(tx.inputs()[0].script_sig.len()));
    }

    Ok(())
}

fn check_witness_commitment(transactions: &[Transaction]) -> Result<(), BlockError> {
    let coinbase = &transactions[0];
    let commitment_hash = coinbase.outputs().iter().rev().find_map(|output| {
        match output.standard_type() {
            ScriptType::WitnessCommitment(h) => Some(h),
            _ => None,
        }
    });

    let any_witness = transactions.iter().any(Transaction::has_witness);

    match commitment_hash {
        None => {
            if any_witness {
                Err(BlockError::WitnessWithoutCommitment)
            } else {
                Ok(())
            }
        }
        Some(commitment) => {
            let witness = coinbase.inputs()[0].witness.clone();
            if witness.len() != 1 || witness[0].len() != 32 {
                return Err(BlockError::WitnessInvalidNonceSize);
            }
            let root = MerkleRoot::new(merkle::witness_merkle_root(transactions));
            let mut preimage = Vec::with_capacity(64);
            preimage.extend_from_slice(root.0.as_ref());
            preimage.extend_from_slice(witness[0].items());
            let computed = wire_codec::hashes::hash256(&preimage);
            if computed.as_ref() as &[u8] != &commitment[..] {
                return Err(BlockError::WitnessCommitmentMismatch);
            }
            Ok(())
        }
    }
}

fn script_num_bytes(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let negative = n < 0;
    let mut abs = n.unsigned_abs();
    let mut bytes = Vec::new();
    while abs > 0 {
        bytes.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    let top = *bytes.last().expect("loop ran at least once since n != 0");
    if top & 0x80 != 0 {
        bytes.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        *bytes.last_mut().expect("loop ran at least once since n != 0") |= 0x80;
    }
    bytes
}

/// Encode `height` as BIP34 requires it to appear at the start of the genesis input's
/// `script_sig`: a minimal data push of the height's little-endian `CScriptNum` encoding.
fn bip34_height_push(height: i32) -> Vec<u8> {
    let number = script_num_bytes(height as i64);
    let mut out = Vec::with_capacity(number.len() + 1);
    if number.is_empty() {
        out.push(0x00);
    } else {
        out.push(number.len() as u8);
        out.extend(number);
    }
    out
}

fn check_bip34_height(coinbase: &Transaction, height: i32) -> Result<(), BlockError> {
    let push = bip34_height_push(height);
    let script = coinbase.inputs()[0].script_sig.items();
    if script.len() < push.len() || script[..push.len()] != push[..] {
        return Err(BlockError::CoinbaseHeightMismatch(height));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        consts::EASIEST_DIFFICULTY_TARGET,
        hashes::BlockHash,
        types::{
            block::BlockHeader,
            script::{ScriptPubkey, ScriptSig, WitnessStackItem},
            tx::coinbase_outpoint,
            txin::Input,
            txout::Output,
        },
    };

    fn coinbase_tx() -> Transaction {
        Transaction::new(
            1,
            vec![Input::new(coinbase_outpoint(), ScriptSig::new(vec![0x01, 0x02]), 0xffff_ffff)],
            vec![Output::new(5_000_000_000i64, vec![])],
            0,
        )
    }

    fn header_for(merkle_root: MerkleRoot) -> BlockHeader {
        BlockHeader::new(1, BlockHash::default(), merkle_root, 0, EASIEST_DIFFICULTY_TARGET, 0)
    }

    #[test]
    fn it_accepts_a_single_coinbase_block() {
        let coinbase = coinbase_tx();
        let root = MerkleRoot::new(coinbase.txid().internal());
        let block = Block::new(header_for(root), Some(vec![coinbase]));
        assert!(verify_transactions(&block, None, BlockVerifyFlags::default()).is_ok());
    }

    #[test]
    fn it_rejects_a_mismatched_merkle_root() {
        let coinbase = coinbase_tx();
        let block = Block::new(header_for(MerkleRoot::default()), Some(vec![coinbase]));
        match verify_transactions(&block, None, BlockVerifyFlags::default()) {
            Err(BlockError::MerkleMismatch) => {}
            other => panic!("expected MerkleMismatch, got {:?}", other),
        }
    }

    #[test]
    fn it_rejects_when_first_tx_is_not_coinbase() {
        let not_coinbase = Transaction::new(
            1,
            vec![Input::new(Outpoint::new(Default::default(), 0), ScriptSig::new(vec![]), 0)],
            vec![Output::new(1, vec![])],
            0,
        );
        let root = MerkleRoot::new(not_coinbase.txid().internal());
        let block = Block::new(header_for(root), Some(vec![not_coinbase]));
        match verify_transactions(&block, None, BlockVerifyFlags::default()) {
            Err(BlockError::FirstTxNotCoinbase) => {}
            other => panic!("expected FirstTxNotCoinbase, got {:?}", other),
        }
    }

    #[test]
    fn it_rejects_duplicated_outpoints_within_a_transaction() {
        let outpoint = Outpoint::new(Default::default(), 0);
        let tx = Transaction::new(
            1,
            vec![
                Input::new(outpoint, ScriptSig::new(vec![]), 0),
                Input::new(outpoint, ScriptSig::new(vec![]), 0),
            ],
            vec![Output::new(1, vec![])],
            0,
        );
        match verify_transaction(&tx) {
            Err(BlockError::DuplicatedOutPoint) => {}
            other => panic!("expected DuplicatedOutPoint, got {:?}", other),
        }
    }

    #[test]
    fn it_requires_a_commitment_when_any_tx_has_a_witness() {
        let coinbase = coinbase_tx();
        let mut witnessed =
            Input::new(Outpoint::new(Default::default(), 1), ScriptSig::new(vec![]), 0);
        witnessed.witness = vec![WitnessStackItem::new(vec![0x01])];
        let spender = Transaction::new(1, vec![witnessed], vec![Output::new(1, vec![])], 0);

        let txs = vec![coinbase, spender];
        let root = MerkleRoot::new(merkle::txid_merkle_root(&txs));
        let block = Block::new(header_for(root), Some(txs));
        match verify_transactions(&block, None, BlockVerifyFlags::default()) {
            Err(BlockError::WitnessWithoutCommitment) => {}
            other => panic!("expected WitnessWithoutCommitment, got {:?}", other),
        }
    }

    #[test]
    fn it_encodes_bip34_heights_minimally() {
        assert_eq!(bip34_height_push(0), vec![0x00]);
        assert_eq!(bip34_height_push(1), vec![0x01, 0x01]);
        assert_eq!(bip34_height_push(127), vec![0x01, 0x7f]);
        assert_eq!(bip34_height_push(128), vec![0x02, 0x80, 0x00]);
        assert_eq!(bip34_height_push(500_000), vec![0x03, 0x20, 0xa1, 0x07]);
    }

    #[test]
    fn it_checks_the_bip34_height_push_against_the_coinbase_script() {
        let coinbase = Transaction::new(
            1,
            vec![Input::new(
                coinbase_outpoint(),
                ScriptSig::new(vec![0x03, 0x20, 0xa1, 0x07, 0xff]),
                0xffff_ffff,
            )],
            vec![Output::new(5_000_000_000i64, vec![])],
            0,
        );
        assert!(check_bip34_height(&coinbase, 500_000).is_ok());
        match check_bip34_height(&coinbase, 500_001) {
            Err(BlockError::CoinbaseHeightMismatch(500_001)) => {}
            other => panic!("expected CoinbaseHeightMismatch, got {:?}", other),
        }
    }

    #[test]
    fn it_builds_a_valid_witness_commitment_and_accepts_it() {
        let witness_merkle = merkle::witness_merkle_root(&[coinbase_tx()]);
        let reserved = [0u8; 32];
        let mut preimage = Vec::new();
        preimage.extend_from_slice(witness_merkle.as_ref());
        preimage.extend_from_slice(&reserved);
        let commitment = wire_codec::hashes::hash256(&preimage);

        let mut commitment_script = WITNESS_COMMITMENT_PREFIX.to_vec();
        commitment_script.extend_from_slice(commitment.as_ref());

        let mut input = Input::new(coinbase_outpoint(), ScriptSig::new(vec![0x01, 0x02]), 0xffff_ffff);
        input.witness = vec![WitnessStackItem::new(reserved.to_vec())];
        let coinbase = Transaction::new(
            1,
            vec![input],
            vec![
                Output::new(5_000_000_000i64, vec![]),
                Output::new(0, ScriptPubkey::new(commitment_script)),
            ],
            0,
        );

        check_witness_commitment(&[coinbase]).unwrap();
    }
}
