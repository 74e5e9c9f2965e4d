//! The transaction type: one unified model supporting both classic and BIP144 (segwit) wire
//! serialization, with lazily-cached `txid`/`wtxid`.
//!
//! Earlier Bitcoin libraries in this lineage split "legacy" and "witness" transactions into two
//! types joined by a sum type, with the witness stacks held in a side array parallel to the
//! input list. Here, each [`Input`] owns its witness stack directly (empty when absent) and a
//! single `Transaction` serializes classically or via BIP144 depending on whether any input
//! needs a witness -- there is no second type and no side array to keep in sync.

use std::{
    cell::RefCell,
    io::{Read, Write},
};

use wire_codec::{hashes::MarkedDigest, ser::ByteFormat};

use crate::{
    consts::{COINBASE_OUTPOINT_INDEX, MAX_INPUT_COUNT, MAX_OUTPUT_COUNT, WITNESS_FLAG, WITNESS_MARKER},
    error::TxError,
    hashes::{Txid, Wtxid},
    types::{
        script::Witness,
        txin::{Input, Outpoint},
        txout::Output,
    },
};

/// Options governing ambiguous corners of transaction parsing.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParseOptions {
    /// The wire format is ambiguous between "a legacy transaction with zero inputs" and "a
    /// malformed witness transaction missing its flag byte" when the first VarInt read is zero.
    /// The consensus-conforming behavior, and this crate's default, is to reject such input
    /// (`TxError::AmbiguousZeroInputs`). Set this to `true` only for a compatibility code path
    /// (e.g. forwarding an old header-only message) that must accept the legacy, zero-input
    /// reading.
    pub allow_zero_input_legacy: bool,
}

/// A Bitcoin transaction.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    version: i32,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    lock_time: u32,
    #[serde(skip)]
    cache: RefCell<Cache>,
}

#[derive(Clone, Debug, Default)]
struct Cache {
    txid: Option<Txid>,
    wtxid: Option<Wtxid>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.lock_time == other.lock_time
    }
}
impl Eq for Transaction {}

impl Transaction {
    /// Construct a new transaction. Inputs and outputs must be non-empty for every wire-valid
    /// transaction, but the constructor itself does not enforce that -- it is enforced at parse
    /// time and by the block verifier, so that callers can still build up a transaction
    /// incrementally via [`Transaction::add_input`]/[`Transaction::add_output`].
    pub fn new(version: i32, inputs: Vec<Input>, outputs: Vec<Output>, lock_time: u32) -> Self {
        Self {
            version,
            inputs,
            outputs,
            lock_time,
            cache: RefCell::new(Cache::default()),
        }
    }

    /// This transaction's protocol version.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// This transaction's inputs.
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    /// This transaction's outputs.
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// This transaction's lock time.
    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    /// `true` iff any input carries a non-empty witness stack.
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(Input::has_witness)
    }

    /// `true` iff this is a coinbase transaction: exactly one input, and that input's outpoint
    /// is the coinbase sentinel.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    fn invalidate_cache(&self) {
        let mut cache = self.cache.borrow_mut();
        cache.txid = None;
        cache.wtxid = None;
    }

    /// Append an input, invalidating cached identity hashes.
    pub fn add_input(&mut self, input: Input) {
        self.inputs.push(input);
        self.invalidate_cache();
    }

    /// Append an output, invalidating cached identity hashes.
    pub fn add_output(&mut self, output: Output) {
        self.outputs.push(output);
        self.invalidate_cache();
    }

    /// Remove all inputs, invalidating cached identity hashes.
    pub fn clear_inputs(&mut self) {
        self.inputs.clear();
        self.invalidate_cache();
    }

    /// Remove all outputs, invalidating cached identity hashes.
    pub fn clear_outputs(&mut self) {
        self.outputs.clear();
        self.invalidate_cache();
    }

    /// Overwrite the lock time, invalidating cached identity hashes.
    pub fn set_lock_time(&mut self, lock_time: u32) {
        self.lock_time = lock_time;
        self.invalidate_cache();
    }

    /// Overwrite input `index`'s sequence number, invalidating cached identity hashes.
    pub fn set_sequence(&mut self, index: usize, sequence: u32) {
        self.inputs[index].sequence = sequence;
        self.invalidate_cache();
    }

    /// Classic (no-witness) serialized size, in bytes.
    pub fn classic_size(&self) -> usize {
        let mut size = 4 + 4; // version + lock_time
        size += varint_len(self.inputs.len() as u64);
        size += self
            .inputs
            .iter()
            .map(Input::classic_serialized_length)
            .sum::<usize>();
        size += varint_len(self.outputs.len() as u64);
        size += self.outputs.iter().map(Output::serialized_length).sum::<usize>();
        size
    }

    /// BIP144 serialized size, in bytes. Equal to `classic_size()` plus two marker/flag bytes
    /// plus each input's witness stack, whether or not any witness is actually non-empty --
    /// callers that need "smallest correct encoding" should use [`Transaction::write_to`], which
    /// only emits the witness encoding when at least one witness is non-empty.
    pub fn bip144_size(&self) -> usize {
        let mut size = self.classic_size() + 2;
        for input in &self.inputs {
            size += varint_len(input.witness.len() as u64);
            for item in &input.witness {
                size += item.serialized_length();
            }
        }
        size
    }

    /// `3 * classic_size + bip144_size` when any witness is present, else `4 * classic_size`.
    pub fn weight(&self) -> usize {
        if self.has_witness() {
            3 * self.classic_size() + self.bip144_size()
        } else {
            4 * self.classic_size()
        }
    }

    /// `ceil(weight / 4)`.
    pub fn vsize(&self) -> usize {
        (self.weight() + 3) / 4
    }

    /// This transaction's txid: double-SHA-256 over its classic serialization, cached after
    /// first computation.
    pub fn txid(&self) -> Txid {
        if let Some(txid) = self.cache.borrow().txid {
            return txid;
        }
        let mut buf = Vec::with_capacity(self.classic_size());
        self.write_classic(&mut buf).expect("writing to a Vec cannot fail");
        let digest = wire_codec::hashes::hash256(&buf);
        let txid = Txid::new(digest);
        self.cache.borrow_mut().txid = Some(txid);
        txid
    }

    /// This transaction's wtxid: double-SHA-256 over its BIP144 serialization, except that the
    /// coinbase transaction's wtxid is defined as the all-zero hash (BIP141). Cached after first
    /// computation.
    pub fn wtxid(&self) -> Wtxid {
        if self.is_coinbase() {
            return Wtxid::default();
        }
        if let Some(wtxid) = self.cache.borrow().wtxid {
            return wtxid;
        }
        let mut buf = Vec::with_capacity(self.bip144_size());
        self.write_bip144(&mut buf).expect("writing to a Vec cannot fail");
        let digest = wire_codec::hashes::hash256(&buf);
        let wtxid = Wtxid::new(digest);
        self.cache.borrow_mut().wtxid = Some(wtxid);
        wtxid
    }

    /// Write the classic (no marker/flag, no witnesses) serialization.
    pub fn write_classic<W>(&self, writer: &mut W) -> Result<usize, TxError>
    where
        W: Write,
    {
        let mut written = Self::write_i32_le(writer, self.version)?;
        written += Self::write_compact_int(writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            written += input.write_classic(writer).map_err(TxError::from)?;
        }
        written += Self::write_compact_int(writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            written += output.write_to(writer)?;
        }
        written += Self::write_u32_le(writer, self.lock_time)?;
        Ok(written)
    }

    /// Write the BIP144 (marker/flag + per-input witness stacks) serialization, regardless of
    /// whether any witness is actually present.
    pub fn write_bip144<W>(&self, writer: &mut W) -> Result<usize, TxError>
    where
        W: Write,
    {
        let mut written = Self::write_i32_le(writer, self.version)?;
        written += writer.write(&[WITNESS_MARKER, WITNESS_FLAG])?;
        written += Self::write_compact_int(writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            written += input.write_classic(writer).map_err(TxError::from)?;
        }
        written += Self::write_compact_int(writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            written += output.write_to(writer)?;
        }
        for input in &self.inputs {
            written += Self::write_prefix_vec(writer, &input.witness)?;
        }
        written += Self::write_u32_le(writer, self.lock_time)?;
        Ok(written)
    }

    /// Parse a transaction, using the default (consensus-strict) [`ParseOptions`].
    pub fn read_from_strict<R>(reader: &mut R) -> Result<Self, TxError>
    where
        R: Read,
    {
        Self::read_with_options(reader, ParseOptions::default())
    }

    /// Parse a transaction with explicit [`ParseOptions`], per the single-pass algorithm: read
    /// the version, then a VarInt that is either the witness marker (zero) or the input count.
    pub fn read_with_options<R>(reader: &mut R, options: ParseOptions) -> Result<Self, TxError>
    where
        R: Read,
    {
        let version = Self::read_i32_le(reader)?;
        let first = Self::read_compact_int(reader)?;

        if first == 0 {
            let mut flag = [0u8; 1];
            reader.read_exact(&mut flag).map_err(|_| wire_codec::ser::SerError::ShortRead)?;
            if flag[0] == WITNESS_FLAG {
                return Self::read_witness_body(reader, version);
            }
            if flag[0] != 0 && !options.allow_zero_input_legacy {
                return Err(TxError::BadMarker([first as u8, flag[0]]));
            }
            if !options.allow_zero_input_legacy {
                return Err(TxError::AmbiguousZeroInputs);
            }
            // Lenient compatibility path: a genuine zero-input legacy transaction; `flag[0]` was
            // actually the first byte of the (empty) output-count VarInt read above as part of
            // probing, so we must not discard it -- reconstruct by treating `first` as the
            // input count (0) and re-reading outputs starting from the byte already consumed.
            let outputs_first_byte = flag[0];
            let outputs = Self::read_outputs_with_first_byte(reader, outputs_first_byte)?;
            let lock_time = Self::read_u32_le(reader)?;
            return Ok(Self::new(version, vec![], outputs, lock_time));
        }

        let inputs = Self::read_classic_inputs(reader, first)?;
        let n_out = Self::read_compact_int(reader)?;
        let outputs = Self::read_outputs(reader, n_out)?;
        let lock_time = Self::read_u32_le(reader)?;
        Ok(Self::new(version, inputs, outputs, lock_time))
    }

    fn read_classic_inputs<R>(reader: &mut R, count: u64) -> Result<Vec<Input>, TxError>
    where
        R: Read,
    {
        if count > MAX_INPUT_COUNT {
            return Err(TxError::OversizedInputCount(count));
        }
        let mut inputs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            inputs.push(Input::read_from(reader, 0)?);
        }
        Ok(inputs)
    }

    fn read_outputs<R>(reader: &mut R, count: u64) -> Result<Vec<Output>, TxError>
    where
        R: Read,
    {
        if count > MAX_OUTPUT_COUNT {
            return Err(TxError::OversizedOutputCount(count));
        }
        let mut outputs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            outputs.push(Output::read_from(reader, 0)?);
        }
        Ok(outputs)
    }

    fn read_outputs_with_first_byte<R>(
        reader: &mut R,
        first_byte: u8,
    ) -> Result<Vec<Output>, TxError>
    where
        R: Read,
    {
        // `first_byte` is the already-consumed first byte of the output-count VarInt. Only the
        // single-byte (`<0xFD`) encoding is supported on this compatibility path, matching the
        // only case that can arise immediately after a zero input count in a genuinely legacy,
        // witness-less encoding produced by conformant historical peers.
        if first_byte >= 0xfd {
            return Err(TxError::BadMarker([0, first_byte]));
        }
        Self::read_outputs(reader, first_byte as u64)
    }

    fn read_witness_body<R>(reader: &mut R, version: i32) -> Result<Self, TxError>
    where
        R: Read,
    {
        let n_in = Self::read_compact_int(reader)?;
        let mut inputs = Self::read_classic_inputs(reader, n_in)?;
        let n_out = Self::read_compact_int(reader)?;
        let outputs = Self::read_outputs(reader, n_out)?;

        let mut any_witness = false;
        for input in inputs.iter_mut() {
            let witness: Witness = Self::read_prefix_vec(reader)?;
            any_witness |= !witness.is_empty();
            input.witness = witness;
        }
        if !any_witness {
            return Err(TxError::SuperfluousWitness);
        }

        let lock_time = Self::read_u32_le(reader)?;
        Ok(Self::new(version, inputs, outputs, lock_time))
    }

    fn read_compact_int<R>(reader: &mut R) -> Result<u64, TxError>
    where
        R: Read,
    {
        <Self as ByteFormat>::read_compact_int(reader)
    }
}

/// Returns the Bitcoin-sentinel coinbase outpoint's index, re-exported for convenience of
/// callers that want to build a coinbase input without reaching into `txin`.
pub fn coinbase_outpoint() -> Outpoint {
    Outpoint::new(Txid::default(), COINBASE_OUTPOINT_INDEX)
}

fn varint_len(n: u64) -> usize {
    wire_codec::ser::prefix_byte_len(n) as usize
}

impl ByteFormat for Transaction {
    type Error = TxError;

    fn serialized_length(&self) -> usize {
        if self.has_witness() {
            self.bip144_size()
        } else {
            self.classic_size()
        }
    }

    fn read_from<R>(reader: &mut R, _limit: usize) -> Result<Self, Self::Error>
    where
        R: Read,
    {
        Self::read_from_strict(reader)
    }

    fn write_to<W>(&self, writer: &mut W) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        if self.has_witness() {
            self.write_bip144(writer)
        } else {
            self.write_classic(writer)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::script::ScriptSig;

    fn sample_tx() -> Transaction {
        Transaction::new(
            1,
            vec![Input::new(Outpoint::null(), ScriptSig::new(vec![0xab; 4]), 0xffff_ffff)],
            vec![Output::new(5_000_000_000i64, vec![0x76, 0xa9])],
            0,
        )
    }

    #[test]
    fn it_round_trips_through_classic_serialization() {
        let tx = sample_tx();
        let hex = tx.serialize_hex().unwrap();
        let parsed = Transaction::deserialize_hex(&hex).unwrap();
        assert_eq!(parsed, tx);
        assert_eq!(parsed.serialize_hex().unwrap(), hex);
    }

    #[test]
    fn it_invalidates_the_txid_cache_on_mutation() {
        let mut tx = sample_tx();
        let before = tx.txid();
        tx.add_output(Output::new(1, vec![]));
        let after = tx.txid();
        assert_ne!(before, after);
    }

    #[test]
    fn it_does_not_change_txid_when_classic_bytes_are_unchanged() {
        let tx = sample_tx();
        let first = tx.txid();
        let second = tx.txid();
        assert_eq!(first, second);
    }

    #[test]
    fn coinbase_wtxid_is_the_all_zero_hash() {
        let coinbase = Transaction::new(
            1,
            vec![Input::new(coinbase_outpoint(), ScriptSig::new(vec![0x01, 0x02]), 0xffff_ffff)],
            vec![Output::new(5_000_000_000i64, vec![])],
            0,
        );
        assert_eq!(coinbase.wtxid(), Wtxid::default());
    }

    #[test]
    fn it_rejects_zero_input_transactions_by_default() {
        // version(4) || 00 (zero-input varint, ambiguous without a following flag byte)
        let mut bytes = 1i32.to_le_bytes().to_vec();
        bytes.push(0x00);
        bytes.push(0x00); // not the witness flag 0x01
        let mut cursor = std::io::Cursor::new(bytes);
        match Transaction::read_with_options(&mut cursor, ParseOptions::default()) {
            Err(TxError::AmbiguousZeroInputs) => {}
            other => panic!("expected AmbiguousZeroInputs, got {:?}", other),
        }
    }

    #[test]
    fn it_rejects_an_implausibly_large_declared_input_count() {
        // version(4) || a VarInt input count far larger than any block could hold, with no
        // actual input bytes following. A naive reader would try to allocate or loop on this;
        // the count must be rejected before either happens.
        let mut bytes = 1i32.to_le_bytes().to_vec();
        wire_codec::ser::write_compact_int(&mut bytes, MAX_INPUT_COUNT + 1).unwrap();
        let mut cursor = std::io::Cursor::new(bytes);
        match Transaction::read_with_options(&mut cursor, ParseOptions::default()) {
            Err(TxError::OversizedInputCount(n)) => assert_eq!(n, MAX_INPUT_COUNT + 1),
            other => panic!("expected OversizedInputCount, got {:?}", other),
        }
    }

    #[test]
    fn it_rejects_an_implausibly_large_declared_output_count() {
        // A single valid input followed by an output-count VarInt that alone exceeds what
        // MAX_BLOCK_SIZE could ever hold.
        let tx = sample_tx();
        let mut bytes = tx.version().to_le_bytes().to_vec();
        wire_codec::ser::write_compact_int(&mut bytes, 1).unwrap();
        tx.inputs()[0].write_to(&mut bytes).unwrap();
        wire_codec::ser::write_compact_int(&mut bytes, MAX_OUTPUT_COUNT + 1).unwrap();
        let mut cursor = std::io::Cursor::new(bytes);
        match Transaction::read_with_options(&mut cursor, ParseOptions::default()) {
            Err(TxError::OversizedOutputCount(n)) => assert_eq!(n, MAX_OUTPUT_COUNT + 1),
            other => panic!("expected OversizedOutputCount, got {:?}", other),
        }
    }
}
