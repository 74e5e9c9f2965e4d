//! Transaction inputs: the outpoint being spent, the unlocking script, the sequence number, and
//! (structurally always present, possibly empty) the witness stack.

use std::io::{Read, Write};

use wire_codec::ser::{ByteFormat, SerResult};

use crate::{
    consts::{COINBASE_OUTPOINT_INDEX, COINBASE_SCRIPT_SIG_MAX, COINBASE_SCRIPT_SIG_MIN},
    error::TxError,
    hashes::Txid,
    types::script::{ScriptSig, Witness},
};

/// A reference to a previous transaction's output: `(txid, index)`. The sentinel
/// `(Txid::default(), 0xFFFFFFFF)` marks a coinbase input, which spends nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Outpoint {
    /// The referenced transaction's txid.
    pub txid: Txid,
    /// The index of the referenced output within that transaction's outputs.
    pub index: u32,
}

impl Outpoint {
    /// Construct a new outpoint.
    pub fn new(txid: Txid, index: u32) -> Self {
        Self { txid, index }
    }

    /// The sentinel outpoint that marks a coinbase input: an all-zero txid and index
    /// `0xFFFFFFFF`.
    pub fn null() -> Self {
        Self {
            txid: Txid::default(),
            index: COINBASE_OUTPOINT_INDEX,
        }
    }

    /// `true` iff this is the coinbase sentinel outpoint.
    pub fn is_null(&self) -> bool {
        *self == Self::null()
    }
}

impl ByteFormat for Outpoint {
    type Error = TxError;

    fn serialized_length(&self) -> usize {
        36
    }

    fn read_from<R>(reader: &mut R, _limit: usize) -> Result<Self, Self::Error>
    where
        R: Read,
    {
        let txid = Txid::read_from(reader, 0)?;
        let index = Self::read_u32_le(reader)?;
        Ok(Self { txid, index })
    }

    fn write_to<W>(&self, writer: &mut W) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        let mut written = self.txid.write_to(writer)?;
        written += Self::write_u32_le(writer, self.index)?;
        Ok(written)
    }
}

/// A transaction input: what it spends, how it unlocks it, its relative-locktime sequence
/// number, and its witness stack (empty when the input carries no witness data).
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Input {
    /// The previous output being spent.
    pub outpoint: Outpoint,
    /// The unlocking script. Cleared to empty during most sighash preimage construction.
    pub script_sig: ScriptSig,
    /// Relative-locktime / RBF signaling sequence number. `0xFFFFFFFF` disables relative
    /// locktime for this input.
    pub sequence: u32,
    /// This input's witness stack. Empty (not absent -- there is no "absent" at this level) when
    /// the input carries no witness.
    pub witness: Witness,
}

impl Input {
    /// Construct a new input with an empty witness stack.
    pub fn new(outpoint: Outpoint, script_sig: ScriptSig, sequence: u32) -> Self {
        Self {
            outpoint,
            script_sig,
            sequence,
            witness: Witness::new(),
        }
    }

    /// `true` iff this input's outpoint is the coinbase sentinel.
    pub fn is_coinbase(&self) -> bool {
        self.outpoint.is_null()
    }

    /// `true` iff this input carries a non-empty witness stack.
    pub fn has_witness(&self) -> bool {
        !self.witness.is_empty()
    }

    /// `true` iff this input's `script_sig` length falls in the coinbase-valid range `[2, 100]`.
    /// Callers should only ask this of an input already known to be a coinbase input.
    pub fn coinbase_script_len_valid(&self) -> bool {
        (COINBASE_SCRIPT_SIG_MIN..=COINBASE_SCRIPT_SIG_MAX).contains(&self.script_sig.len())
    }

    fn serialized_length_base(&self) -> usize {
        self.outpoint.serialized_length() + self.script_sig.serialized_length() + 4
    }

    fn write_base<W>(&self, writer: &mut W) -> Result<usize, TxError>
    where
        W: Write,
    {
        let mut written = self.outpoint.write_to(writer)?;
        written += self.script_sig.write_to(writer)?;
        written += Self::write_u32_le(writer, self.sequence)?;
        Ok(written)
    }

    fn read_base<R>(reader: &mut R) -> Result<Self, TxError>
    where
        R: Read,
    {
        let outpoint = Outpoint::read_from(reader, 0)?;
        let script_sig = ScriptSig::read_from(reader, 0).map_err(TxError::from)?;
        let sequence = Self::read_u32_le(reader)?;
        Ok(Self {
            outpoint,
            script_sig,
            sequence,
            witness: Witness::new(),
        })
    }
}

impl ByteFormat for Input {
    type Error = TxError;

    fn serialized_length(&self) -> usize {
        self.serialized_length_base()
    }

    fn read_from<R>(reader: &mut R, _limit: usize) -> Result<Self, Self::Error>
    where
        R: Read,
    {
        Self::read_base(reader)
    }

    fn write_to<W>(&self, writer: &mut W) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        self.write_base(writer)
    }
}

impl Input {
    /// Serialized length of just the classic (no-witness) portion of this input.
    pub fn classic_serialized_length(&self) -> usize {
        self.serialized_length_base()
    }

    /// Write just the classic (no-witness) portion of this input.
    pub fn write_classic<W>(&self, writer: &mut W) -> SerResult<usize>
    where
        W: Write,
    {
        self.write_base(writer).map_err(|e| match e {
            TxError::SerError(s) => s,
            _ => unreachable!("write_base only produces SerError variants"),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use wire_codec::ser::ByteFormat;

    #[test]
    fn it_serializes_and_deserializes_the_null_outpoint() {
        let null = Outpoint::null();
        let hex = null.serialize_hex().unwrap();
        let expected = format!("{}ffffffff", "0".repeat(64));
        assert_eq!(hex, expected);
        assert_eq!(Outpoint::deserialize_hex(&hex).unwrap(), null);
        assert!(null.is_null());
    }

    #[test]
    fn it_round_trips_an_input_without_witness() {
        let input = Input::new(Outpoint::null(), ScriptSig::new(vec![1, 2, 3]), 0);
        let hex = input.serialize_hex().unwrap();
        let parsed = Input::deserialize_hex(&hex).unwrap();
        assert_eq!(parsed, input);
        assert!(!parsed.has_witness());
    }
}
