//! Transaction outputs: a satoshi value and the script that locks it.

use std::io::{Read, Write};

use wire_codec::ser::ByteFormat;

use crate::{
    consts::MAX_MONEY,
    error::TxError,
    types::script::{ScriptPubkey, ScriptType},
};

/// The sentinel value substituted for outputs excluded by `SIGHASH_SINGLE`/`SIGHASH_NONE`
/// sighash construction. Never a legal value for a real, spendable output.
pub const EXCLUDED_VALUE: i64 = -1;

/// A transaction output: `{ value, script_pubkey }`. `value` is normally in `[0, MAX_MONEY]`;
/// the sole exception is the internal [`EXCLUDED_VALUE`] sentinel used while building a legacy
/// SIGHASH_SINGLE pre-image, which never appears in a parsed (on-the-wire) output.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Output {
    /// Value in satoshis.
    pub value: i64,
    /// The locking script.
    pub script_pubkey: ScriptPubkey,
}

impl Output {
    /// Construct a new output.
    pub fn new<T>(value: i64, script_pubkey: T) -> Self
    where
        T: Into<ScriptPubkey>,
    {
        Self {
            value,
            script_pubkey: script_pubkey.into(),
        }
    }

    /// Construct the excluded-output placeholder used by legacy SIGHASH_SINGLE construction:
    /// value `-1`, empty script.
    pub fn excluded() -> Self {
        Self {
            value: EXCLUDED_VALUE,
            script_pubkey: ScriptPubkey::null(),
        }
    }

    /// Construct an `OP_RETURN` output carrying `data` (truncated to 75 bytes, the maximum a
    /// single direct push can carry) and a value of zero.
    pub fn op_return(data: &[u8]) -> Self {
        let mut data = data.to_vec();
        data.truncate(75);
        let mut payload = vec![0x6a, data.len() as u8];
        payload.extend(data);
        Self {
            value: 0,
            script_pubkey: ScriptPubkey::from(payload),
        }
    }

    /// `true` if `value` is the real-output-valid range `[0, MAX_MONEY]`. The `-1` sentinel used
    /// internally during sighash construction is intentionally not "valid" by this predicate.
    pub fn value_in_range(&self) -> bool {
        (0..=MAX_MONEY).contains(&self.value)
    }

    /// Inspect this output's `script_pubkey` to determine its shape.
    pub fn standard_type(&self) -> ScriptType {
        self.script_pubkey.standard_type()
    }
}

impl ByteFormat for Output {
    type Error = TxError;

    fn serialized_length(&self) -> usize {
        8 + self.script_pubkey.serialized_length()
    }

    fn read_from<R>(reader: &mut R, _limit: usize) -> Result<Self, Self::Error>
    where
        R: Read,
    {
        let value = Self::read_i64_le(reader)?;
        let script_pubkey = ScriptPubkey::read_from(reader, 0).map_err(TxError::from)?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }

    fn write_to<W>(&self, writer: &mut W) -> Result<usize, Self::Error>
    where
        W: Write,
    {
        let mut written = Self::write_i64_le(writer, self.value)?;
        written += self.script_pubkey.write_to(writer)?;
        Ok(written)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn it_serializes_and_deserializes_outputs() {
        let cases = [
            (Output::new(0, vec![]), "000000000000000000".to_string(), 9usize),
            (Output::excluded(), "ffffffffffffffff00".to_string(), 9usize),
        ];
        for (out, hex, len) in cases.iter() {
            assert_eq!(out.serialized_length(), *len);
            assert_eq!(&out.serialize_hex().unwrap(), hex);
            assert_eq!(&Output::deserialize_hex(hex).unwrap(), out);
        }
    }

    #[test]
    fn it_flags_out_of_range_and_excluded_values() {
        assert!(Output::new(0, vec![]).value_in_range());
        assert!(Output::new(MAX_MONEY, vec![]).value_in_range());
        assert!(!Output::new(MAX_MONEY + 1, vec![]).value_in_range());
        assert!(!Output::excluded().value_in_range());
    }
}
