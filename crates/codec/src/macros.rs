//! Macros for cutting boilerplate when wiring up new wire-format newtypes.

/// Implement `serde::Serialize`/`Deserialize` for a `ByteFormat` type by passing through hex.
#[macro_export]
macro_rules! impl_hex_serde {
    ($item:ty) => {
        impl serde::Serialize for $item {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                let s = $crate::ser::ByteFormat::serialize_hex(self)
                    .map_err(serde::ser::Error::custom)?;
                serializer.serialize_str(&s)
            }
        }

        impl<'de> serde::Deserialize<'de> for $item {
            fn deserialize<D>(deserializer: D) -> Result<$item, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s: &str = serde::Deserialize::deserialize(deserializer)?;
                <$item as $crate::ser::ByteFormat>::deserialize_hex(s)
                    .map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Wrap a length-prefixed vector of bytes in a newtype, with convenience accessors and a
/// `ByteFormat` impl derived from the wire format `varint(len) || bytes[len]`. Used for opaque
/// scripts and witness-stack items, which this crate never interprets structurally.
#[macro_export]
macro_rules! wrap_prefixed_byte_vector {
    (
        $(#[$outer:meta])*
        $wrapper_name:ident
    ) => {
        $(#[$outer])*
        #[derive(Clone, Debug, Eq, PartialEq, Default, Hash, PartialOrd, Ord)]
        pub struct $wrapper_name(Vec<u8>);

        impl $crate::ser::ByteFormat for $wrapper_name {
            type Error = $crate::ser::SerError;

            fn serialized_length(&self) -> usize {
                self.len() + self.len_prefix() as usize
            }

            fn read_from<R>(reader: &mut R, _limit: usize) -> Result<Self, Self::Error>
            where
                R: std::io::Read,
            {
                Ok(Self(Self::read_prefix_bytes(reader)?))
            }

            fn write_to<W>(&self, writer: &mut W) -> Result<usize, Self::Error>
            where
                W: std::io::Write,
            {
                Self::write_prefix_bytes(writer, &self.0)
            }
        }

        $crate::impl_hex_serde!($wrapper_name);

        impl std::convert::AsRef<[u8]> for $wrapper_name {
            fn as_ref(&self) -> &[u8] {
                &self.0[..]
            }
        }

        impl $wrapper_name {
            /// Instantiate a new wrapped vector.
            pub fn new(v: Vec<u8>) -> Self {
                Self(v)
            }

            /// Construct an empty wrapped vector.
            pub fn null() -> Self {
                Self(vec![])
            }

            /// Return a reference to the underlying bytes.
            pub fn items(&self) -> &[u8] {
                &self.0
            }

            /// Return the length of the underlying bytes.
            pub fn len(&self) -> usize {
                self.0.len()
            }

            /// Return true if there are no underlying bytes.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Determine the byte-length of the VarInt length prefix.
            pub fn len_prefix(&self) -> u8 {
                $crate::ser::prefix_byte_len(self.len() as u64)
            }
        }

        impl From<&[u8]> for $wrapper_name {
            fn from(v: &[u8]) -> Self {
                Self(v.to_vec())
            }
        }

        impl From<Vec<u8>> for $wrapper_name {
            fn from(v: Vec<u8>) -> Self {
                Self(v)
            }
        }

        impl std::ops::Index<std::ops::Range<usize>> for $wrapper_name {
            type Output = [u8];

            fn index(&self, range: std::ops::Range<usize>) -> &[u8] {
                &self.0[range]
            }
        }

        impl std::ops::Index<std::ops::RangeFrom<usize>> for $wrapper_name {
            type Output = [u8];

            fn index(&self, range: std::ops::RangeFrom<usize>) -> &[u8] {
                &self.0[range]
            }
        }
    };
}

/// Implement infallible conversion between two script-like newtypes by passing through
/// `as_ref().into()`. Used to move the same bytes between, e.g., `Script` and `ScriptSig`
/// without re-validating shape (these types are opaque byte containers).
#[macro_export]
macro_rules! impl_script_conversion {
    ($t1:ty, $t2:ty) => {
        impl From<&$t2> for $t1 {
            fn from(t: &$t2) -> $t1 {
                t.as_ref().into()
            }
        }
        impl From<&$t1> for $t2 {
            fn from(t: &$t1) -> $t2 {
                t.as_ref().into()
            }
        }
    };
}

/// Define a new marked `Hash256Digest` newtype (e.g. a txid or a block hash), with the
/// `MarkedDigest`/`ByteFormat` plumbing and BE-hex convenience methods that come with it.
#[macro_export]
macro_rules! mark_hash256 {
    (
        $(#[$outer:meta])*
        $hash_name:ident
    ) => {
        $(#[$outer])*
        #[derive(
            Hash, serde::Serialize, serde::Deserialize, Copy, Clone, Default, Debug, Eq, PartialEq, PartialOrd, Ord,
        )]
        pub struct $hash_name(pub $crate::hashes::Hash256Digest);

        impl $hash_name {
            /// Parse a display-order (byte-reversed) hex string, as shown by block explorers.
            pub fn from_be_hex(be: &str) -> $crate::ser::SerResult<Self> {
                Ok(Self($crate::hashes::Hash256Digest::from_be_hex(be)?))
            }

            /// Render as display-order (byte-reversed) hex, as shown by block explorers.
            pub fn to_be_hex(&self) -> String {
                self.0.to_be_hex()
            }
        }

        impl From<[u8; 32]> for $hash_name {
            fn from(bytes: [u8; 32]) -> Self {
                Self($crate::hashes::Hash256Digest::new(bytes))
            }
        }

        impl AsRef<[u8]> for $hash_name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_ref()
            }
        }

        impl $crate::ser::ByteFormat for $hash_name {
            type Error = $crate::ser::SerError;

            fn serialized_length(&self) -> usize {
                32
            }

            fn read_from<R>(reader: &mut R, _limit: usize) -> $crate::ser::SerResult<Self>
            where
                R: std::io::Read,
            {
                Ok(Self($crate::hashes::Hash256Digest::read_from(reader, 0)?))
            }

            fn write_to<W>(&self, writer: &mut W) -> $crate::ser::SerResult<usize>
            where
                W: std::io::Write,
            {
                self.0.write_to(writer)
            }
        }

        impl $crate::hashes::MarkedDigest for $hash_name {
            type Digest = $crate::hashes::Hash256Digest;

            fn new(digest: $crate::hashes::Hash256Digest) -> Self {
                Self(digest)
            }

            fn internal(&self) -> $crate::hashes::Hash256Digest {
                self.0
            }

            fn bytes(&self) -> Vec<u8> {
                self.0.as_ref().to_vec()
            }
        }

        impl From<$crate::hashes::Hash256Digest> for $hash_name {
            fn from(h: $crate::hashes::Hash256Digest) -> Self {
                Self::new(h)
            }
        }
    };
}
