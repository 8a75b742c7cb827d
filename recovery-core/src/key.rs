//! Keys, timestamps, and the two key sentinels (spec.md §3 "Key (`KeyId`)").

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Width, in bytes, of a [`KeyId`]. Elliptics-style consistent-hash stores
/// conventionally use a 64-byte (512-bit) digest as the key.
pub const KEY_WIDTH: usize = 64;

/// An opaque, fixed-width key identifier. Ordered lexicographically by its
/// raw bytes, which is also the ring ordering used for hash ranges.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId([u8; KEY_WIDTH]);

/// The smallest possible key: `0x00...00`.
pub const ID_MIN: KeyId = KeyId([0u8; KEY_WIDTH]);

/// The largest possible key: `0xFF...FF`.
pub const ID_MAX: KeyId = KeyId([0xFFu8; KEY_WIDTH]);

impl KeyId {
    /// Build a `KeyId` from its raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_WIDTH]) -> Self {
        KeyId(bytes)
    }

    /// The raw bytes backing this key.
    pub const fn as_bytes(&self) -> &[u8; KEY_WIDTH] {
        &self.0
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({self})")
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Error returned when parsing a [`KeyId`] from its canonical hex string
/// fails: wrong length, or non-hex characters.
#[derive(Debug, thiserror::Error)]
pub enum KeyIdParseError {
    /// The string wasn't exactly `2 * KEY_WIDTH` hex characters long.
    #[error("expected {} hex chars, got {0}", 2 * KEY_WIDTH)]
    WrongLength(usize),
    /// The string contained non-hex-digit characters.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl FromStr for KeyId {
    type Err = KeyIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != KEY_WIDTH * 2 {
            return Err(KeyIdParseError::WrongLength(s.len()));
        }
        let mut bytes = [0u8; KEY_WIDTH];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(KeyId(bytes))
    }
}

impl Serialize for KeyId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct KeyIdVisitor;

        impl Visitor<'_> for KeyIdVisitor {
            type Value = KeyId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a {}-character hex string", 2 * KEY_WIDTH)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<KeyId, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(KeyIdVisitor)
    }
}

/// A monotonic timestamp, in milliseconds since the Unix epoch. Kept as a
/// plain integer (rather than pulling in a datetime crate) since the only
/// operations the core performs on it are comparison and arithmetic-free
/// propagation between storage responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The timestamp floor below which the iterator won't even enumerate a
    /// key (spec.md §3 `Ctx::timestamp_floor`, §4.2).
    pub const MIN: Timestamp = Timestamp(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_order() {
        assert!(ID_MIN < ID_MAX);
    }

    #[test]
    fn roundtrips_through_hex() {
        let k = KeyId::from_bytes([7u8; KEY_WIDTH]);
        let s = k.to_string();
        let parsed: KeyId = s.parse().unwrap();
        assert_eq!(k, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            "abcd".parse::<KeyId>(),
            Err(KeyIdParseError::WrongLength(4))
        ));
    }

    #[test]
    fn lexicographic_ordering_matches_bytes() {
        let a = KeyId::from_bytes({
            let mut b = [0u8; KEY_WIDTH];
            b[0] = 1;
            b
        });
        let b = KeyId::from_bytes({
            let mut b = [0u8; KEY_WIDTH];
            b[0] = 2;
            b
        });
        assert!(a < b);
    }

    #[test]
    fn serde_roundtrip() {
        let k = KeyId::from_bytes([0xABu8; KEY_WIDTH]);
        let json = serde_json::to_string(&k).unwrap();
        let back: KeyId = serde_json::from_str(&json).unwrap();
        assert_eq!(k, back);
    }
}
