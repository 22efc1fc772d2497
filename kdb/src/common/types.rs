use crate::errors::KdbResult;
use std::fmt::{Display, Formatter};

/// A key-value pair as it crosses the store boundary.
///
/// Keys and values are opaque byte sequences. A key-only read leaves `value`
/// empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Kv {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Kv {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Kv {
        Kv {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key_only(key: impl Into<Vec<u8>>) -> Kv {
        Kv {
            key: key.into(),
            value: Vec::new(),
        }
    }

    /// Combined length of key and value, used for batch byte budgets.
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

impl Display for Kv {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} bytes)", HexKey(&self.key), self.value.len())
    }
}

/// Renders a key as lowercase hex for logs and messages.
pub struct HexKey<'a>(pub &'a [u8]);

impl Display for HexKey<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Encodes a key the way remote adapters store it: lowercase hex, which
/// preserves both byte order and prefixes.
pub fn encode_key(key: &[u8]) -> String {
    hex::encode(key)
}

pub fn decode_key(encoded: impl AsRef<[u8]>) -> KdbResult<Vec<u8>> {
    Ok(hex::decode(encoded)?)
}

/// Maximum number of items a streaming read yields.
///
/// Any value `<= 0` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Limit(i64);

impl Limit {
    pub const UNBOUNDED: Limit = Limit(0);

    pub fn new(limit: i64) -> Limit {
        Limit(limit)
    }

    pub fn is_bounded(&self) -> bool {
        self.0 > 0
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// True once `count` items satisfy a bounded limit.
    pub fn reached(&self, count: u64) -> bool {
        self.is_bounded() && count >= self.0 as u64
    }
}

impl From<i64> for Limit {
    fn from(value: i64) -> Self {
        Limit(value)
    }
}

impl From<i32> for Limit {
    fn from(value: i32) -> Self {
        Limit(value as i64)
    }
}

impl Display for Limit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_bounded() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "unlimited")
        }
    }
}
