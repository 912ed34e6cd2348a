//! Block tags for JSON-RPC block parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParseBlockTagError;

/// Which chain state a request is evaluated against.
///
/// An absent block parameter is represented as `Option::<BlockTag>::None`
/// and is treated as [`BlockTag::Latest`] by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlockTag {
    /// A concrete block number.
    Number(u64),
    /// The chain head. Rewritten to a concrete number before caching.
    #[default]
    Latest,
    /// The genesis block. `"0x00"` is a synonym.
    Earliest,
    /// Not-yet-mined state. Never cached.
    Pending,
}

impl BlockTag {
    /// Get the string representation for RPC.
    pub fn as_rpc_string(&self) -> String {
        match self {
            BlockTag::Number(n) => to_hex_quantity(*n),
            BlockTag::Latest => "latest".to_string(),
            BlockTag::Earliest => "earliest".to_string(),
            BlockTag::Pending => "pending".to_string(),
        }
    }

    /// Interpret a raw JSON-RPC parameter as a block tag.
    ///
    /// `null` is an absent parameter and yields `Ok(None)`.
    pub fn from_param(value: &serde_json::Value) -> Result<Option<Self>, ParseBlockTagError> {
        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(s) => s.parse().map(Some),
            other => Err(ParseBlockTagError::NotAString(other.to_string())),
        }
    }

    /// Returns true for a concrete block number.
    pub fn is_number(&self) -> bool {
        matches!(self, BlockTag::Number(_))
    }

    /// Convert to a JSON-RPC parameter.
    pub fn to_param(&self) -> serde_json::Value {
        serde_json::Value::String(self.as_rpc_string())
    }
}

impl FromStr for BlockTag {
    type Err = ParseBlockTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(BlockTag::Latest),
            "earliest" => Ok(BlockTag::Earliest),
            "pending" => Ok(BlockTag::Pending),
            other => parse_hex_quantity(other)
                .map(BlockTag::Number)
                .ok_or_else(|| ParseBlockTagError::InvalidTag(other.to_string())),
        }
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_rpc_string())
    }
}

impl From<u64> for BlockTag {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}

impl Serialize for BlockTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_rpc_string())
    }
}

impl<'de> Deserialize<'de> for BlockTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Hex quantities
// ============================================================================

/// Parse a `0x`-prefixed hex quantity such as `"0x1a"`.
///
/// Leading zeros are accepted (`"0x00"` parses to zero).
pub fn parse_hex_quantity(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Format a number as a `0x`-prefixed hex quantity.
pub fn to_hex_quantity(n: u64) -> String {
    format!("0x{:x}", n)
}
