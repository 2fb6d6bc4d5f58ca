use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::{Number, Value};

// MARK: - GatewayId

/// Identifier assigned by the gateway: session, handle, feed, or private id.
///
/// The gateway transmits identifiers as decimal numbers (sometimes quoted as
/// strings) of arbitrary magnitude; deployments exist whose ids exceed 64
/// bits, so the value is kept in its JSON number form rather than a
/// fixed-width integer. Equality and hashing are by value, never identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatewayId(Number);

impl GatewayId {
    /// The zero id: "unassigned" for sessions, "self" for feeds.
    pub fn zero() -> Self {
        Self(Number::from(0u64))
    }

    pub fn is_zero(&self) -> bool {
        self.0.as_u64() == Some(0)
    }

    /// Parses a decimal string as transmitted by the gateway.
    pub fn parse(s: &str) -> Option<Self> {
        Number::from_str(s).ok().map(Self)
    }

    /// Reads an id out of a JSON value that may be a number or a quoted
    /// decimal string. Anything else yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self(n.clone())),
            Value::String(s) => Self::parse(s),
            _ => None,
        }
    }
}

impl From<u64> for GatewayId {
    fn from(n: u64) -> Self {
        Self(Number::from(n))
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for GatewayId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GatewayId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => Ok(Self(n)),
            Value::String(s) => Number::from_str(&s)
                .map(Self)
                .map_err(|_| de::Error::custom(format!("invalid gateway id string: {s:?}"))),
            other => Err(de::Error::custom(format!(
                "expected a gateway id number or string, got {other}"
            ))),
        }
    }
}
