use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, de};

/// Correlates a control response to the request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReqId(
    /// Numeric JSON-RPC request identifier.
    pub u64,
);

/// Identifies the exec channel assigned by the remote service.
///
/// The service may send the id either as a JSON number or as a decimal string,
/// so both forms are accepted when decoding. Either form must hold an integer
/// in `0..=u64::MAX`: larger values, negatives and fractional numbers such as
/// `42.0` are rejected, which fails the create handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ChannelId(
    /// Numeric exec channel identifier.
    pub u64,
);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Number(u64),
            Text(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Number(value) => Ok(Self(value)),
            Wire::Text(value) => value.trim().parse().map(Self).map_err(|_| {
                de::Error::custom(format!("channel id is not a decimal number: {value:?}"))
            }),
        }
    }
}
