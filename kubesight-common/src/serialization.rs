//! Wire formats for exported points.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Payload encoding used by the Zenoh sink and `--once` output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// One JSON object per point.
    #[default]
    Json,

    /// CBOR, roughly half the size of JSON for tag-heavy points.
    Cbor,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Cbor => "cbor",
        }
    }

    /// Guess the format of a received payload. JSON points always start with
    /// `{` or `[`, which are never the first byte of a CBOR map or array.
    pub fn sniff(data: &[u8]) -> Format {
        match data.first() {
            Some(b'{' | b'[') => Format::Json,
            _ => Format::Cbor,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "cbor" => Ok(Format::Cbor),
            other => Err(Error::Config(format!(
                "Unknown format '{}', expected 'json' or 'cbor'",
                other
            ))),
        }
    }
}

/// Serialize `value` in the given format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(|e| Error::encode(format, e)),
        Format::Cbor => {
            let mut buf = Vec::with_capacity(128);
            ciborium::into_writer(value, &mut buf).map_err(|e| Error::encode(format, e))?;
            Ok(buf)
        }
    }
}

/// Deserialize a payload written by [`encode`].
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(|e| Error::decode(format, data.len(), e)),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::decode(format, data.len(), e)),
    }
}

/// Deserialize a payload of unknown format. See [`Format::sniff`].
pub fn decode_auto<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    if data.is_empty() {
        return Err(Error::decode(Format::Cbor, 0, "empty payload"));
    }
    decode(data, Format::sniff(data))
}
