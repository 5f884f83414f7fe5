use thiserror::Error;

use crate::serialization::Format;

/// Errors shared by every KubeSight crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    /// A value could not be written in the requested wire format.
    #[error("Failed to encode {format:?}: {message}")]
    Encode { format: Format, message: String },

    /// A payload could not be read back.
    #[error("Failed to decode {format:?} payload ({len} bytes): {message}")]
    Decode {
        format: Format,
        len: usize,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn encode(format: Format, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            format,
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(format: Format, len: usize, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            format,
            len,
            message: err.to_string(),
        }
    }

    /// True for codec failures, i.e. a bad payload rather than a bad setup.
    pub fn is_codec(&self) -> bool {
        matches!(self, Self::Encode { .. } | Self::Decode { .. })
    }
}

/// Result type alias using KubeSight's Error.
pub type Result<T> = std::result::Result<T, Error>;
