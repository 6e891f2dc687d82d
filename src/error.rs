// src/error.rs
//
// Error types shared by discovery, sessions and the poll driver.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse failure category handed to consumers alongside a detail string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DiscoveryUnavailable,
    OpenFailure,
    ConfigurationFailure,
    ReadFailure,
    SessionClosed,
}

#[derive(Debug, Error)]
pub enum SerialError {
    /// Device namespace could not be listed. Discovery degrades this to an
    /// empty port list; it is only surfaced by the enumerators themselves.
    #[error("Device namespace {} unavailable: {source}", path.display())]
    DiscoveryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    /// Line settings could not be read or written after a successful open.
    /// The handle has already been released when this is returned.
    #[error("Failed to configure {path}: {source}")]
    Configuration {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Read error on {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Session on {path} is closed")]
    SessionClosed { path: String },
}

impl SerialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SerialError::DiscoveryUnavailable { .. } => ErrorKind::DiscoveryUnavailable,
            SerialError::Open { .. } => ErrorKind::OpenFailure,
            SerialError::Configuration { .. } => ErrorKind::ConfigurationFailure,
            SerialError::Read { .. } => ErrorKind::ReadFailure,
            SerialError::SessionClosed { .. } => ErrorKind::SessionClosed,
        }
    }
}

pub type Result<T> = std::result::Result<T, SerialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = SerialError::Open {
            path: "/dev/ttyUSB0".to_string(),
            source: serialport::Error::new(serialport::ErrorKind::NoDevice, "gone"),
        };
        assert_eq!(err.kind(), ErrorKind::OpenFailure);

        let err = SerialError::SessionClosed {
            path: "/dev/ttyUSB0".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::SessionClosed);
        assert_eq!(err.to_string(), "Session on /dev/ttyUSB0 is closed");
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ConfigurationFailure).unwrap();
        assert_eq!(json, "\"configuration_failure\"");
    }
}
