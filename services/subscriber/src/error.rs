//! Subscriber error taxonomy
//!
//! Only transport failures end a session. Malformed frames and apply-path
//! anomalies are counted or ignored, never surfaced here.

use std::io;

use thiserror::Error;

/// Errors that end a subscriber session
#[derive(Error, Debug)]
pub enum SubscriberError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Read from publisher failed: {0}")]
    Read(#[source] io::Error),

    #[error("Reconstruction task failed: {0}")]
    EngineTask(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_error_display() {
        let err = SubscriberError::Connect {
            addr: "127.0.0.1:8080".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.to_string(), "Failed to connect to 127.0.0.1:8080: refused");
    }

    #[test]
    fn test_read_error_keeps_source() {
        use std::error::Error as _;

        let err = SubscriberError::Read(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(err.source().is_some());
    }
}
