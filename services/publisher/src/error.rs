//! Publisher error taxonomy

use std::io;

use book_types::errors::CodecError;
use thiserror::Error;

/// Errors that end a publishing session
#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to accept subscriber: {0}")]
    Accept(#[source] io::Error),

    #[error("Write to subscriber failed: {0}")]
    Write(#[source] io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}
