//! Error types for transports and device sessions.
//!
//! [`TransportError`] covers the I/O layer; [`SessionError`] adds the
//! session-level failure modes (state, lookup, formatting) and carries the
//! attempted command text wherever one exists.

use thiserror::Error;

use scpi_dictionary_core::{DictionaryError, TemplateError};

/// Errors raised by concrete transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket or stream I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The address did not resolve to any endpoint.
    #[error("could not resolve address {0:?}")]
    BadAddress(String),
    /// An I/O operation was attempted before the transport was opened.
    #[error("transport is not connected")]
    NotConnected,
    /// A text reply contained invalid UTF-8.
    #[error("reply was not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    /// A binary block header or payload was malformed.
    #[error("malformed binary block: {0}")]
    BadBlock(String),
    /// The transport does not implement this capability.
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),
}

/// Errors raised by device sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Opening the transport failed; the session stays disconnected.
    #[error("connecting to {address:?} failed: {source}")]
    Connection {
        address: String,
        source: TransportError,
    },
    /// An operation that needs a live connection ran while disconnected.
    #[error("device is not connected ({operation} attempted)")]
    NotConnected { operation: &'static str },
    /// The transport failed while exchanging a specific command.
    #[error("command {command:?} failed: {source}")]
    Command {
        command: String,
        source: TransportError,
    },
    /// Transport failure outside a command exchange (bare reads, timeouts).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The key resolved against neither the dictionary nor its aliases.
    #[error(transparent)]
    Lookup(#[from] DictionaryError),
    /// Argument substitution failed while building the command text.
    #[error(transparent)]
    Format(#[from] TemplateError),
}

/// Convenience alias for results with [`SessionError`].
pub type Result<T> = std::result::Result<T, SessionError>;
