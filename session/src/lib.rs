//! Device sessions for SCPI-style instruments.
//!
//! This crate layers a stateful, synchronous session API on top of the
//! command dictionaries from `scpi-dictionary-core`:
//!
//! - [`Transport`] is the capability a session drives: text read/write,
//!   binary blocks, and a mutable timeout. [`TcpTransport`] implements it
//!   for raw socket instruments; tests inject their own.
//! - [`DeviceSession`] resolves keys through a shared dictionary, renders
//!   command text, and exchanges it over its transport, tracking
//!   connection state and a last-known settings snapshot.
//! - [`ScpiSession`] adds the SCPI conventions: bare queries get a `?`
//!   appended and writes block on a completion query (`*OPC?`).
//! - [`Reply`] is the cast policy for replies: single number, then
//!   numeric list, then trimmed text. Casting never fails.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use scpi_dictionary_core::{CommandDictionary, CommandTemplate, Dialect};
//! use scpi_dictionary_session::{ScpiSession, TcpConfig, TcpTransport};
//!
//! let mut dictionary = CommandDictionary::scpi();
//! dictionary.add(CommandTemplate::parse(
//!     "SENSe<cnum>:FREQuency:CENTer <num>",
//!     Dialect::Scpi,
//! )?)?;
//!
//! let session = ScpiSession::new(
//!     TcpTransport::new(TcpConfig::default()),
//!     Arc::new(dictionary),
//! );
//! // nothing is sent until connect(); resolution works offline
//! assert!(!session.is_connected());
//! assert!(session.dictionary().contains("SENS:FREQ:CENT"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod reply;
mod scpi;
mod session;
mod tcp;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, SessionError, TransportError};
pub use reply::Reply;
pub use scpi::{OPC_QUERY, ScpiSession};
pub use session::DeviceSession;
pub use tcp::{TcpConfig, TcpTransport};
pub use transport::{BinaryDatatype, BinaryFormat, ByteOrder, Transport};
