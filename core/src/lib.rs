//! Core command modeling for SCPI-style instruments.
//!
//! This crate defines the foundational types for templated instrument
//! command sets:
//!
//! - [`CommandTemplate`] — a command pattern with `<placeholder>` arguments,
//!   split into required and optional groups, built into wire-ready text.
//! - [`CommandDictionary`] — an insertion-ordered name → template map with a
//!   transitively resolved alias table; the SCPI dialect derives short
//!   mnemonic aliases (`SENSe:BANDwidth` → `SENS:BAND`) on insertion.
//! - [`DictionaryDocument`] — the JSON form of a dictionary, loadable and
//!   savable with full metadata round-tripping.
//!
//! Validation ([`validate_dictionary`]) catches structural problems such as
//! dangling aliases, alias cycles, and drifted command names.
//!
//! # Example
//!
//! ```
//! use scpi_dictionary_core::*;
//!
//! // Model a slice of a VNA command set
//! let mut dictionary = CommandDictionary::scpi();
//! dictionary.add_raw("FREQuency:STARt <num>").unwrap();
//! dictionary.add_raw("SENSe<cnum>:FREQuency:CENTer <num>").unwrap();
//!
//! // Short aliases come for free in the SCPI dialect
//! let template = dictionary.resolve("FREQ:STAR").unwrap();
//! assert_eq!(
//!     template.build(&CommandArgs::with(2.0e9)).unwrap(),
//!     "FREQuency:STARt 2000000000"
//! );
//!
//! // Optional path arguments blank out when omitted
//! let center = dictionary.resolve("SENS:FREQ:CENT").unwrap();
//! assert_eq!(
//!     center.build(&CommandArgs::with(1.0e9)).unwrap(),
//!     "SENSe:FREQuency:CENTer 1000000000"
//! );
//!
//! assert!(validate_dictionary(&dictionary).is_empty());
//! ```

mod dictionary;
mod document;
mod template;
mod validate;

pub use dictionary::{CommandDictionary, DictionaryError, SearchMatches};
pub use document::{
    ArgumentLists, ArgumentRecord, CommandRecord, DictionaryDocument, DocumentError,
};
pub use template::{
    Argument, CommandArgs, CommandTemplate, CommandValue, DEFAULT_ARGUMENT_PATTERN, Dialect,
    ReturnType, TemplateError,
};
pub use validate::{ValidationIssue, validate_dictionary};
