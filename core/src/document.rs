//! JSON persistence for command dictionaries.
//!
//! A [`DictionaryDocument`] is the on-disk form of a
//! [`CommandDictionary`]: a top-level object with an `aliases` map and a
//! `commands` map, both insertion-ordered. Each command record stores the
//! raw pattern together with per-argument metadata:
//!
//! ```json
//! {
//!   "aliases": { "FREQ:STAR": "FREQuency:STARt" },
//!   "commands": {
//!     "FREQuency:STARt": {
//!       "type": "SCPI",
//!       "command_raw": "FREQuency:STARt <num>",
//!       "description": "Sweep start frequency",
//!       "arguments": {
//!         "required": [
//!           {
//!             "description": null,
//!             "default": "",
//!             "return_type": "number",
//!             "arg_string": "<num>"
//!           }
//!         ],
//!         "optional": []
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Loading re-parses every `command_raw` and overlays the stored metadata,
//! so behavior always derives from the pattern. The stored argument lists
//! must agree with what the pattern produces; aliases load verbatim and are
//! checked for cycles and dangling targets.

use std::io::{BufReader, BufWriter};
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dictionary::{CommandDictionary, DictionaryError};
use crate::template::{Argument, CommandTemplate, Dialect, ReturnType, TemplateError};

/// Errors from reading and writing dictionary documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A stored pattern failed to re-parse.
    #[error("command {name:?}: {source}")]
    Command {
        name: String,
        source: TemplateError,
    },
    /// Stored argument lists disagree with what the pattern produces.
    #[error(
        "command {name:?}: stored {group} arguments {found:?} do not match pattern tokens {expected:?}"
    )]
    ArgumentMismatch {
        name: String,
        group: &'static str,
        expected: Vec<String>,
        found: Vec<String>,
    },
    /// An alias chain ends at a key that is not a command.
    #[error("alias {alias:?} does not terminate at a command")]
    DanglingAlias { alias: String },
    /// Alias chain validation failed (cycles).
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
}

/// Per-argument metadata as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgumentRecord {
    pub description: Option<String>,
    #[serde(default)]
    pub default: String,
    pub return_type: Option<ReturnType>,
    /// The literal placeholder text, e.g. `"<num>"`.
    pub arg_string: String,
}

/// Required and optional argument records, in slot order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgumentLists {
    #[serde(default)]
    pub required: Vec<ArgumentRecord>,
    #[serde(default)]
    pub optional: Vec<ArgumentRecord>,
}

/// One command entry in a dictionary document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    #[serde(rename = "type")]
    pub dialect: Dialect,
    pub command_raw: String,
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: ArgumentLists,
}

impl CommandRecord {
    /// Snapshot of a template in document form.
    pub fn from_template(template: &CommandTemplate) -> Self {
        let record_of = |argument: &Argument| ArgumentRecord {
            description: argument.description().map(str::to_string),
            default: argument.default_value().to_string(),
            return_type: argument.return_type(),
            arg_string: argument.token().to_string(),
        };
        Self {
            dialect: template.dialect(),
            command_raw: template.raw().to_string(),
            description: template.description().map(str::to_string),
            arguments: ArgumentLists {
                required: template.required().iter().map(record_of).collect(),
                optional: template.optional().iter().map(record_of).collect(),
            },
        }
    }

    /// Rebuilds the template: re-parses `command_raw`, checks the stored
    /// argument lists against the parsed ones, then overlays metadata.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Command`] if the pattern does not parse and
    /// [`DocumentError::ArgumentMismatch`] if the stored `arg_string` lists
    /// differ from the pattern's tokens.
    pub fn into_template(self, name: &str) -> Result<CommandTemplate, DocumentError> {
        let mut template = CommandTemplate::parse(&self.command_raw, self.dialect).map_err(
            |source| DocumentError::Command {
                name: name.to_string(),
                source,
            },
        )?;
        if let Some(description) = self.description {
            template = template.with_description(description);
        }
        overlay_arguments(&mut template, name, "required", self.arguments.required, true)?;
        overlay_arguments(&mut template, name, "optional", self.arguments.optional, false)?;
        Ok(template)
    }
}

fn overlay_arguments(
    template: &mut CommandTemplate,
    name: &str,
    group: &'static str,
    records: Vec<ArgumentRecord>,
    required: bool,
) -> Result<(), DocumentError> {
    let parsed = if required {
        template.required()
    } else {
        template.optional()
    };
    let expected: Vec<String> = parsed.iter().map(|a| a.token().to_string()).collect();
    let found: Vec<String> = records.iter().map(|r| r.arg_string.clone()).collect();
    if expected != found {
        return Err(DocumentError::ArgumentMismatch {
            name: name.to_string(),
            group,
            expected,
            found,
        });
    }
    let arguments = if required {
        template.required_mut()
    } else {
        template.optional_mut()
    };
    for (argument, record) in arguments.iter_mut().zip(records) {
        argument.description = record.description;
        argument.default = record.default;
        argument.return_type = record.return_type;
    }
    Ok(())
}

/// The serialized form of a dictionary: `aliases` first, then `commands`,
/// both preserving their order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DictionaryDocument {
    #[serde(default)]
    pub aliases: IndexMap<String, String>,
    #[serde(default)]
    pub commands: IndexMap<String, CommandRecord>,
}

impl CommandDictionary {
    /// Snapshot of the dictionary in document form.
    pub fn to_document(&self) -> DictionaryDocument {
        DictionaryDocument {
            aliases: self
                .aliases()
                .map(|(alias, target)| (alias.to_string(), target.to_string()))
                .collect(),
            commands: self
                .commands()
                .map(|(name, template)| (name.to_string(), CommandRecord::from_template(template)))
                .collect(),
        }
    }

    /// Rebuilds a dictionary from its document form.
    ///
    /// Commands are rehydrated under their stored names, in document order.
    /// The dictionary dialect is SCPI when every record is SCPI, generic
    /// otherwise; loading never rewrites names or derives new aliases.
    ///
    /// # Errors
    ///
    /// Propagates per-command rehydration failures and rejects alias tables
    /// with cycles ([`DictionaryError::AliasCycle`]) or chains that end at
    /// nothing ([`DocumentError::DanglingAlias`]).
    pub fn from_document(document: DictionaryDocument) -> Result<Self, DocumentError> {
        let dialect = if !document.commands.is_empty()
            && document
                .commands
                .values()
                .all(|record| record.dialect == Dialect::Scpi)
        {
            Dialect::Scpi
        } else {
            Dialect::Generic
        };

        let mut dictionary = CommandDictionary::new(dialect);
        for (name, record) in document.commands {
            let template = record.into_template(&name)?;
            dictionary.commands.insert(name, template);
        }
        dictionary.aliases = document.aliases;

        for alias in dictionary.aliases.keys() {
            match dictionary.resolve(alias) {
                Ok(_) => {}
                Err(DictionaryError::UnknownCommand { .. }) => {
                    return Err(DocumentError::DanglingAlias {
                        alias: alias.clone(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(dictionary)
    }

    /// Writes the dictionary as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Io`] or [`DocumentError::Json`] on failure.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.to_document())?;
        Ok(())
    }

    /// Reads a dictionary from a JSON document on disk.
    ///
    /// # Errors
    ///
    /// Same conditions as [`from_document`](Self::from_document), plus I/O
    /// and JSON errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let document: DictionaryDocument = serde_json::from_reader(reader)?;
        Self::from_document(document)
    }
}
