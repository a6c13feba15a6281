//! Dictionary validation.
//!
//! Checks the semantic invariants a dictionary must hold before it is frozen
//! and shared: every alias chain terminates at a real command, no chain
//! loops, names are non-blank, and stored names agree with what their
//! patterns derive. Loading already rejects the hard failures; this pass
//! collects everything at once, which suits linting hand-edited documents.
//!
//! # Examples
//!
//! ```
//! use scpi_dictionary_core::{CommandDictionary, validate_dictionary};
//!
//! let mut dictionary = CommandDictionary::scpi();
//! dictionary.add_raw("FREQuency:STARt <num>").unwrap();
//! assert!(validate_dictionary(&dictionary).is_empty());
//!
//! dictionary.alias("bw", "SENSe:BANDwidth");
//! let issues = validate_dictionary(&dictionary);
//! assert_eq!(issues.len(), 1);
//! ```

use thiserror::Error;

use crate::dictionary::{CommandDictionary, DictionaryError};

/// Structural problems found in a dictionary.
///
/// Each variant describes a specific issue. The `Display` impl provides a
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    /// A command is keyed by an empty name.
    #[error("command name cannot be empty (pattern {raw:?})")]
    EmptyCommandName { raw: String },
    /// A command's key differs from the name its pattern derives.
    #[error("command {stored:?} does not match its derived name {derived:?}")]
    NameDrift { stored: String, derived: String },
    /// An alias is keyed by an empty string.
    #[error("alias name cannot be empty (target {target:?})")]
    EmptyAliasName { target: String },
    /// An alias chain ends at a key that is not a command.
    #[error("alias {alias:?} does not terminate at a command")]
    DanglingAlias { alias: String },
    /// An alias chain loops back on itself.
    #[error("alias cycle detected: {}", .chain.join(" -> "))]
    AliasCycle { chain: Vec<String> },
    /// An alias shares its name with a command; lookups will take the alias.
    #[error("alias {alias:?} shadows a command of the same name")]
    AliasShadowsCommand { alias: String },
}

/// Validates a dictionary, returning every issue found.
///
/// An empty result means the dictionary holds all lookup invariants.
///
/// # Examples
///
/// ```
/// use scpi_dictionary_core::{CommandDictionary, ValidationIssue, validate_dictionary};
///
/// let mut dictionary = CommandDictionary::scpi();
/// dictionary.alias("a", "b");
/// dictionary.alias("b", "a");
///
/// let issues = validate_dictionary(&dictionary);
/// assert!(issues.iter().any(|i| matches!(i, ValidationIssue::AliasCycle { .. })));
/// ```
pub fn validate_dictionary(dictionary: &CommandDictionary) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for (name, template) in dictionary.commands() {
        if name.is_empty() {
            issues.push(ValidationIssue::EmptyCommandName {
                raw: template.raw().to_string(),
            });
            continue;
        }
        let derived = template.default_name();
        if derived != name {
            issues.push(ValidationIssue::NameDrift {
                stored: name.to_string(),
                derived,
            });
        }
    }

    for (alias, target) in dictionary.aliases() {
        if alias.is_empty() {
            issues.push(ValidationIssue::EmptyAliasName {
                target: target.to_string(),
            });
            continue;
        }
        if dictionary.get(alias).is_some() {
            issues.push(ValidationIssue::AliasShadowsCommand {
                alias: alias.to_string(),
            });
        }
        match dictionary.resolve(alias) {
            Ok(_) => {}
            Err(DictionaryError::UnknownCommand { .. }) => {
                issues.push(ValidationIssue::DanglingAlias {
                    alias: alias.to_string(),
                });
            }
            Err(DictionaryError::AliasCycle { chain }) => {
                issues.push(ValidationIssue::AliasCycle { chain });
            }
            Err(_) => {}
        }
    }

    issues
}
