//! Ordered command dictionaries with alias resolution.
//!
//! A [`CommandDictionary`] maps canonical command names (a template's
//! [`default_name`](crate::CommandTemplate::default_name)) to templates,
//! preserving insertion order, plus an alias table resolved transitively.
//! SCPI dictionaries also derive short mnemonic aliases on insertion by
//! deleting the lowercase tails of each keyword (`SENSe:BANDwidth` becomes
//! `SENS:BAND`).
//!
//! # Examples
//!
//! ```
//! use scpi_dictionary_core::{CommandArgs, CommandDictionary};
//!
//! let mut dictionary = CommandDictionary::scpi();
//! dictionary.add_raw("SENSe<cnum>:BANDwidth <num>").unwrap();
//!
//! let template = dictionary.resolve("SENS:BAND").unwrap();
//! assert_eq!(
//!     template.build(&CommandArgs::with(1000)).unwrap(),
//!     "SENSe:BANDwidth 1000"
//! );
//! ```

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use thiserror::Error;

use crate::template::{CommandTemplate, Dialect, TemplateError, scpi_ignore_patterns};

static LOWERCASE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[a-z]+").expect("static regex must compile"));

/// Errors from dictionary construction and lookup.
#[derive(Debug, Error)]
pub enum DictionaryError {
    /// The key matched neither a command name nor an alias.
    #[error("unknown command or alias {key:?}")]
    UnknownCommand { key: String },
    /// Alias resolution revisited a key it had already passed through.
    #[error("alias cycle detected: {}", .chain.join(" -> "))]
    AliasCycle { chain: Vec<String> },
    /// The template's default name is blank, so it cannot be keyed.
    #[error("command pattern {raw:?} produces an empty name")]
    EmptyName { raw: String },
    /// A raw pattern handed to [`CommandDictionary::add_raw`] did not parse.
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Result of a [`CommandDictionary::search`], split by where the needle hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchMatches {
    pub commands: Vec<String>,
    pub aliases: Vec<String>,
}

impl SearchMatches {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.aliases.is_empty()
    }
}

/// An insertion-ordered map of command templates with a transitive alias
/// table.
///
/// Build a dictionary by [`add`](Self::add)-ing templates, then freeze it
/// behind an `Arc` and share it between sessions. Lookups never mutate the
/// dictionary.
#[derive(Debug, Clone, Default)]
pub struct CommandDictionary {
    dialect: Dialect,
    pub(crate) commands: IndexMap<String, CommandTemplate>,
    pub(crate) aliases: IndexMap<String, String>,
}

impl CommandDictionary {
    /// An empty dictionary for the given dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            commands: IndexMap::new(),
            aliases: IndexMap::new(),
        }
    }

    /// An empty SCPI dictionary; insertions derive short aliases.
    pub fn scpi() -> Self {
        Self::new(Dialect::Scpi)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Registers a template under its [`default_name`](CommandTemplate::default_name)
    /// and returns that name.
    ///
    /// Re-adding a name replaces the template but keeps its position. SCPI
    /// dictionaries also register the derived short alias when it differs
    /// from the full name.
    ///
    /// # Errors
    ///
    /// Returns [`DictionaryError::EmptyName`] if the template's default name
    /// is blank.
    pub fn add(&mut self, template: CommandTemplate) -> Result<String, DictionaryError> {
        let name = template.default_name();
        if name.is_empty() {
            return Err(DictionaryError::EmptyName {
                raw: template.raw().to_string(),
            });
        }
        if self.dialect == Dialect::Scpi {
            let short = scpi_short_name(&name);
            if !short.is_empty() && short != name {
                self.aliases.insert(short, name.clone());
            }
        }
        self.commands.insert(name.clone(), template);
        Ok(name)
    }

    /// Parses `raw` with the dictionary's dialect and registers it.
    ///
    /// # Errors
    ///
    /// Propagates template parse errors and [`DictionaryError::EmptyName`].
    pub fn add_raw(&mut self, raw: &str) -> Result<String, DictionaryError> {
        let template = CommandTemplate::parse(raw, self.dialect)?;
        self.add(template)
    }

    /// Registers a template plus an explicit alias for it.
    ///
    /// # Errors
    ///
    /// Same conditions as [`add`](Self::add); the alias is only registered
    /// when the template itself is accepted.
    pub fn add_with_alias(
        &mut self,
        template: CommandTemplate,
        alias: impl Into<String>,
    ) -> Result<String, DictionaryError> {
        let name = self.add(template)?;
        self.aliases.insert(alias.into(), name.clone());
        Ok(name)
    }

    /// Records an alias mapping without checking the target. Dangling or
    /// cyclic entries surface later through [`resolve`](Self::resolve) and
    /// [`validate_dictionary`](crate::validate_dictionary).
    pub fn alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.aliases.insert(alias.into(), target.into());
    }

    /// Follows aliases transitively and returns the template for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DictionaryError::UnknownCommand`] if the chain ends at
    /// nothing, or [`DictionaryError::AliasCycle`] if it loops.
    pub fn resolve(&self, key: &str) -> Result<&CommandTemplate, DictionaryError> {
        self.resolve_entry(key).map(|(_, template)| template)
    }

    /// Like [`resolve`](Self::resolve) but returns the canonical name the
    /// key resolved to.
    pub fn resolve_name(&self, key: &str) -> Result<&str, DictionaryError> {
        self.resolve_entry(key).map(|(name, _)| name)
    }

    fn resolve_entry(&self, key: &str) -> Result<(&str, &CommandTemplate), DictionaryError> {
        let mut current = key;
        let mut visited: Vec<&str> = Vec::new();
        while let Some(target) = self.aliases.get(current) {
            if visited.contains(&current) {
                let mut chain: Vec<String> = visited.iter().map(|k| k.to_string()).collect();
                chain.push(current.to_string());
                return Err(DictionaryError::AliasCycle { chain });
            }
            visited.push(current);
            current = target;
        }
        match self.commands.get_key_value(current) {
            Some((name, template)) => Ok((name.as_str(), template)),
            None => Err(DictionaryError::UnknownCommand {
                key: key.to_string(),
            }),
        }
    }

    /// Direct lookup by canonical name, no alias hops.
    pub fn get(&self, name: &str) -> Option<&CommandTemplate> {
        self.commands.get(name)
    }

    /// True when `key` resolves to a command, through aliases if needed.
    pub fn contains(&self, key: &str) -> bool {
        self.resolve_entry(key).is_ok()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Command entries in insertion order.
    pub fn commands(&self) -> impl Iterator<Item = (&str, &CommandTemplate)> {
        self.commands
            .iter()
            .map(|(name, template)| (name.as_str(), template))
    }

    /// Alias entries in insertion order.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .iter()
            .map(|(alias, target)| (alias.as_str(), target.as_str()))
    }

    /// Substring search over command names and aliases.
    ///
    /// # Examples
    ///
    /// ```
    /// use scpi_dictionary_core::CommandDictionary;
    ///
    /// let mut dictionary = CommandDictionary::scpi();
    /// dictionary.add_raw("FREQuency:STARt <num>").unwrap();
    /// dictionary.add_raw("FREQuency:STOP <num>").unwrap();
    ///
    /// let matches = dictionary.search("star", false);
    /// assert_eq!(matches.commands, vec!["FREQuency:STARt"]);
    /// assert_eq!(matches.aliases, vec!["FREQ:STAR"]);
    /// ```
    pub fn search(&self, needle: &str, case_sensitive: bool) -> SearchMatches {
        let folded = if case_sensitive {
            needle.to_string()
        } else {
            needle.to_lowercase()
        };
        let hit = |haystack: &str| {
            if case_sensitive {
                haystack.contains(&folded)
            } else {
                haystack.to_lowercase().contains(&folded)
            }
        };
        SearchMatches {
            commands: self.commands.keys().filter(|k| hit(k)).cloned().collect(),
            aliases: self.aliases.keys().filter(|k| hit(k)).cloned().collect(),
        }
    }

    /// Returns a new dictionary containing both maps; `overlay` wins on
    /// collisions. The result keeps `self`'s dialect.
    pub fn merged_with(&self, overlay: &CommandDictionary) -> CommandDictionary {
        let mut merged = self.clone();
        for (name, template) in &overlay.commands {
            merged.commands.insert(name.clone(), template.clone());
        }
        for (alias, target) in &overlay.aliases {
            merged.aliases.insert(alias.clone(), target.clone());
        }
        merged
    }
}

/// Derives the SCPI short form of a command name by deleting ignore-pattern
/// matches, lowercase keyword tails, and list separators.
fn scpi_short_name(name: &str) -> String {
    let mut text = name.to_string();
    for pattern in scpi_ignore_patterns() {
        text = pattern.replace_all(&text, "").into_owned();
    }
    text = LOWERCASE_RUN.replace_all(&text, "").into_owned();
    text = text.replace(", ", "");
    text.trim().to_string()
}
