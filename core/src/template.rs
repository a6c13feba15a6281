//! Command templates with placeholder arguments.
//!
//! A [`CommandTemplate`] is parsed from an instrument command pattern such as
//! `SENSe<cnum>:FREQuency:CENTer <num>`. Placeholder tokens are extracted with
//! a configurable regex (by default anything between `<` and `>`) and split
//! into two ordered groups:
//!
//! - **optional** arguments — tokens embedded in the command path, before the
//!   first whitespace (`<cnum>` above). These blank out cleanly when omitted.
//! - **required** arguments — tokens in the parameter section, after the first
//!   whitespace (`<num>` above).
//!
//! [`CommandTemplate::build`] substitutes caller-supplied values into the
//! pattern, starting from a fresh default map on every call. The SCPI dialect
//! additionally strips `[...]` optional groups and `|alternation` branches
//! from the rendered text and tidies query/setter punctuation.
//!
//! # Examples
//!
//! ```
//! use scpi_dictionary_core::{CommandArgs, CommandTemplate, Dialect};
//!
//! let template =
//!     CommandTemplate::parse("SENSe<cnum>:FREQuency:CENTer <num>", Dialect::Scpi).unwrap();
//!
//! assert_eq!(template.default_name(), "SENSe:FREQuency:CENTer");
//!
//! let command = template
//!     .build(&CommandArgs::new().set("cnum", 2).set("num", 1.0e9))
//!     .unwrap();
//! assert_eq!(command, "SENSe2:FREQuency:CENTer 1000000000");
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default placeholder pattern: any run of text between `<` and `>`.
pub const DEFAULT_ARGUMENT_PATTERN: &str = "<[^<>]*>";

/// Marker used internally to carry slot positions through ignore-pattern
/// stripping. Instrument command text never contains control characters.
const SLOT_MARK: char = '\u{1}';

static SCPI_IGNORE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // [:STATe] style optional keyword groups
        Regex::new(r"\[[^\[\]]*\]").expect("static regex must compile"),
        // |EXTernal style alternation branches
        Regex::new(r"\|\w+").expect("static regex must compile"),
    ]
});

/// Returns the ignore patterns applied when rendering SCPI templates.
pub(crate) fn scpi_ignore_patterns() -> &'static [Regex] {
    SCPI_IGNORE.as_slice()
}

/// Errors from template parsing and argument substitution.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The custom placeholder regex did not compile.
    #[error("invalid argument pattern {pattern:?}: {source}")]
    BadPattern {
        pattern: String,
        source: regex::Error,
    },
    /// One placeholder token is a substring of another, which would make
    /// plain-text substitution ambiguous.
    #[error("token {token:?} is a substring of {conflict:?} in {raw:?}")]
    AmbiguousToken {
        token: String,
        conflict: String,
        raw: String,
    },
    /// A named argument does not exist on the template.
    #[error("unknown argument {name:?} for command {raw:?}")]
    UnknownArgument { name: String, raw: String },
    /// More positional values were supplied than the template has slots.
    #[error("too many arguments for {raw:?}: got {given}, template takes {accepted}")]
    TooManyArguments {
        raw: String,
        given: usize,
        accepted: usize,
    },
}

/// Command dialect, controlling how templates render and how dictionaries
/// derive aliases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// Plain text substitution, no rewriting of the rendered command.
    #[default]
    #[serde(rename = "generic")]
    Generic,
    /// SCPI conventions: `[...]` optional groups and `|alternation` branches
    /// are stripped, query/setter punctuation is tidied, and dictionaries
    /// derive short mnemonic aliases.
    #[serde(rename = "SCPI")]
    Scpi,
}

impl Dialect {
    pub(crate) fn ignore_patterns(&self) -> &'static [Regex] {
        match self {
            Dialect::Generic => &[],
            Dialect::Scpi => scpi_ignore_patterns(),
        }
    }

    /// Dialect-specific cleanup of a freshly built command.
    fn polish(&self, mut text: String, args: &CommandArgs) -> String {
        match self {
            Dialect::Generic => text,
            Dialect::Scpi => {
                // "FREQ:STARt ?" reads as a query; pull the marker onto the stem
                if args.leads_with_query_marker() {
                    if let Some(head) = text.strip_suffix('?') {
                        let stem = head.trim_end_matches(' ');
                        if stem.len() != head.len() {
                            text = format!("{stem}?");
                        }
                    }
                }
                // blanked list arguments leave dangling separators behind
                let keep = text.trim_end_matches([',', ' ']).len();
                text.truncate(keep);
                text
            }
        }
    }
}

/// Declared reply shape for a query command. Advisory metadata carried by
/// dictionary documents; reply casting itself is automatic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    Number,
    NumberArray,
    Text,
}

/// One placeholder argument extracted from a command pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub(crate) name: String,
    pub(crate) token: String,
    pub(crate) default: String,
    pub(crate) description: Option<String>,
    pub(crate) return_type: Option<ReturnType>,
}

impl Argument {
    fn from_token(token: &str) -> Self {
        let name = token
            .strip_prefix('<')
            .and_then(|inner| inner.strip_suffix('>'))
            .unwrap_or(token)
            .to_string();
        Self {
            name,
            token: token.to_string(),
            default: String::new(),
            description: None,
            return_type: None,
        }
    }

    /// Argument name, the token text minus its angle brackets.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Literal placeholder text as it appears in the raw pattern.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value substituted when the caller does not supply one. Blank unless
    /// set via [`CommandTemplate::set_default`] or a loaded document.
    pub fn default_value(&self) -> &str {
        &self.default
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn return_type(&self) -> Option<ReturnType> {
        self.return_type
    }
}

/// A value substituted into a template slot.
///
/// Booleans render as `1`/`0` to match instrument conventions; everything
/// else renders with its natural `Display` form.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for CommandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandValue::Text(text) => f.write_str(text),
            CommandValue::Int(value) => write!(f, "{value}"),
            CommandValue::Float(value) => write!(f, "{value}"),
            CommandValue::Bool(value) => f.write_str(if *value { "1" } else { "0" }),
        }
    }
}

impl From<&str> for CommandValue {
    fn from(value: &str) -> Self {
        CommandValue::Text(value.to_string())
    }
}

impl From<String> for CommandValue {
    fn from(value: String) -> Self {
        CommandValue::Text(value)
    }
}

impl From<bool> for CommandValue {
    fn from(value: bool) -> Self {
        CommandValue::Bool(value)
    }
}

impl From<i32> for CommandValue {
    fn from(value: i32) -> Self {
        CommandValue::Int(value.into())
    }
}

impl From<i64> for CommandValue {
    fn from(value: i64) -> Self {
        CommandValue::Int(value)
    }
}

impl From<u32> for CommandValue {
    fn from(value: u32) -> Self {
        CommandValue::Int(value.into())
    }
}

impl From<f32> for CommandValue {
    fn from(value: f32) -> Self {
        CommandValue::Float(value.into())
    }
}

impl From<f64> for CommandValue {
    fn from(value: f64) -> Self {
        CommandValue::Float(value)
    }
}

/// Positional and named values for [`CommandTemplate::build`].
///
/// Positional values fill slots left to right, required arguments first.
/// Named values override by argument name and win over positionals.
///
/// # Examples
///
/// ```
/// use scpi_dictionary_core::CommandArgs;
///
/// let args = CommandArgs::with(100).set("cnum", 2);
/// assert!(!args.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandArgs {
    pub positional: Vec<CommandValue>,
    pub named: Vec<(String, CommandValue)>,
}

impl CommandArgs {
    /// No arguments; every slot keeps its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Single positional value, the common case for setter commands.
    pub fn with(value: impl Into<CommandValue>) -> Self {
        Self::new().arg(value)
    }

    /// Appends a positional value.
    pub fn arg(mut self, value: impl Into<CommandValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a named value. Applied after positionals, last write wins.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<CommandValue>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// True when the first positional is the SCPI query marker `?`.
    fn leads_with_query_marker(&self) -> bool {
        matches!(self.positional.first(), Some(CommandValue::Text(text)) if text == "?")
    }
}

/// A parsed instrument command pattern.
///
/// Templates are immutable once registered in a dictionary; the metadata
/// setters exist for the construction phase and document loading.
///
/// # Examples
///
/// ```
/// use scpi_dictionary_core::{CommandArgs, CommandTemplate, Dialect};
///
/// let template = CommandTemplate::parse("OUTPut:STATe <on>", Dialect::Scpi).unwrap();
/// assert_eq!(template.required().len(), 1);
/// assert_eq!(template.build(&CommandArgs::with(true)).unwrap(), "OUTPut:STATe 1");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    raw: String,
    dialect: Dialect,
    description: Option<String>,
    required: Vec<Argument>,
    optional: Vec<Argument>,
}

impl CommandTemplate {
    /// Parses a pattern using the default `<placeholder>` token syntax.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::AmbiguousToken`] if one token is a substring
    /// of another.
    pub fn parse(raw: &str, dialect: Dialect) -> Result<Self, TemplateError> {
        Self::parse_with(raw, dialect, DEFAULT_ARGUMENT_PATTERN)
    }

    /// Parses a pattern with a custom placeholder regex.
    ///
    /// Tokens matched before the first whitespace become optional arguments;
    /// tokens after it are required. Repeated occurrences of the same token
    /// map to a single argument and substitute everywhere.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::BadPattern`] if the regex does not compile,
    /// or [`TemplateError::AmbiguousToken`] for substring token collisions.
    pub fn parse_with(
        raw: &str,
        dialect: Dialect,
        argument_pattern: &str,
    ) -> Result<Self, TemplateError> {
        let pattern = Regex::new(argument_pattern).map_err(|source| TemplateError::BadPattern {
            pattern: argument_pattern.to_string(),
            source,
        })?;

        let boundary = raw.find(char::is_whitespace).unwrap_or(raw.len());
        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for found in pattern.find_iter(raw) {
            if !seen.insert(found.as_str()) {
                continue;
            }
            let argument = Argument::from_token(found.as_str());
            if found.start() < boundary {
                optional.push(argument);
            } else {
                required.push(argument);
            }
        }

        let template = Self {
            raw: raw.to_string(),
            dialect,
            description: None,
            required,
            optional,
        };
        for first in template.arguments() {
            for second in template.arguments() {
                if first.token != second.token && second.token.contains(&first.token) {
                    return Err(TemplateError::AmbiguousToken {
                        token: first.token.clone(),
                        conflict: second.token.clone(),
                        raw: raw.to_string(),
                    });
                }
            }
        }
        Ok(template)
    }

    /// The original pattern text, untouched.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Sets the human-readable description, builder style.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Required arguments in slot order (parameter section of the pattern).
    pub fn required(&self) -> &[Argument] {
        &self.required
    }

    /// Optional arguments in slot order (embedded in the command path).
    pub fn optional(&self) -> &[Argument] {
        &self.optional
    }

    pub(crate) fn required_mut(&mut self) -> &mut [Argument] {
        &mut self.required
    }

    pub(crate) fn optional_mut(&mut self) -> &mut [Argument] {
        &mut self.optional
    }

    /// All arguments in slot order: required first, then optional.
    pub fn arguments(&self) -> impl Iterator<Item = &Argument> {
        self.required.iter().chain(self.optional.iter())
    }

    pub fn argument_count(&self) -> usize {
        self.required.len() + self.optional.len()
    }

    /// Sets the default value substituted for `name` when a build omits it.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UnknownArgument`] if no argument has `name`.
    pub fn set_default(
        &mut self,
        name: &str,
        value: impl Into<CommandValue>,
    ) -> Result<(), TemplateError> {
        let value = value.into().to_string();
        self.argument_mut(name)?.default = value;
        Ok(())
    }

    /// Sets the advisory reply shape for the argument `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UnknownArgument`] if no argument has `name`.
    pub fn set_return_type(
        &mut self,
        name: &str,
        return_type: ReturnType,
    ) -> Result<(), TemplateError> {
        self.argument_mut(name)?.return_type = Some(return_type);
        Ok(())
    }

    /// Sets the description of the argument `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UnknownArgument`] if no argument has `name`.
    pub fn set_argument_description(
        &mut self,
        name: &str,
        description: impl Into<String>,
    ) -> Result<(), TemplateError> {
        self.argument_mut(name)?.description = Some(description.into());
        Ok(())
    }

    fn argument_mut(&mut self, name: &str) -> Result<&mut Argument, TemplateError> {
        let raw = self.raw.clone();
        self.required
            .iter_mut()
            .chain(self.optional.iter_mut())
            .find(|argument| argument.name == name)
            .ok_or(TemplateError::UnknownArgument {
                name: name.to_string(),
                raw,
            })
    }

    /// The canonical command name: every argument blanked, dialect ignore
    /// patterns stripped, dangling separators and surrounding whitespace
    /// trimmed.
    ///
    /// Deterministic for a given template, so it is safe to use as a
    /// dictionary key.
    pub fn default_name(&self) -> String {
        let blanks = vec![String::new(); self.argument_count()];
        let text = self.render(&blanks, self.dialect.ignore_patterns());
        self.dialect.polish(text, &CommandArgs::new())
    }

    /// The pattern with tokens replaced by `{slot}` placeholders, in the
    /// order values are substituted. Useful for display and debugging.
    ///
    /// # Examples
    ///
    /// ```
    /// use scpi_dictionary_core::{CommandTemplate, Dialect};
    ///
    /// let template =
    ///     CommandTemplate::parse("SENSe<cnum>:FREQuency:CENTer <num>", Dialect::Scpi).unwrap();
    /// assert_eq!(template.format_template(), "SENSe{1}:FREQuency:CENTer {0}");
    /// ```
    pub fn format_template(&self) -> String {
        let slotted = self.slotted(self.dialect.ignore_patterns());
        let mut out = String::with_capacity(slotted.len());
        let mut parts = slotted.split(SLOT_MARK);
        while let Some(literal) = parts.next() {
            out.push_str(literal);
            let Some(index) = parts.next() else { break };
            out.push('{');
            out.push_str(index);
            out.push('}');
        }
        out.trim().to_string()
    }

    /// Substitutes values into the pattern and returns the wire-ready text.
    ///
    /// Every call starts from a fresh ordered map of argument defaults, so
    /// one build never leaks values into the next. Positional values fill
    /// slots left to right (required arguments first), then named values
    /// override by argument name. The SCPI dialect finishes by collapsing
    /// `?` query spacing and stripping dangling separators.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::TooManyArguments`] if more positional values
    /// are given than the template has slots, or
    /// [`TemplateError::UnknownArgument`] for a named value that matches no
    /// argument.
    ///
    /// # Examples
    ///
    /// ```
    /// use scpi_dictionary_core::{CommandArgs, CommandTemplate, Dialect};
    ///
    /// let template = CommandTemplate::parse("FREQuency:STARt <num>", Dialect::Scpi).unwrap();
    /// assert_eq!(template.build(&CommandArgs::with(100)).unwrap(), "FREQuency:STARt 100");
    /// assert_eq!(template.build(&CommandArgs::with("?")).unwrap(), "FREQuency:STARt?");
    /// assert_eq!(template.build(&CommandArgs::new()).unwrap(), "FREQuency:STARt");
    /// ```
    pub fn build(&self, args: &CommandArgs) -> Result<String, TemplateError> {
        let mut values: IndexMap<&str, String> = self
            .arguments()
            .map(|argument| (argument.name.as_str(), argument.default.clone()))
            .collect();

        if args.positional.len() > values.len() {
            return Err(TemplateError::TooManyArguments {
                raw: self.raw.clone(),
                given: args.positional.len(),
                accepted: values.len(),
            });
        }
        for (slot, value) in args.positional.iter().enumerate() {
            if let Some((_, entry)) = values.get_index_mut(slot) {
                *entry = value.to_string();
            }
        }
        for (name, value) in &args.named {
            match values.get_mut(name.as_str()) {
                Some(entry) => *entry = value.to_string(),
                None => {
                    return Err(TemplateError::UnknownArgument {
                        name: name.clone(),
                        raw: self.raw.clone(),
                    });
                }
            }
        }

        let ordered: Vec<String> = values.into_values().collect();
        let text = self.render(&ordered, self.dialect.ignore_patterns());
        Ok(self.dialect.polish(text, args))
    }

    /// Replaces each token with a slot marker, then strips ignore patterns.
    /// Tokens deleted by an ignore pattern simply drop their value.
    fn slotted(&self, ignore: &[Regex]) -> String {
        let mut text = self.raw.clone();
        for (slot, argument) in self.arguments().enumerate() {
            text = text.replace(&argument.token, &format!("{SLOT_MARK}{slot}{SLOT_MARK}"));
        }
        for pattern in ignore {
            text = pattern.replace_all(&text, "").into_owned();
        }
        text
    }

    fn render(&self, values: &[String], ignore: &[Regex]) -> String {
        let slotted = self.slotted(ignore);
        let mut out = String::with_capacity(slotted.len());
        let mut parts = slotted.split(SLOT_MARK);
        while let Some(literal) = parts.next() {
            out.push_str(literal);
            let Some(index) = parts.next() else { break };
            match index.parse::<usize>() {
                Ok(slot) => out.push_str(values.get(slot).map(String::as_str).unwrap_or("")),
                Err(_) => out.push_str(index),
            }
        }
        out.trim().to_string()
    }
}
