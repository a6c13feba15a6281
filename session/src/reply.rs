//! Typed view over raw instrument replies.
//!
//! Instruments answer everything as text; [`Reply::cast`] upgrades a raw
//! line to the most specific shape it fits, trying a single number first,
//! then a comma-separated numeric list, and keeping the text otherwise.
//! Casting never fails, so callers decide how strict to be.

use std::fmt;

/// A parsed instrument reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A single numeric value, e.g. `2.4e9`.
    Number(f64),
    /// A comma-separated list where every field parses as a number.
    Numbers(Vec<f64>),
    /// Anything else, whitespace-trimmed.
    Text(String),
}

impl Reply {
    /// Casts a raw reply line into its most specific shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use scpi_dictionary_session::Reply;
    ///
    /// assert_eq!(Reply::cast("3.14\n"), Reply::Number(3.14));
    /// assert_eq!(Reply::cast("1,2,3"), Reply::Numbers(vec![1.0, 2.0, 3.0]));
    /// assert_eq!(Reply::cast("READY"), Reply::Text("READY".to_string()));
    /// ```
    pub fn cast(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<f64>() {
            return Reply::Number(value);
        }
        if trimmed.contains(',') {
            let fields: Option<Vec<f64>> = trimmed
                .split(',')
                .map(|field| field.trim().parse::<f64>().ok())
                .collect();
            if let Some(values) = fields {
                return Reply::Numbers(values);
            }
        }
        Reply::Text(trimmed.to_string())
    }

    /// The reply as a single number, when it is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Reply::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// The reply as a numeric list; a single number is a list of one.
    pub fn as_numbers(&self) -> Option<Vec<f64>> {
        match self {
            Reply::Number(value) => Some(vec![*value]),
            Reply::Numbers(values) => Some(values.clone()),
            Reply::Text(_) => None,
        }
    }

    /// The reply rendered back to text.
    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Number(value) => write!(f, "{value}"),
            Reply::Numbers(values) => {
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
            Reply::Text(text) => f.write_str(text),
        }
    }
}
