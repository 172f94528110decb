//! Command phrase to regular expression translation
//!
//! Phrase syntax:
//! - `(words)` optional words
//! - `:name` one whitespace-free word, captured
//! - `*` anything, captured lazily

use lazy_static::lazy_static;
use regex::{Captures, Regex, RegexBuilder};

use crate::error::CommandError;

lazy_static! {
    static ref ESCAPE_REGEX: Regex = Regex::new(r"[\-{}\[\]+?.\\^$|#]").unwrap();
    static ref OPTIONAL_PARAM: Regex = Regex::new(r"\s*\((.*?)\)\s*").unwrap();
    static ref NAMED_PARAM: Regex = Regex::new(r"(\(\?)?:\w+").unwrap();
    static ref SPLAT_PARAM: Regex = Regex::new(r"\*").unwrap();
    static ref OPTIONAL_REGEX: Regex = Regex::new(r"(\(\?:[^)]+\))\?").unwrap();
}

/// What a command listens for
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Phrase in the command syntax above
    Phrase(String),
    /// Pre-built expression; matched case-insensitively
    Regex(Regex),
}

impl CommandPattern {
    /// Source text of the pattern
    pub fn as_str(&self) -> &str {
        match self {
            CommandPattern::Phrase(phrase) => phrase,
            CommandPattern::Regex(regex) => regex.as_str(),
        }
    }
}

impl PartialEq for CommandPattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CommandPattern::Phrase(a), CommandPattern::Phrase(b)) => a == b,
            (CommandPattern::Regex(a), CommandPattern::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl From<&str> for CommandPattern {
    fn from(phrase: &str) -> Self {
        CommandPattern::Phrase(phrase.to_string())
    }
}

impl From<String> for CommandPattern {
    fn from(phrase: String) -> Self {
        CommandPattern::Phrase(phrase)
    }
}

impl From<Regex> for CommandPattern {
    fn from(regex: Regex) -> Self {
        CommandPattern::Regex(regex)
    }
}

/// Compile a pattern into an anchored, case-insensitive expression
pub fn command_to_regex(pattern: &CommandPattern) -> Result<Regex, CommandError> {
    let source = match pattern {
        CommandPattern::Regex(regex) => regex.as_str().to_string(),
        CommandPattern::Phrase(phrase) => {
            let escaped = ESCAPE_REGEX.replace_all(phrase, r"\$0");
            let optional = OPTIONAL_PARAM.replace_all(&escaped, "(?:${1})?");
            // `(?:` opening an optional group is not a named parameter
            let named = NAMED_PARAM.replace_all(&optional, |caps: &Captures| {
                if caps.get(1).is_some() {
                    caps[0].to_string()
                } else {
                    r"([^\s]+)".to_string()
                }
            });
            let splat = SPLAT_PARAM.replace_all(&named, "(.*?)");
            let spaced = OPTIONAL_REGEX.replace_all(&splat, r"\s*${1}?\s*");
            format!("^{}$", spaced)
        }
    };

    RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .map_err(|source| CommandError {
            pattern: pattern.as_str().to_string(),
            source,
        })
}
