//! Command definitions loaded from JSON
//!
//! ```json
//! [
//!   { "command": "set temperature to :value degrees", "action": "set_temperature" },
//!   { "command": ["new quote", "start a quote"], "action": "new_quote",
//!     "is_fuzzy_match": true, "best_match_only": true }
//! ]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::matcher::{Command, CommandMatch, DEFAULT_FUZZY_THRESHOLD};

/// One phrase or a list of alternatives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Phrases {
    One(String),
    Many(Vec<String>),
}

impl Phrases {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Phrases::One(phrase) => vec![phrase.clone()],
            Phrases::Many(phrases) => phrases.clone(),
        }
    }
}

/// Serializable description of a command; the callback is bound later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: Phrases,
    /// Name reported when the command fires
    pub action: String,
    #[serde(default)]
    pub match_interim: bool,
    #[serde(default)]
    pub is_fuzzy_match: bool,
    #[serde(default = "default_threshold")]
    pub fuzzy_matching_threshold: f64,
    #[serde(default)]
    pub best_match_only: bool,
}

fn default_threshold() -> f64 {
    DEFAULT_FUZZY_THRESHOLD
}

impl CommandSpec {
    /// Read a JSON array of command definitions
    pub fn load_all(path: &Path) -> Result<Vec<CommandSpec>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read command file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse command file {}", path.display()))
    }

    /// Bind a callback, producing a matchable command
    pub fn into_command(
        self,
        callback: impl Fn(&str, CommandMatch) + Send + Sync + 'static,
    ) -> Command {
        let action = self.action;
        let mut command = Command::any_of(self.command.to_vec(), move |matched| {
            callback(&action, matched)
        })
        .match_interim(self.match_interim)
        .best_match_only(self.best_match_only);
        if self.is_fuzzy_match {
            command = command.fuzzy(self.fuzzy_matching_threshold);
        }
        command
    }
}
