//! Matching transcripts against voice commands

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::fuzzy::{dice_coefficient, strip_specials};
use super::pattern::{command_to_regex, CommandPattern};

/// Default similarity a fuzzy command needs to fire
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.8;

/// Clears the transcript of whoever received the match
#[derive(Clone)]
pub struct TranscriptResetter(Arc<dyn Fn() + Send + Sync>);

impl TranscriptResetter {
    pub fn new(reset: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(reset))
    }

    /// A resetter that does nothing
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn reset(&self) {
        (self.0)()
    }
}

impl fmt::Debug for TranscriptResetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TranscriptResetter")
    }
}

/// Passed to every command callback
#[derive(Debug, Clone)]
pub struct MatchContext {
    /// The alternative that matched
    pub command: CommandPattern,
    resetter: TranscriptResetter,
}

impl MatchContext {
    pub fn reset_transcript(&self) {
        self.resetter.reset();
    }
}

/// What a command callback receives
#[derive(Debug, Clone)]
pub enum CommandMatch {
    Exact {
        /// Captured groups in order; `None` for groups that did not take part
        parameters: Vec<Option<String>>,
        context: MatchContext,
    },
    Fuzzy {
        /// Command text with punctuation and pattern symbols removed
        command_text: String,
        /// The transcript that was matched
        input: String,
        similarity: f64,
        context: MatchContext,
    },
}

impl CommandMatch {
    pub fn context(&self) -> &MatchContext {
        match self {
            CommandMatch::Exact { context, .. } | CommandMatch::Fuzzy { context, .. } => context,
        }
    }
}

type CommandCallback = Arc<dyn Fn(CommandMatch) + Send + Sync>;

/// A voice command: one or more alternative patterns and a callback
#[derive(Clone)]
pub struct Command {
    pub patterns: Vec<CommandPattern>,
    callback: CommandCallback,
    /// Also match interim text when no final text arrived
    pub match_interim: bool,
    pub is_fuzzy_match: bool,
    pub fuzzy_matching_threshold: f64,
    /// With fuzzy matching, fire only for the most similar alternative
    pub best_match_only: bool,
}

impl Command {
    pub fn new(
        pattern: impl Into<CommandPattern>,
        callback: impl Fn(CommandMatch) + Send + Sync + 'static,
    ) -> Self {
        Self::any_of([pattern], callback)
    }

    /// A command that fires for any of several alternative patterns
    pub fn any_of<P: Into<CommandPattern>>(
        patterns: impl IntoIterator<Item = P>,
        callback: impl Fn(CommandMatch) + Send + Sync + 'static,
    ) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            callback: Arc::new(callback),
            match_interim: false,
            is_fuzzy_match: false,
            fuzzy_matching_threshold: DEFAULT_FUZZY_THRESHOLD,
            best_match_only: false,
        }
    }

    pub fn match_interim(mut self, match_interim: bool) -> Self {
        self.match_interim = match_interim;
        self
    }

    /// Switch to fuzzy matching with the given similarity threshold
    pub fn fuzzy(mut self, threshold: f64) -> Self {
        self.is_fuzzy_match = true;
        self.fuzzy_matching_threshold = threshold;
        self
    }

    pub fn best_match_only(mut self, best_match_only: bool) -> Self {
        self.best_match_only = best_match_only;
        self
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("patterns", &self.patterns)
            .field("match_interim", &self.match_interim)
            .field("is_fuzzy_match", &self.is_fuzzy_match)
            .field("fuzzy_matching_threshold", &self.fuzzy_matching_threshold)
            .field("best_match_only", &self.best_match_only)
            .finish()
    }
}

fn test_exact(pattern: &CommandPattern, input: &str) -> Option<Vec<Option<String>>> {
    if input.is_empty() {
        return None;
    }
    let regex = match command_to_regex(pattern) {
        Ok(regex) => regex,
        Err(e) => {
            warn!(error = %e, "skipping command with invalid pattern");
            return None;
        }
    };
    regex.captures(input).map(|caps| {
        caps.iter()
            .skip(1)
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect()
    })
}

fn test_fuzzy(pattern: &CommandPattern, input: &str, threshold: f64) -> Option<(String, f64)> {
    let command_text = strip_specials(pattern.as_str());
    let similarity = dice_coefficient(&command_text, input);
    (similarity >= threshold).then_some((command_text, similarity))
}

/// Run every command against one transcript update. Returns how many
/// callbacks fired.
pub fn match_commands(
    commands: &[Command],
    interim_transcript: &str,
    final_transcript: &str,
    resetter: &TranscriptResetter,
) -> usize {
    let mut fired = 0;

    for command in commands {
        let input = if final_transcript.is_empty() && command.match_interim {
            interim_transcript.trim()
        } else {
            final_transcript.trim()
        };
        let context = |pattern: &CommandPattern| MatchContext {
            command: pattern.clone(),
            resetter: resetter.clone(),
        };

        if command.is_fuzzy_match {
            let mut matches: Vec<CommandMatch> = Vec::new();
            let mut best: Option<(usize, f64)> = None;
            for pattern in &command.patterns {
                let Some((command_text, similarity)) =
                    test_fuzzy(pattern, input, command.fuzzy_matching_threshold)
                else {
                    continue;
                };
                if best.map_or(true, |(_, top)| similarity > top) {
                    best = Some((matches.len(), similarity));
                }
                matches.push(CommandMatch::Fuzzy {
                    command_text,
                    input: input.to_string(),
                    similarity,
                    context: context(pattern),
                });
            }

            if command.best_match_only && matches.len() >= 2 {
                if let Some((index, similarity)) = best {
                    debug!(similarity, "firing best fuzzy match only");
                    let best_match = matches.swap_remove(index);
                    matches = vec![best_match];
                }
            }
            for matched in matches {
                (command.callback)(matched);
                fired += 1;
            }
        } else {
            for pattern in &command.patterns {
                if let Some(parameters) = test_exact(pattern, input) {
                    debug!(pattern = pattern.as_str(), "command matched");
                    (command.callback)(CommandMatch::Exact {
                        parameters,
                        context: context(pattern),
                    });
                    fired += 1;
                }
            }
        }
    }

    fired
}
