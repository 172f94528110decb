//! Voice command matching
//!
//! Commands are matched against finalized (optionally interim) transcript
//! text, either exactly through a small phrase syntax compiled to regular
//! expressions, or fuzzily through bigram Dice similarity.

mod fuzzy;
mod matcher;
mod pattern;
mod spec;

pub use fuzzy::{dice_coefficient, strip_specials};
pub use matcher::{
    match_commands, Command, CommandMatch, MatchContext, TranscriptResetter,
    DEFAULT_FUZZY_THRESHOLD,
};
pub use pattern::{command_to_regex, CommandPattern};
pub use spec::{CommandSpec, Phrases};
