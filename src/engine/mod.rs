//! Recognition engine capability interface
//!
//! The session manager only talks to engines through [`RecognitionEngine`].
//! Concrete engines:
//! - `ConsoleEngine`: line-oriented recognizer over an async reader (stdin
//!   in the daemon)
//! - `scripted`: in-memory engine driven by tests

mod console;
mod traits;

#[cfg(test)]
pub(crate) mod scripted;

pub use console::{ConsoleEngine, ConsoleEngineFactory};
pub use traits::{
    Alternative, EngineEvent, EngineFactory, EngineReactions, EngineSettings, RecognitionEngine,
    RecognitionResult, ResultEvent,
};
