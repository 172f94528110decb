//! speech-session: a shared speech recognition session for many consumers
//!
//! One [`SessionManager`] per process owns the recognition engine. Any
//! number of [`SpeechSubscriber`]s observe it, each with its own transcript
//! view and voice commands. The `speech-sessiond` binary exposes the same
//! session over a Unix control socket.

pub mod adapter;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ipc;
pub mod lifecycle;
pub mod platform;
pub mod session;

pub use adapter::{SpeechSubscriber, SubscriberOptions, SubscriberState};
pub use commands::{Command, CommandMatch, CommandPattern};
pub use error::{EngineErrorKind, SessionError, StartError};
pub use events::SessionEvent;
pub use platform::PlatformProfile;
pub use session::{ListenOptions, SessionListener, SessionManager};
