//! Speech session management
//!
//! Provides the process-wide session manager with:
//! - A single engine handle, replaced on reconfiguration
//! - Listening state with auto-restart in continuous mode
//! - Transcript accumulation with duplicate-final suppression
//! - Fan-out of every change to registered listeners

mod debounce;
mod manager;
mod registry;
mod transcript;

pub use manager::{ListenOptions, SessionManager, SessionSnapshot, WeakSessionManager};
pub use registry::{ChannelListener, SessionListener, SubscriptionToken};
pub use transcript::concat_transcripts;
