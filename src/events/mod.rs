//! Events broadcast by the session manager
//!
//! Every notification the manager fans out to its listeners has a matching
//! variant here, so the same change can be logged, serialized to control
//! socket clients, or forwarded over a channel.

use serde::{Deserialize, Serialize};

/// A change in session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The engine started or stopped capturing
    ListeningChanged { listening: bool },

    /// Microphone access was lost (or regained after reconfiguration)
    MicrophoneAvailabilityChanged { available: bool },

    /// A result batch was processed
    TranscriptChanged {
        /// Tentative text of the utterance in progress
        interim_transcript: String,
        /// Text finalized by this batch only
        final_transcript: String,
    },

    /// A fresh single-shot session is starting with an empty transcript
    TranscriptCleared,

    /// Recognition support changed after (re)configuring the engine
    BrowserSupportChanged { supported: bool },

    /// Continuous-listening support changed
    ContinuousSupportChanged { supported: bool },
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::ListeningChanged { listening } => {
                write!(f, "LISTENING_CHANGED ({})", listening)
            }
            SessionEvent::MicrophoneAvailabilityChanged { available } => {
                write!(f, "MICROPHONE_AVAILABILITY_CHANGED ({})", available)
            }
            SessionEvent::TranscriptChanged {
                interim_transcript,
                final_transcript,
            } => write!(
                f,
                "TRANSCRIPT_CHANGED (interim={:?}, final={:?})",
                interim_transcript, final_transcript
            ),
            SessionEvent::TranscriptCleared => write!(f, "TRANSCRIPT_CLEARED"),
            SessionEvent::BrowserSupportChanged { supported } => {
                write!(f, "BROWSER_SUPPORT_CHANGED ({})", supported)
            }
            SessionEvent::ContinuousSupportChanged { supported } => {
                write!(f, "CONTINUOUS_SUPPORT_CHANGED ({})", supported)
            }
        }
    }
}
