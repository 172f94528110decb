//! Error types for engine control, session control and command patterns

/// Reasons an engine refused to start capturing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    /// A pending start was cancelled by the user before capture began
    #[error("start was aborted before capture began")]
    Aborted,

    /// The engine was already capturing when asked to start again
    #[error("engine is already capturing")]
    AlreadyStarted,

    #[error("microphone permission denied")]
    NotAllowed,

    #[error("engine failed to start: {0}")]
    Engine(String),
}

impl StartError {
    /// Whether this rejection is an expected cancellation rather than a
    /// microphone problem
    pub fn is_expected(&self) -> bool {
        matches!(self, StartError::Aborted | StartError::AlreadyStarted)
    }
}

/// Error codes an engine reports through its error reaction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineErrorKind {
    #[error("not-allowed")]
    NotAllowed,
    #[error("service-not-allowed")]
    ServiceNotAllowed,
    #[error("no-speech")]
    NoSpeech,
    #[error("aborted")]
    Aborted,
    #[error("audio-capture")]
    AudioCapture,
    #[error("network")]
    Network,
    #[error("language-not-supported")]
    LanguageNotSupported,
    #[error("{0}")]
    Other(String),
}

impl EngineErrorKind {
    /// Parse a wire-level error code
    pub fn from_code(code: &str) -> Self {
        match code {
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            "language-not-supported" => Self::LanguageNotSupported,
            other => Self::Other(other.to_string()),
        }
    }

    /// The user denied microphone access; recognition cannot continue
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::NotAllowed)
    }
}

/// Errors returned by the session control API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("recognition engine was torn down before it reported the end of the session")]
    StopCancelled,
}

/// A voice command pattern that could not be compiled
#[derive(Debug, thiserror::Error)]
#[error("invalid command pattern {pattern:?}: {source}")]
pub struct CommandError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}
