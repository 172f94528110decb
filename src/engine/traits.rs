//! Engine capability trait and result types

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{EngineErrorKind, StartError};

/// One candidate transcription of an utterance
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f32,
}

/// One entry of an engine's result list
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    /// The engine has committed to this text for the utterance
    pub is_final: bool,
    /// Candidate transcriptions, best first
    pub alternatives: Vec<Alternative>,
}

impl RecognitionResult {
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            is_final: false,
            alternatives: vec![Alternative {
                transcript: transcript.into(),
                confidence: 0.0,
            }],
        }
    }

    pub fn final_result(transcript: impl Into<String>, confidence: f32) -> Self {
        Self {
            is_final: true,
            alternatives: vec![Alternative {
                transcript: transcript.into(),
                confidence,
            }],
        }
    }

    /// The best alternative, if the engine supplied any
    pub fn best(&self) -> Option<&Alternative> {
        self.alternatives.first()
    }
}

/// Payload of the engine's result reaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultEvent {
    pub results: Vec<RecognitionResult>,
    /// First new entry in `results`; `None` means only the last entry is new
    pub result_index: Option<usize>,
}

/// Everything an engine can report back to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Result(ResultEvent),
    End,
    Error(EngineErrorKind),
}

/// The engine's three reaction slots (result, end, error).
///
/// Events are queued and handled one at a time by the owner.
#[derive(Debug, Clone)]
pub struct EngineReactions {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineReactions {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    pub fn on_result(&self, event: ResultEvent) {
        self.emit(EngineEvent::Result(event));
    }

    pub fn on_end(&self) {
        self.emit(EngineEvent::End);
    }

    pub fn on_error(&self, kind: EngineErrorKind) {
        self.emit(EngineEvent::Error(kind));
    }

    fn emit(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            debug!("engine event dropped, owner no longer listening");
        }
    }
}

/// Settable engine properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineSettings {
    pub continuous: bool,
    pub interim_results: bool,
    pub lang: String,
}

/// Capability interface every speech-recognition backend implements
///
/// Implementations use interior mutability: the owner shares the handle
/// behind an `Arc` and never holds a lock across engine calls.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Engine name for logging
    fn name(&self) -> &str;

    fn continuous(&self) -> bool;
    fn set_continuous(&self, continuous: bool);

    fn interim_results(&self) -> bool;
    fn set_interim_results(&self, interim_results: bool);

    fn lang(&self) -> String;
    fn set_lang(&self, lang: &str);

    /// Begin capturing audio
    async fn start(&self) -> Result<(), StartError>;

    /// End capture gracefully, letting a pending result flush first
    fn stop(&self);

    /// End capture immediately, discarding any in-flight result
    fn abort(&self);

    /// Install or clear (`None`) the reaction slots
    fn bind(&self, reactions: Option<EngineReactions>);
}

/// Constructs engine handles
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Arc<dyn RecognitionEngine>;

    /// Whether the engine is provided by the platform itself rather than
    /// layered on its raw audio capture APIs
    fn is_native(&self) -> bool;
}
