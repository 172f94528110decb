//! In-memory engine for tests
//!
//! Records every call made on it and lets tests deliver results, end and
//! error events as if they came from a real recognizer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::traits::{
    EngineFactory, EngineReactions, EngineSettings, RecognitionEngine, RecognitionResult,
    ResultEvent,
};
use crate::error::{EngineErrorKind, StartError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EngineCall {
    Bind,
    Unbind,
    Start { continuous: bool, lang: String },
    Stop,
    Abort,
}

pub(crate) struct ScriptedEngine {
    settings: Mutex<EngineSettings>,
    reactions: Mutex<Option<EngineReactions>>,
    calls: Mutex<Vec<EngineCall>>,
    next_start_error: Mutex<Option<StartError>>,
    end_on_stop: AtomicBool,
}

impl ScriptedEngine {
    pub(crate) fn new() -> Self {
        Self {
            settings: Mutex::new(EngineSettings::default()),
            reactions: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            next_start_error: Mutex::new(None),
            end_on_stop: AtomicBool::new(true),
        }
    }

    pub(crate) fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Only the start/stop/abort calls, in order
    pub(crate) fn control_calls(&self) -> Vec<EngineCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, EngineCall::Bind | EngineCall::Unbind))
            .collect()
    }

    pub(crate) fn start_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, EngineCall::Start { .. }))
            .count()
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.reactions.lock().unwrap().is_some()
    }

    /// Make the next `start` call fail with `error`
    pub(crate) fn fail_next_start(&self, error: StartError) {
        *self.next_start_error.lock().unwrap() = Some(error);
    }

    /// When false, stop/abort leave it to the test to deliver the end event
    pub(crate) fn set_end_on_stop(&self, end_on_stop: bool) {
        self.end_on_stop.store(end_on_stop, Ordering::SeqCst);
    }

    pub(crate) fn emit_results(&self, results: Vec<RecognitionResult>, result_index: Option<usize>) {
        if let Some(reactions) = self.reactions.lock().unwrap().as_ref() {
            reactions.on_result(ResultEvent {
                results,
                result_index,
            });
        }
    }

    pub(crate) fn emit_interim(&self, transcript: &str) {
        self.emit_results(vec![RecognitionResult::interim(transcript)], None);
    }

    pub(crate) fn emit_final(&self, transcript: &str) {
        self.emit_results(vec![RecognitionResult::final_result(transcript, 0.9)], None);
    }

    pub(crate) fn emit_end(&self) {
        if let Some(reactions) = self.reactions.lock().unwrap().as_ref() {
            reactions.on_end();
        }
    }

    pub(crate) fn emit_error(&self, kind: EngineErrorKind) {
        if let Some(reactions) = self.reactions.lock().unwrap().as_ref() {
            reactions.on_error(kind);
        }
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn end_if_configured(&self) {
        if self.end_on_stop.load(Ordering::SeqCst) {
            self.emit_end();
        }
    }
}

#[async_trait]
impl RecognitionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn continuous(&self) -> bool {
        self.settings.lock().unwrap().continuous
    }

    fn set_continuous(&self, continuous: bool) {
        self.settings.lock().unwrap().continuous = continuous;
    }

    fn interim_results(&self) -> bool {
        self.settings.lock().unwrap().interim_results
    }

    fn set_interim_results(&self, interim_results: bool) {
        self.settings.lock().unwrap().interim_results = interim_results;
    }

    fn lang(&self) -> String {
        self.settings.lock().unwrap().lang.clone()
    }

    fn set_lang(&self, lang: &str) {
        self.settings.lock().unwrap().lang = lang.to_string();
    }

    async fn start(&self) -> Result<(), StartError> {
        let settings = self.settings.lock().unwrap().clone();
        self.record(EngineCall::Start {
            continuous: settings.continuous,
            lang: settings.lang,
        });
        match self.next_start_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn stop(&self) {
        self.record(EngineCall::Stop);
        self.end_if_configured();
    }

    fn abort(&self) {
        self.record(EngineCall::Abort);
        self.end_if_configured();
    }

    fn bind(&self, reactions: Option<EngineReactions>) {
        self.record(if reactions.is_some() {
            EngineCall::Bind
        } else {
            EngineCall::Unbind
        });
        *self.reactions.lock().unwrap() = reactions;
    }
}

/// Factory that keeps every engine it built so tests can drive them
pub(crate) struct ScriptedFactory {
    native: bool,
    engines: Mutex<Vec<Arc<ScriptedEngine>>>,
}

impl ScriptedFactory {
    pub(crate) fn native() -> Self {
        Self {
            native: true,
            engines: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn polyfill() -> Self {
        Self {
            native: false,
            engines: Mutex::new(Vec::new()),
        }
    }

    /// The most recently created engine
    pub(crate) fn latest(&self) -> Arc<ScriptedEngine> {
        self.engines
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("factory has not created an engine yet")
    }

    pub(crate) fn created(&self) -> usize {
        self.engines.lock().unwrap().len()
    }

    pub(crate) fn engine(&self, index: usize) -> Arc<ScriptedEngine> {
        Arc::clone(&self.engines.lock().unwrap()[index])
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self) -> Arc<dyn RecognitionEngine> {
        let engine = Arc::new(ScriptedEngine::new());
        self.engines.lock().unwrap().push(Arc::clone(&engine));
        engine
    }

    fn is_native(&self) -> bool {
        self.native
    }
}
