//! Core session manager implementation
//!
//! Owns the single recognition engine handle, tracks listening state,
//! microphone availability and transcripts, and fans every change out to
//! the registered listeners. Engine reactions are queued on a channel and
//! handled one at a time by a reactor task bound to the current handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{EngineEvent, EngineFactory, EngineReactions, RecognitionEngine, ResultEvent};
use crate::error::{EngineErrorKind, SessionError};
use crate::events::SessionEvent;
use crate::platform::PlatformProfile;

use super::debounce::LeadingDebounce;
use super::registry::{deliver, ListenerRegistry, SessionListener, SubscriptionToken};
use super::transcript::concat_transcripts;

/// Minimum spacing between final-result flushes on quirky platforms
const FINAL_RESULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Options for `start_listening`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenOptions {
    /// Keep listening across utterances until explicitly stopped
    pub continuous: bool,
    /// Recognition language; `None` keeps the engine's current language
    pub language: Option<String>,
}

impl ListenOptions {
    pub fn single_shot() -> Self {
        Self::default()
    }

    pub fn continuous() -> Self {
        Self {
            continuous: true,
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub listening: bool,
    pub is_microphone_available: bool,
    pub browser_supports_speech_recognition: bool,
    pub browser_supports_continuous_listening: bool,
    pub interim_transcript: String,
    pub final_transcript: String,
}

/// How an active session is being ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    /// Graceful; pending result may still arrive
    Stop,
    /// Immediate; in-flight result discarded
    Abort,
    /// Abort without pausing, so a continuous session restarts clean
    Reset,
}

struct SessionState {
    engine: Option<Arc<dyn RecognitionEngine>>,
    reactor: Option<JoinHandle<()>>,
    /// Bumped whenever the handle is replaced or disabled
    generation: u64,
    listening: bool,
    is_microphone_available: bool,
    browser_supports_speech_recognition: bool,
    browser_supports_continuous_listening: bool,
    interim_transcript: String,
    final_transcript: String,
    pause_after_disconnect: bool,
    /// A continuous session ended on its own and its restart has not run yet
    restart_pending: bool,
    previous_result_was_final_only: bool,
    /// Callers of stop/abort waiting for the engine's end event
    stop_waiters: Vec<oneshot::Sender<()>>,
    final_debounce: Option<LeadingDebounce>,
}

impl SessionState {
    fn new(platform: &PlatformProfile) -> Self {
        Self {
            engine: None,
            reactor: None,
            generation: 0,
            listening: false,
            is_microphone_available: true,
            browser_supports_speech_recognition: false,
            browser_supports_continuous_listening: false,
            interim_transcript: String::new(),
            final_transcript: String::new(),
            pause_after_disconnect: false,
            restart_pending: false,
            previous_result_was_final_only: false,
            stop_waiters: Vec::new(),
            final_debounce: platform
                .mobile_result_quirks
                .then(|| LeadingDebounce::new(FINAL_RESULT_DEBOUNCE)),
        }
    }
}

struct Inner {
    platform: PlatformProfile,
    state: Mutex<SessionState>,
    listeners: Mutex<ListenerRegistry>,
}

/// The process-wide speech session service.
///
/// Construct one at startup and hand clones to whatever needs it; clones
/// share the same engine handle and listeners.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

/// Non-owning reference to a [`SessionManager`]
#[derive(Clone)]
pub struct WeakSessionManager {
    inner: Weak<Inner>,
}

impl WeakSessionManager {
    pub fn upgrade(&self) -> Option<SessionManager> {
        self.inner.upgrade().map(|inner| SessionManager { inner })
    }
}

impl SessionManager {
    /// Create a manager with no engine configured
    pub fn new(platform: PlatformProfile) -> Self {
        Self {
            inner: Arc::new(Inner {
                platform,
                state: Mutex::new(SessionState::new(&platform)),
                listeners: Mutex::new(ListenerRegistry::default()),
            }),
        }
    }

    /// Create a manager bound to the platform's own engine, applying the
    /// startup rule for continuous-listening support
    pub fn with_native_engine(platform: PlatformProfile, factory: Arc<dyn EngineFactory>) -> Self {
        let manager = Self::new(platform);
        manager.configure(Some(factory));

        let mut state = manager.lock_state();
        state.browser_supports_continuous_listening =
            platform.initial_continuous_support(state.browser_supports_speech_recognition);
        drop(state);

        manager
    }

    pub fn downgrade(&self) -> WeakSessionManager {
        WeakSessionManager {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn platform(&self) -> PlatformProfile {
        self.inner.platform
    }

    /// Swap in a new engine built by `factory`, or report lack of support.
    ///
    /// Must be called from within a tokio runtime.
    pub fn configure(&self, factory: Option<Arc<dyn EngineFactory>>) {
        let supported = self.inner.platform.supports(factory.as_deref());

        match factory.filter(|_| supported) {
            Some(factory) => {
                self.disable_recognition();

                let engine = factory.create();
                engine.set_continuous(false);
                engine.set_interim_results(true);

                let (tx, rx) = mpsc::unbounded_channel();
                engine.bind(Some(EngineReactions::new(tx)));

                let generation = {
                    let mut state = self.lock_state();
                    state.generation += 1;
                    state.engine = Some(Arc::clone(&engine));
                    state.generation
                };
                let reactor = tokio::spawn(Self::react(
                    Arc::downgrade(&self.inner),
                    generation,
                    rx,
                ));
                self.lock_state().reactor = Some(reactor);

                info!(engine = engine.name(), generation, "recognition engine configured");
            }
            None => {
                warn!("speech recognition is not supported with this engine");
            }
        }

        {
            let mut state = self.lock_state();
            state.browser_supports_speech_recognition = supported;
            state.browser_supports_continuous_listening = supported;
        }
        self.notify(&[
            SessionEvent::BrowserSupportChanged { supported },
            SessionEvent::ContinuousSupportChanged { supported },
        ]);
    }

    /// Tear down the current engine and report recognition as unsupported
    pub fn remove_engine(&self) {
        self.disable_recognition();
        {
            let mut state = self.lock_state();
            state.browser_supports_speech_recognition = false;
            state.browser_supports_continuous_listening = false;
        }
        self.notify(&[
            SessionEvent::BrowserSupportChanged { supported: false },
            SessionEvent::ContinuousSupportChanged { supported: false },
        ]);
    }

    /// Name of the configured engine, if any
    pub fn engine_name(&self) -> Option<String> {
        self.lock_state()
            .engine
            .as_ref()
            .map(|engine| engine.name().to_string())
    }

    pub fn is_listening(&self) -> bool {
        self.lock_state().listening
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock_state();
        SessionSnapshot {
            listening: state.listening,
            is_microphone_available: state.is_microphone_available,
            browser_supports_speech_recognition: state.browser_supports_speech_recognition,
            browser_supports_continuous_listening: state.browser_supports_continuous_listening,
            interim_transcript: state.interim_transcript.clone(),
            final_transcript: state.final_transcript.clone(),
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) -> SubscriptionToken {
        let mut listeners = self.lock_listeners();
        let token = listeners.insert(listener);
        debug!(?token, subscribers = listeners.len(), "listener subscribed");
        token
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        let mut listeners = self.lock_listeners();
        if listeners.remove(token) {
            debug!(?token, subscribers = listeners.len(), "listener unsubscribed");
        }
    }

    /// Start capturing. A change of `continuous` or `language` while a
    /// session is active stops that session first. Returns once the engine
    /// has confirmed (or refused) the start.
    pub async fn start_listening(&self, options: ListenOptions) {
        let Some((engine, generation)) = self.current_engine() else {
            debug!("start ignored, no recognition engine configured");
            return;
        };

        let continuous_changed = options.continuous != engine.continuous();
        let language = options
            .language
            .filter(|language| !language.is_empty() && *language != engine.lang());

        if continuous_changed || language.is_some() {
            if self.is_listening() {
                debug!("engine settings changed while listening, stopping first");
                if let Err(e) = self.stop_listening().await {
                    warn!(error = %e, "session did not stop before settings change");
                }
                if !self.is_current(generation) {
                    return;
                }
            }
            if continuous_changed {
                engine.set_continuous(options.continuous);
            }
            if let Some(language) = &language {
                engine.set_lang(language);
            }
        }

        if self.is_listening() {
            return;
        }

        if !engine.continuous() {
            {
                let mut state = self.lock_state();
                state.interim_transcript.clear();
                state.final_transcript.clear();
            }
            self.notify(&[SessionEvent::TranscriptCleared]);
        }

        match engine.start().await {
            Ok(()) => {
                let started = {
                    let mut state = self.lock_state();
                    let current = state.generation == generation;
                    if current {
                        state.listening = true;
                    }
                    current
                };
                if started {
                    info!(
                        engine = engine.name(),
                        continuous = engine.continuous(),
                        lang = %engine.lang(),
                        "listening started"
                    );
                    self.notify(&[SessionEvent::ListeningChanged { listening: true }]);
                } else {
                    debug!("engine replaced while starting");
                }
            }
            Err(e) if e.is_expected() => {
                debug!(error = %e, "engine start cancelled");
            }
            Err(e) => {
                warn!(error = %e, "engine failed to start");
                self.set_microphone_available(false);
            }
        }
    }

    /// End the session gracefully; resolves once the engine reports the end
    pub async fn stop_listening(&self) -> Result<(), SessionError> {
        self.disconnect_and_wait(Disconnect::Stop).await
    }

    /// End the session immediately; resolves once the engine reports the end
    pub async fn abort_listening(&self) -> Result<(), SessionError> {
        self.disconnect_and_wait(Disconnect::Abort).await
    }

    /// Clear the transcript. An active session is aborted without pausing,
    /// so a continuous session restarts with a clean slate.
    pub fn reset_transcript(&self) {
        let engine = {
            let mut state = self.lock_state();
            state.interim_transcript.clear();
            state.final_transcript.clear();
            match state.engine.clone() {
                Some(engine) if state.listening => {
                    state.pause_after_disconnect = false;
                    engine
                }
                _ => return,
            }
        };
        Self::halt(engine.as_ref(), Disconnect::Reset);
    }

    async fn disconnect_and_wait(&self, kind: Disconnect) -> Result<(), SessionError> {
        let (done, engine) = {
            let mut state = self.lock_state();
            let Some(engine) = state.engine.clone() else {
                return Ok(());
            };
            if std::mem::replace(&mut state.restart_pending, false) {
                debug!("cancelled pending continuous restart");
            }
            // Nothing to end and nobody else waiting for an end
            if !state.listening && state.stop_waiters.is_empty() {
                return Ok(());
            }

            let (done_tx, done_rx) = oneshot::channel();
            state.stop_waiters.push(done_tx);

            let engine = if state.listening {
                state.pause_after_disconnect = true;
                state.listening = false;
                Some(engine)
            } else {
                debug!(
                    waiters = state.stop_waiters.len(),
                    "joining pending stop"
                );
                None
            };
            (done_rx, engine)
        };

        if let Some(engine) = engine {
            Self::halt(engine.as_ref(), kind);
        }
        self.notify(&[SessionEvent::ListeningChanged { listening: false }]);

        done.await.map_err(|_| SessionError::StopCancelled)
    }

    fn halt(engine: &dyn RecognitionEngine, kind: Disconnect) {
        debug!(engine = engine.name(), ?kind, "disconnecting engine");
        match kind {
            Disconnect::Stop => engine.stop(),
            Disconnect::Abort | Disconnect::Reset => engine.abort(),
        }
    }

    /// Unbind the current handle's reactions, stop it if active and drop it.
    /// Pending stop callers observe `StopCancelled`.
    fn disable_recognition(&self) {
        let (engine, was_listening, waiters) = {
            let mut state = self.lock_state();
            let Some(engine) = state.engine.take() else {
                return;
            };
            if let Some(reactor) = state.reactor.take() {
                reactor.abort();
            }
            state.generation += 1;
            state.pause_after_disconnect = false;
            state.restart_pending = false;
            let was_listening = std::mem::replace(&mut state.listening, false);
            (engine, was_listening, std::mem::take(&mut state.stop_waiters))
        };

        engine.bind(None);
        if was_listening {
            Self::halt(engine.as_ref(), Disconnect::Stop);
            self.notify(&[SessionEvent::ListeningChanged { listening: false }]);
        }
        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "cancelling pending stops");
        }
        drop(waiters);

        info!(engine = engine.name(), "recognition engine disabled");
    }

    /// Handle engine events for one handle until it is replaced
    async fn react(
        inner: Weak<Inner>,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let manager = SessionManager { inner };
            if !manager.is_current(generation) {
                debug!(generation, "dropping event from retired engine");
                break;
            }
            manager.handle_engine_event(event);
        }
        debug!(generation, "engine reactor stopped");
    }

    fn handle_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::Result(result) => self.update_transcript(result),
            EngineEvent::End => self.on_recognition_disconnect(),
            EngineEvent::Error(kind) => self.on_engine_error(kind),
        }
    }

    fn update_transcript(&self, event: ResultEvent) {
        let quirks = self.inner.platform.mobile_result_quirks;

        let broadcast = {
            let mut state = self.lock_state();
            let first_new = event
                .result_index
                .unwrap_or_else(|| event.results.len().saturating_sub(1));

            let mut interim = String::new();
            let mut finalized = String::new();
            for result in event.results.iter().skip(first_new) {
                let Some(best) = result.best() else {
                    continue;
                };
                if result.is_final && (!quirks || best.confidence > 0.0) {
                    let flush = state
                        .final_debounce
                        .as_mut()
                        .map_or(true, |debounce| debounce.ready(Instant::now()));
                    if flush {
                        finalized = concat_transcripts(&[&finalized, &best.transcript]);
                    }
                } else {
                    interim = concat_transcripts(&[&interim, &best.transcript]);
                }
            }

            let mut duplicate = false;
            if interim.is_empty() && !finalized.is_empty() {
                duplicate = state.previous_result_was_final_only;
                state.previous_result_was_final_only = true;
            } else {
                state.previous_result_was_final_only = false;
            }

            if duplicate {
                debug!(final_transcript = %finalized, "suppressing duplicate final result");
                None
            } else {
                state.final_transcript = concat_transcripts(&[&state.final_transcript, &finalized]);
                state.interim_transcript = interim.clone();
                Some(SessionEvent::TranscriptChanged {
                    interim_transcript: interim,
                    final_transcript: finalized,
                })
            }
        };

        if let Some(event) = broadcast {
            self.notify(&[event]);
        }
    }

    fn on_recognition_disconnect(&self) {
        let (waiters, restart) = {
            let mut state = self.lock_state();
            let waiters = std::mem::take(&mut state.stop_waiters);
            state.listening = false;
            let paused = std::mem::replace(&mut state.pause_after_disconnect, false);
            let restart = !paused
                && state
                    .engine
                    .as_ref()
                    .is_some_and(|engine| engine.continuous());
            state.restart_pending = restart;
            (waiters, restart)
        };

        for waiter in waiters {
            let _ = waiter.send(());
        }

        if restart {
            debug!("continuous session ended on its own, restarting");
            let manager = self.clone();
            tokio::spawn(async move {
                let pending = std::mem::replace(&mut manager.lock_state().restart_pending, false);
                if pending {
                    manager.start_listening(ListenOptions::continuous()).await;
                } else {
                    debug!("continuous restart cancelled by stop");
                }
            });
        } else {
            info!("listening stopped");
            self.notify(&[SessionEvent::ListeningChanged { listening: false }]);
        }
    }

    fn on_engine_error(&self, kind: EngineErrorKind) {
        if kind.is_permission_denied() {
            warn!(error = %kind, "microphone permission denied, disabling recognition");
            self.set_microphone_available(false);
            self.disable_recognition();
        } else {
            debug!(error = %kind, "engine error absorbed");
        }
    }

    fn set_microphone_available(&self, available: bool) {
        self.lock_state().is_microphone_available = available;
        self.notify(&[SessionEvent::MicrophoneAvailabilityChanged { available }]);
    }

    fn current_engine(&self) -> Option<(Arc<dyn RecognitionEngine>, u64)> {
        let state = self.lock_state();
        state
            .engine
            .clone()
            .map(|engine| (engine, state.generation))
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_state().generation == generation
    }

    /// Deliver events to every listener, in registration order. No lock is
    /// held while listeners run.
    fn notify(&self, events: &[SessionEvent]) {
        let listeners = self.lock_listeners().snapshot();
        for event in events {
            debug!(%event, subscribers = listeners.len(), "broadcast");
            for listener in &listeners {
                deliver(listener.as_ref(), event);
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, ListenerRegistry> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
