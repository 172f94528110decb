//! Per-consumer view of the shared session

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::commands::{match_commands, Command, TranscriptResetter};
use crate::session::{concat_transcripts, SessionListener, SessionManager, SubscriptionToken};

/// Consumer-local view of the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriberState {
    pub interim_transcript: String,
    pub final_transcript: String,
    pub listening: bool,
    pub is_microphone_available: bool,
    pub browser_supports_speech_recognition: bool,
    pub browser_supports_continuous_listening: bool,
}

impl SubscriberState {
    /// Final text followed by the utterance in progress
    pub fn transcript(&self) -> String {
        concat_transcripts(&[&self.final_transcript, &self.interim_transcript])
    }

    fn clear_transcript(&mut self) {
        self.interim_transcript.clear();
        self.final_transcript.clear();
    }

    fn append_transcript(&mut self, interim_transcript: &str, final_transcript: &str) {
        self.interim_transcript = interim_transcript.to_string();
        self.final_transcript = concat_transcripts(&[&self.final_transcript, final_transcript]);
    }
}

/// How a subscriber treats transcript updates
#[derive(Debug, Clone)]
pub struct SubscriberOptions {
    /// Accumulate transcript text locally
    pub transcribing: bool,
    /// Clear local text when a fresh single-shot session starts
    pub clear_transcript_on_listen: bool,
    pub commands: Vec<Command>,
}

impl Default for SubscriberOptions {
    fn default() -> Self {
        Self {
            transcribing: true,
            clear_transcript_on_listen: true,
            commands: Vec::new(),
        }
    }
}

impl SubscriberOptions {
    pub fn with_commands(mut self, commands: Vec<Command>) -> Self {
        self.commands = commands;
        self
    }
}

/// The listener registered with the manager on the adapter's behalf
struct SubscriberListener {
    active: Arc<AtomicBool>,
    state: Arc<watch::Sender<SubscriberState>>,
    transcribing: bool,
    clear_transcript_on_listen: bool,
    commands: Arc<[Command]>,
    resetter: TranscriptResetter,
}

impl SubscriberListener {
    fn update(&self, modify: impl FnOnce(&mut SubscriberState)) {
        if self.active.load(Ordering::SeqCst) {
            self.state.send_modify(modify);
        }
    }
}

impl SessionListener for SubscriberListener {
    fn on_listening_change(&self, listening: bool) {
        self.update(|state| state.listening = listening);
    }

    fn on_microphone_availability_change(&self, available: bool) {
        self.update(|state| state.is_microphone_available = available);
    }

    fn on_transcript_change(&self, interim_transcript: &str, final_transcript: &str) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        if self.transcribing {
            self.state
                .send_modify(|state| state.append_transcript(interim_transcript, final_transcript));
        }
        let fired = match_commands(
            &self.commands,
            interim_transcript,
            final_transcript,
            &self.resetter,
        );
        if fired > 0 {
            debug!(fired, "voice commands fired");
        }
    }

    fn on_clear_transcript(&self) {
        if self.clear_transcript_on_listen {
            self.update(SubscriberState::clear_transcript);
        }
    }

    fn on_browser_support_change(&self, supported: bool) {
        self.update(|state| state.browser_supports_speech_recognition = supported);
    }

    fn on_continuous_support_change(&self, supported: bool) {
        self.update(|state| state.browser_supports_continuous_listening = supported);
    }
}

struct Registration {
    token: SubscriptionToken,
    active: Arc<AtomicBool>,
}

/// A consumer's registration with the shared session manager.
///
/// Registered on [`activate`](Self::activate); unregistered on
/// [`deactivate`](Self::deactivate) or drop.
pub struct SpeechSubscriber {
    manager: SessionManager,
    options: SubscriberOptions,
    state: Arc<watch::Sender<SubscriberState>>,
    registration: Option<Registration>,
}

impl SpeechSubscriber {
    /// Capture the manager's current state and start receiving updates
    pub fn activate(manager: &SessionManager, options: SubscriberOptions) -> Self {
        let snapshot = manager.snapshot();
        let initial = SubscriberState {
            interim_transcript: snapshot.interim_transcript,
            final_transcript: String::new(),
            listening: snapshot.listening,
            is_microphone_available: snapshot.is_microphone_available,
            browser_supports_speech_recognition: snapshot.browser_supports_speech_recognition,
            browser_supports_continuous_listening: snapshot
                .browser_supports_continuous_listening,
        };
        let (state, _) = watch::channel(initial);

        let mut subscriber = Self {
            manager: manager.clone(),
            options,
            state: Arc::new(state),
            registration: None,
        };
        subscriber.register();
        subscriber
    }

    pub fn is_active(&self) -> bool {
        self.registration.is_some()
    }

    /// Stop receiving updates. No callback runs for this subscriber after
    /// this returns.
    pub fn deactivate(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.active.store(false, Ordering::SeqCst);
            self.manager.unsubscribe(registration.token);
            debug!(token = ?registration.token, "subscriber deactivated");
        }
    }

    /// Replace the command list; an active subscriber re-registers so the
    /// new commands take effect
    pub fn set_commands(&mut self, commands: Vec<Command>) {
        self.options.commands = commands;
        self.reregister();
    }

    /// Replace every option at once
    pub fn set_options(&mut self, options: SubscriberOptions) {
        self.options = options;
        self.reregister();
    }

    pub fn set_transcribing(&mut self, transcribing: bool) {
        self.options.transcribing = transcribing;
        self.reregister();
    }

    pub fn set_clear_transcript_on_listen(&mut self, clear_transcript_on_listen: bool) {
        self.options.clear_transcript_on_listen = clear_transcript_on_listen;
        self.reregister();
    }

    pub fn state(&self) -> SubscriberState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every local state change
    pub fn watch(&self) -> watch::Receiver<SubscriberState> {
        self.state.subscribe()
    }

    pub fn transcript(&self) -> String {
        self.state.borrow().transcript()
    }

    /// Reset the shared session's transcript and clear local text
    pub fn reset_transcript(&self) {
        self.resetter().reset();
    }

    fn reregister(&mut self) {
        if self.is_active() {
            self.register();
        }
    }

    fn register(&mut self) {
        self.deactivate();

        let active = Arc::new(AtomicBool::new(true));
        let listener = SubscriberListener {
            active: Arc::clone(&active),
            state: Arc::clone(&self.state),
            transcribing: self.options.transcribing,
            clear_transcript_on_listen: self.options.clear_transcript_on_listen,
            commands: self.options.commands.clone().into(),
            resetter: self.resetter(),
        };
        let token = self.manager.subscribe(Arc::new(listener));
        debug!(
            ?token,
            commands = self.options.commands.len(),
            "subscriber registered"
        );
        self.registration = Some(Registration { token, active });
    }

    fn resetter(&self) -> TranscriptResetter {
        let manager = self.manager.downgrade();
        let state = Arc::downgrade(&self.state);
        TranscriptResetter::new(move || {
            if let Some(manager) = manager.upgrade() {
                manager.reset_transcript();
            }
            if let Some(state) = state.upgrade() {
                state.send_modify(SubscriberState::clear_transcript);
            }
        })
    }
}

impl Drop for SpeechSubscriber {
    fn drop(&mut self) {
        self.deactivate();
    }
}
