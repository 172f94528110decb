//! Observer registry for session notifications

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::SessionEvent;

/// Receives session notifications. Every method defaults to a no-op so a
/// listener only implements the notifications it cares about.
pub trait SessionListener: Send + Sync {
    fn on_listening_change(&self, _listening: bool) {}

    fn on_microphone_availability_change(&self, _available: bool) {}

    fn on_transcript_change(&self, _interim_transcript: &str, _final_transcript: &str) {}

    fn on_clear_transcript(&self) {}

    fn on_browser_support_change(&self, _supported: bool) {}

    fn on_continuous_support_change(&self, _supported: bool) {}
}

/// Opaque handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

/// Listeners keyed by token; iteration follows registration order
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    listeners: BTreeMap<SubscriptionToken, Arc<dyn SessionListener>>,
}

impl ListenerRegistry {
    pub(crate) fn insert(&mut self, listener: Arc<dyn SessionListener>) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_id);
        self.next_id += 1;
        self.listeners.insert(token, listener);
        token
    }

    pub(crate) fn remove(&mut self, token: SubscriptionToken) -> bool {
        self.listeners.remove(&token).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Current listeners, cloned so the registry lock is not held while
    /// they run
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn SessionListener>> {
        self.listeners.values().cloned().collect()
    }
}

/// Invoke the listener method matching `event`
pub(crate) fn deliver(listener: &dyn SessionListener, event: &SessionEvent) {
    match event {
        SessionEvent::ListeningChanged { listening } => listener.on_listening_change(*listening),
        SessionEvent::MicrophoneAvailabilityChanged { available } => {
            listener.on_microphone_availability_change(*available)
        }
        SessionEvent::TranscriptChanged {
            interim_transcript,
            final_transcript,
        } => listener.on_transcript_change(interim_transcript, final_transcript),
        SessionEvent::TranscriptCleared => listener.on_clear_transcript(),
        SessionEvent::BrowserSupportChanged { supported } => {
            listener.on_browser_support_change(*supported)
        }
        SessionEvent::ContinuousSupportChanged { supported } => {
            listener.on_continuous_support_change(*supported)
        }
    }
}

/// Forwards every notification into a channel as a [`SessionEvent`]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        // Receiver gone means the consumer is shutting down
        let _ = self.tx.send(event);
    }
}

impl SessionListener for ChannelListener {
    fn on_listening_change(&self, listening: bool) {
        self.forward(SessionEvent::ListeningChanged { listening });
    }

    fn on_microphone_availability_change(&self, available: bool) {
        self.forward(SessionEvent::MicrophoneAvailabilityChanged { available });
    }

    fn on_transcript_change(&self, interim_transcript: &str, final_transcript: &str) {
        self.forward(SessionEvent::TranscriptChanged {
            interim_transcript: interim_transcript.to_string(),
            final_transcript: final_transcript.to_string(),
        });
    }

    fn on_clear_transcript(&self) {
        self.forward(SessionEvent::TranscriptCleared);
    }

    fn on_browser_support_change(&self, supported: bool) {
        self.forward(SessionEvent::BrowserSupportChanged { supported });
    }

    fn on_continuous_support_change(&self, supported: bool) {
        self.forward(SessionEvent::ContinuousSupportChanged { supported });
    }
}
