//! Subscriber adapter
//!
//! Bridges the session manager's push notifications into consumer-local
//! state and runs voice commands against every transcript update.

mod subscriber;

pub use subscriber::{SpeechSubscriber, SubscriberOptions, SubscriberState};
