//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::SessionEvent;
use crate::session::{ListenOptions, SessionSnapshot};

/// Requests from client to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Start (or reconfigure) the shared session
    StartListening {
        #[serde(default)]
        continuous: bool,
        #[serde(default)]
        language: Option<String>,
    },

    /// End the session gracefully
    StopListening,

    /// End the session immediately
    AbortListening,

    /// Clear the shared transcript
    ResetTranscript,

    /// Subscribe to session change notifications
    Subscribe,
}

impl Request {
    /// Listen options carried by a `StartListening` request
    pub fn listen_options(&self) -> Option<ListenOptions> {
        match self {
            Request::StartListening {
                continuous,
                language,
            } => Some(ListenOptions {
                continuous: *continuous,
                language: language.clone(),
            }),
            _ => None,
        }
    }
}

/// Responses from daemon to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Request carried out
    Ok,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Session state changed
    SessionEvent { event: SessionEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Name of the configured recognition engine
    pub engine: Option<String>,

    /// Current session state
    pub session: SessionSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::StartListening {
            continuous: true,
            language: Some("en-GB".into()),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("start_listening"));
        assert!(json.contains("en-GB"));
    }

    #[test]
    fn test_start_listening_fields_default() {
        let req: Request = serde_json::from_str(r#"{"type":"start_listening"}"#).unwrap();
        assert_eq!(req.listen_options(), Some(ListenOptions::single_shot()));
        assert_eq!(Request::Ping.listen_options(), None);
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Error {
            code: "stop_cancelled".into(),
            message: "engine removed".into(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"error""#));

        let json = serde_json::to_string(&Response::Ok).unwrap();
        assert_eq!(json, r#"{"type":"ok"}"#);
    }

    #[test]
    fn test_notification_wraps_event() {
        let note = Notification::SessionEvent {
            event: SessionEvent::ListeningChanged { listening: true },
        };
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("session_event"));
        assert!(json.contains("listening_changed"));
    }
}
