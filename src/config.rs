//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::platform::PlatformProfile;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Recognition language; `None` keeps the engine default
    pub language: Option<String>,

    /// Listen continuously instead of one utterance at a time
    pub continuous: bool,

    /// Treat the host like a mobile platform with quirky final results
    pub mobile_result_quirks: bool,

    /// JSON file of voice command definitions
    pub commands_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("speech-session");

        let socket_path = env_var("SPEECH_SESSIOND_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let continuous = match env_var("SPEECH_SESSIOND_CONTINUOUS") {
            Some(value) => parse_flag(&value)
                .with_context(|| format!("invalid SPEECH_SESSIOND_CONTINUOUS: {value}"))?,
            None => true,
        };
        let mobile_result_quirks = match env_var("SPEECH_SESSIOND_MOBILE_QUIRKS") {
            Some(value) => parse_flag(&value)
                .with_context(|| format!("invalid SPEECH_SESSIOND_MOBILE_QUIRKS: {value}"))?,
            None => false,
        };

        Ok(Self {
            socket_path,
            data_dir,
            language: env_var("SPEECH_SESSIOND_LANG"),
            continuous,
            mobile_result_quirks,
            commands_path: env_var("SPEECH_SESSIOND_COMMANDS").map(PathBuf::from),
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }

    /// Platform profile implied by the configuration
    pub fn platform(&self) -> PlatformProfile {
        if self.mobile_result_quirks {
            PlatformProfile::mobile()
        } else {
            PlatformProfile::desktop()
        }
    }
}

/// Non-empty environment variable
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
