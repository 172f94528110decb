//! Signal handling for graceful shutdown

use std::fmt;

use anyhow::{Context, Result};
use tracing::debug;

/// Which signal asked the daemon to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    Terminate,
    Interrupt,
}

impl fmt::Display for ShutdownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownKind::Terminate => write!(f, "SIGTERM"),
            ShutdownKind::Interrupt => write!(f, "SIGINT"),
        }
    }
}

/// Handles shutdown signals (SIGTERM, SIGINT)
pub struct ShutdownSignal;

impl ShutdownSignal {
    /// Create a new shutdown signal handler
    pub fn new() -> Self {
        Self
    }

    /// Wait for a shutdown signal
    #[cfg(unix)]
    pub async fn wait(&self) -> Result<ShutdownKind> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;

        let kind = tokio::select! {
            _ = sigterm.recv() => ShutdownKind::Terminate,
            _ = sigint.recv() => ShutdownKind::Interrupt,
        };
        debug!(%kind, "received shutdown signal");
        Ok(kind)
    }

    /// Wait for Ctrl-C
    #[cfg(not(unix))]
    pub async fn wait(&self) -> Result<ShutdownKind> {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        debug!("received Ctrl-C");
        Ok(ShutdownKind::Interrupt)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
