//! speech-sessiond: shared speech session daemon
//!
//! Runs one recognition session fed by the console engine (lines on stdin,
//! `~` marks interim text) and provides:
//! - Voice commands loaded from a JSON file, logged by action name
//! - IPC server for controlling the session and streaming its events

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use speech_session::commands::{CommandMatch, CommandSpec};
use speech_session::config::Config;
use speech_session::engine::ConsoleEngineFactory;
use speech_session::ipc::Server;
use speech_session::lifecycle::ShutdownSignal;
use speech_session::{Command, ListenOptions, SessionManager, SpeechSubscriber, SubscriberOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "speech-sessiond starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, continuous = config.continuous, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    let manager =
        SessionManager::with_native_engine(config.platform(), Arc::new(ConsoleEngineFactory::stdin()));

    let commands = load_commands(&config);
    let subscriber =
        SpeechSubscriber::activate(&manager, SubscriberOptions::default().with_commands(commands));
    let mut updates = subscriber.watch();

    let server = Server::new(&config.socket_path, manager.clone())?;

    let mut options = if config.continuous {
        ListenOptions::continuous()
    } else {
        ListenOptions::single_shot()
    };
    options.language = config.language.clone();
    manager.start_listening(options).await;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = async {
            while updates.changed().await.is_ok() {
                let state = updates.borrow_and_update().clone();
                info!(
                    listening = state.listening,
                    transcript = %state.transcript(),
                    "session updated"
                );
            }
        } => {
            info!("session update stream closed");
        }

        result = shutdown.wait() => {
            match result {
                Ok(kind) => info!(%kind, "shutdown signal received"),
                Err(e) => error!(?e, "failed to wait for shutdown signal"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    if let Err(e) = manager.abort_listening().await {
        warn!(error = %e, "session did not end cleanly");
    }
    drop(subscriber);
    server.shutdown().await;

    info!("speech-sessiond stopped");

    Ok(())
}

/// Commands from the configured JSON file; matches are logged by action
fn load_commands(config: &Config) -> Vec<Command> {
    let Some(path) = &config.commands_path else {
        return Vec::new();
    };
    match CommandSpec::load_all(path) {
        Ok(specs) => {
            info!(count = specs.len(), ?path, "voice commands loaded");
            specs
                .into_iter()
                .map(|spec| spec.into_command(log_command))
                .collect()
        }
        Err(e) => {
            warn!(?e, "continuing without voice commands");
            Vec::new()
        }
    }
}

fn log_command(action: &str, matched: CommandMatch) {
    match matched {
        CommandMatch::Exact { parameters, context } => {
            info!(
                action,
                command = context.command.as_str(),
                ?parameters,
                "voice command"
            );
        }
        CommandMatch::Fuzzy {
            input, similarity, ..
        } => {
            info!(action, input = %input, similarity, "fuzzy voice command");
        }
    }
}
