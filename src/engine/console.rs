//! Line-oriented recognition engine
//!
//! Treats each line read from an async reader as one recognized utterance:
//! a plain line is a final result, a line starting with `~` is an interim
//! result for the utterance in progress. Single-shot sessions end after the
//! first final result; continuous sessions keep reading until stopped or
//! the reader is exhausted. Once input is exhausted every later start is
//! refused.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use super::traits::{
    EngineFactory, EngineReactions, EngineSettings, RecognitionEngine, RecognitionResult,
    ResultEvent,
};
use crate::error::StartError;

const INTERIM_PREFIX: char = '~';

type LineSource = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;

/// Input shared by every engine a factory builds
#[derive(Clone)]
struct SharedLines {
    source: Arc<AsyncMutex<LineSource>>,
    exhausted: Arc<AtomicBool>,
}

impl SharedLines {
    fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }
}

/// How a running capture should end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Stop,
    Abort,
}

struct Capture {
    /// Cleared before the capture reports its end
    running: Arc<AtomicBool>,
    halt_tx: Option<oneshot::Sender<Halt>>,
}

pub struct ConsoleEngine {
    settings: Mutex<EngineSettings>,
    reactions: Mutex<Option<EngineReactions>>,
    capture: Mutex<Option<Capture>>,
    lines: SharedLines,
}

impl ConsoleEngine {
    fn new(lines: SharedLines) -> Self {
        Self {
            settings: Mutex::new(EngineSettings::default()),
            reactions: Mutex::new(None),
            capture: Mutex::new(None),
            lines,
        }
    }

    fn settings(&self) -> MutexGuard<'_, EngineSettings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn halt(&self, mode: Halt) {
        let mut capture = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(halt_tx) = capture.as_mut().and_then(|c| c.halt_tx.take()) {
            debug!(?mode, "halting console capture");
            let _ = halt_tx.send(mode);
        }
    }
}

fn parse_line(line: &str) -> Option<RecognitionResult> {
    let line = line.trim();
    if let Some(interim) = line.strip_prefix(INTERIM_PREFIX) {
        let interim = interim.trim();
        return (!interim.is_empty()).then(|| RecognitionResult::interim(interim));
    }
    (!line.is_empty()).then(|| RecognitionResult::final_result(line, 1.0))
}

/// A graceful stop commits the utterance still in progress
fn flush_pending(results: &mut Vec<RecognitionResult>, reactions: Option<&EngineReactions>) {
    match results.last_mut() {
        Some(last) if !last.is_final => last.is_final = true,
        _ => return,
    }
    if let Some(reactions) = reactions {
        reactions.on_result(ResultEvent {
            results: results.clone(),
            result_index: Some(results.len() - 1),
        });
    }
}

/// Read lines until the utterance limit, a halt request, or end of input
async fn run_capture(
    lines: SharedLines,
    reactions: Option<EngineReactions>,
    continuous: bool,
    running: Arc<AtomicBool>,
    mut halt_rx: oneshot::Receiver<Halt>,
) {
    let mut results: Vec<RecognitionResult> = Vec::new();

    loop {
        let next = tokio::select! {
            halt = &mut halt_rx => {
                if matches!(halt, Ok(Halt::Stop)) {
                    flush_pending(&mut results, reactions.as_ref());
                }
                break;
            }
            line = async { lines.source.lock().await.next_line().await } => line,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("console input exhausted");
                lines.exhausted.store(true, Ordering::SeqCst);
                break;
            }
            Err(e) => {
                warn!(?e, "console read failed");
                lines.exhausted.store(true, Ordering::SeqCst);
                break;
            }
        };

        let Some(result) = parse_line(&line) else {
            continue;
        };
        let is_final = result.is_final;

        // An interim result replaces the previous interim entry of the same utterance
        if results.last().is_some_and(|last| !last.is_final) {
            results.pop();
        }
        results.push(result);

        if let Some(reactions) = &reactions {
            reactions.on_result(ResultEvent {
                results: results.clone(),
                result_index: Some(results.len() - 1),
            });
        }

        if is_final && !continuous {
            break;
        }
    }

    running.store(false, Ordering::SeqCst);
    if let Some(reactions) = &reactions {
        reactions.on_end();
    }
}

#[async_trait]
impl RecognitionEngine for ConsoleEngine {
    fn name(&self) -> &str {
        "console"
    }

    fn continuous(&self) -> bool {
        self.settings().continuous
    }

    fn set_continuous(&self, continuous: bool) {
        self.settings().continuous = continuous;
    }

    fn interim_results(&self) -> bool {
        self.settings().interim_results
    }

    fn set_interim_results(&self, interim_results: bool) {
        self.settings().interim_results = interim_results;
    }

    fn lang(&self) -> String {
        self.settings().lang.clone()
    }

    fn set_lang(&self, lang: &str) {
        self.settings().lang = lang.to_string();
    }

    async fn start(&self) -> Result<(), StartError> {
        let mut capture = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
        if self.lines.is_exhausted() {
            return Err(StartError::Engine("console input closed".into()));
        }
        if capture
            .as_ref()
            .is_some_and(|c| c.running.load(Ordering::SeqCst))
        {
            return Err(StartError::AlreadyStarted);
        }

        let reactions = self
            .reactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let continuous = self.continuous();
        let (halt_tx, halt_rx) = oneshot::channel();
        let running = Arc::new(AtomicBool::new(true));

        tokio::spawn(run_capture(
            self.lines.clone(),
            reactions,
            continuous,
            Arc::clone(&running),
            halt_rx,
        ));
        *capture = Some(Capture {
            running,
            halt_tx: Some(halt_tx),
        });

        info!(continuous, "console capture started");
        Ok(())
    }

    fn stop(&self) {
        self.halt(Halt::Stop);
    }

    fn abort(&self) {
        self.halt(Halt::Abort);
    }

    fn bind(&self, reactions: Option<EngineReactions>) {
        *self.reactions.lock().unwrap_or_else(PoisonError::into_inner) = reactions;
    }
}

/// Builds console engines that share one input stream
pub struct ConsoleEngineFactory {
    lines: SharedLines,
}

impl ConsoleEngineFactory {
    /// Engines reading utterances from the process's standard input
    pub fn stdin() -> Self {
        Self::from_reader(tokio::io::stdin())
    }

    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            lines: SharedLines {
                source: Arc::new(AsyncMutex::new(BufReader::new(reader).lines())),
                exhausted: Arc::new(AtomicBool::new(false)),
            },
        }
    }
}

impl EngineFactory for ConsoleEngineFactory {
    fn create(&self) -> Arc<dyn RecognitionEngine> {
        Arc::new(ConsoleEngine::new(self.lines.clone()))
    }

    fn is_native(&self) -> bool {
        true
    }
}
