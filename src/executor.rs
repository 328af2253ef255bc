// src/executor.rs

//! Queued execution of code blocks in one shared REPL.
//!
//! [`ReplExecutor`] composes a [`JobQueue`] with a dispatcher that knows how
//! to run one block against a [`ReplSession`]:
//!
//! - wrap the code with a fresh [`Sentinel`],
//! - subscribe to the session's output, then write the payload,
//! - forward stderr verbatim and stdout through a [`SentinelScanner`],
//! - forward sink input to the REPL while the block runs,
//! - resolve when the sentinel shows up or the session closes.
//!
//! Teardown races never fail the caller: a block whose session has closed,
//! or that is submitted after [`ReplExecutor::stop`], still resolves, and the
//! [`JobOutcome`] says which of those happened.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::ExecutorSettings;
use crate::errors::LaunchFailure;
use crate::queue::{Completion, Dispatch, JobQueue};
use crate::sentinel::{Scan, Sentinel, SentinelScanner, wrap_code};
use crate::session::{ReplSession, SessionEvent, SessionState};
use crate::sink::OutputSink;

/// How a submitted block was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The block ran and its sentinel was seen.
    Completed,
    /// The REPL exited before the sentinel arrived.
    SessionClosed,
    /// The session was already gone; nothing was sent to any process.
    Skipped,
}

/// Receives launch failures.
pub trait ErrorReporter: Send + Sync {
    fn report_launch_failure(&self, failure: &LaunchFailure);
}

/// Logs launch failures through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report_launch_failure(&self, failure: &LaunchFailure) {
        error!(
            binary = %failure.binary_path,
            args = %failure.args,
            error = %failure.source,
            "{}",
            failure.message
        );
    }
}

/// One queued block.
pub struct Job {
    pub code: String,
    pub sink: Arc<dyn OutputSink>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("code_len", &self.code.len())
            .finish_non_exhaustive()
    }
}

/// The session slot shared by the executor and its dispatcher.
///
/// `None` means torn down: never launched, or stopped.
#[derive(Debug, Clone, Default)]
struct SessionSlot(Arc<Mutex<Option<ReplSession>>>);

impl SessionSlot {
    fn lock(&self) -> MutexGuard<'_, Option<ReplSession>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get(&self) -> Option<ReplSession> {
        self.lock().clone()
    }

    fn take(&self) -> Option<ReplSession> {
        self.lock().take()
    }
}

/// Runs one job at a time against the session in the slot.
struct ReplDispatcher {
    slot: SessionSlot,
}

impl Dispatch for ReplDispatcher {
    type Job = Job;
    type Output = JobOutcome;

    fn dispatch(&mut self, job: Job) -> Pin<Box<dyn Future<Output = JobOutcome> + Send + '_>> {
        let session = self.slot.get();
        Box::pin(async move {
            match session {
                Some(session) if session.state() != SessionState::Closed => {
                    run_job(&session, job).await
                }
                _ => {
                    debug!("session torn down; skipping block");
                    JobOutcome::Skipped
                }
            }
        })
    }

    fn abandoned() -> JobOutcome {
        JobOutcome::Skipped
    }
}

async fn run_job(session: &ReplSession, job: Job) -> JobOutcome {
    let Job { code, sink } = job;
    let sentinel = Sentinel::for_code(&code);

    sink.start_block();

    let payload = match wrap_code(&code, &sentinel) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to wrap block; skipping");
            return JobOutcome::Skipped;
        }
    };

    sink.clear();

    // Subscribe before writing so no early chunk is missed.
    let mut output = session.subscribe();

    if let Err(err) = session.write(&payload).await {
        // The process is on its way out; its close event resolves the job.
        warn!(pid = session.pid(), error = %err, "failed to write block to repl");
    }

    let mut input = sink.subscribe_input();
    let mut scanner = SentinelScanner::new(&sentinel);

    let outcome = loop {
        tokio::select! {
            event = output.recv() => match event {
                Some(SessionEvent::Stdout(chunk)) => match scanner.feed(&chunk) {
                    Scan::Output(text) => forward(&*sink, &text),
                    Scan::Done(text) => {
                        forward(&*sink, &text);
                        break JobOutcome::Completed;
                    }
                },
                Some(SessionEvent::Stderr(chunk)) => sink.write_err(&chunk),
                Some(SessionEvent::Closed) | None => {
                    forward(&*sink, &scanner.flush());
                    break JobOutcome::SessionClosed;
                }
            },
            Some(data) = next_input(&mut input) => {
                if let Err(err) = session.write(&data).await {
                    warn!(pid = session.pid(), error = %err, "failed to forward input to repl");
                }
            }
        }
    };

    // Job-scoped subscriptions end here, exactly once.
    drop(input);
    drop(output);

    debug!(?outcome, pid = session.pid(), "block resolved");
    outcome
}

fn forward(sink: &dyn OutputSink, text: &str) {
    if !text.is_empty() {
        sink.write(text);
    }
}

/// Next line of sink input. Pends forever when the sink has no (more) input,
/// so the `select!` arm simply never fires.
async fn next_input(input: &mut Option<broadcast::Receiver<String>>) -> Option<String> {
    loop {
        let Some(rx) = input.as_mut() else {
            return std::future::pending().await;
        };
        match rx.recv().await {
            Ok(data) => return Some(data),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "sink input lagged; dropped input");
            }
            Err(broadcast::error::RecvError::Closed) => {
                *input = None;
            }
        }
    }
}

/// Runs code blocks, one at a time, in a single long-lived REPL.
#[derive(Debug)]
pub struct ReplExecutor {
    slot: SessionSlot,
    queue: JobQueue<ReplDispatcher>,
}

impl ReplExecutor {
    /// Launch the REPL described by `settings`.
    ///
    /// A launch failure is handed to `reporter` once and leaves the executor
    /// permanently closed: every later `run` resolves as
    /// [`JobOutcome::Skipped`].
    pub async fn start(settings: &ExecutorSettings, reporter: &dyn ErrorReporter) -> Self {
        let slot = SessionSlot::default();

        match ReplSession::start(settings).await {
            Ok(session) => {
                *slot.lock() = Some(session);
            }
            Err(failure) => {
                reporter.report_launch_failure(&failure);
            }
        }

        let queue = JobQueue::spawn(ReplDispatcher { slot: slot.clone() });
        Self { slot, queue }
    }

    /// Queue `code` for execution; output goes to `sink`.
    ///
    /// The block is enqueued before this returns, so blocks run in the order
    /// `run` was called. Awaiting the returned [`Completion`] is optional.
    pub fn run(&self, code: impl Into<String>, sink: Arc<dyn OutputSink>) -> Completion<JobOutcome> {
        sink.queue_block();
        self.queue.submit(Job {
            code: code.into(),
            sink,
        })
    }

    /// Stop the REPL and wait for it to exit.
    ///
    /// Blocks still queued resolve as [`JobOutcome::Skipped`]; the running one
    /// resolves as [`JobOutcome::SessionClosed`]. Safe to call repeatedly.
    pub async fn stop(&self) {
        match self.slot.take() {
            Some(session) => {
                info!(pid = session.pid(), "stopping executor");
                session.stop().await;
            }
            None => debug!("executor already stopped"),
        }
    }

    pub fn state(&self) -> SessionState {
        self.slot
            .get()
            .map_or(SessionState::Closed, |s| s.state())
    }

    /// The live session, if any.
    pub fn session(&self) -> Option<ReplSession> {
        self.slot.get()
    }

    /// Output subscriptions currently attached to the session.
    pub fn listener_count(&self) -> usize {
        self.slot.get().map_or(0, |s| s.listener_count())
    }

    /// Blocks submitted and not yet resolved.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }
}
