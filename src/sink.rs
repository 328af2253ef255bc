// src/sink.rs

//! Where job output goes.
//!
//! The executor never renders anything itself. It drives an [`OutputSink`]
//! through the lifecycle of a block and forwards text as it arrives:
//!
//! 1. `queue_block` when `run` is called,
//! 2. `start_block` and `clear` when the job is dispatched,
//! 3. `write` / `write_err` for every stdout / stderr chunk,
//!
//! and, while the block runs, passes anything the sink publishes on its input
//! channel straight to the interpreter's stdin.

use std::io::Write;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::warn;

/// Output surface for one or more code blocks.
pub trait OutputSink: Send + Sync {
    /// The block has been submitted but may be waiting behind others.
    fn queue_block(&self);

    /// The block is about to run.
    fn start_block(&self);

    /// Stdout text from the running block.
    fn write(&self, text: &str);

    /// Stderr text from the running block.
    fn write_err(&self, text: &str);

    /// Drop anything buffered from a previous run of this block.
    fn clear(&self);

    /// Input the user typed for the running program.
    ///
    /// Called once per dispatched job; the receiver is dropped when the job
    /// resolves. Sinks that never produce input return `None`.
    fn subscribe_input(&self) -> Option<broadcast::Receiver<String>> {
        None
    }
}

/// Sink that prints to this process's stdout and stderr.
///
/// Text is written unbuffered so interactive programs show prompts before
/// they block on input. Lines fed through [`ConsoleSink::send_input`] are
/// forwarded to whichever block is running.
#[derive(Debug)]
pub struct ConsoleSink {
    input: broadcast::Sender<String>,
    // Serializes stdout/stderr writes so chunks from the two streams do not
    // interleave mid-chunk.
    out: Mutex<()>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        let (input, _) = broadcast::channel(64);
        Self {
            input,
            out: Mutex::new(()),
        }
    }

    /// Forward `text` to the running block, if any.
    pub fn send_input(&self, text: impl Into<String>) {
        // No receiver just means no block is running right now.
        let _ = self.input.send(text.into());
    }

    fn emit(&self, text: &str, to_stderr: bool) {
        let _guard = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let result = if to_stderr {
            let mut err = std::io::stderr().lock();
            err.write_all(text.as_bytes()).and_then(|_| err.flush())
        } else {
            let mut out = std::io::stdout().lock();
            out.write_all(text.as_bytes()).and_then(|_| out.flush())
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to write block output to console");
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for ConsoleSink {
    fn queue_block(&self) {}

    fn start_block(&self) {}

    fn write(&self, text: &str) {
        self.emit(text, false);
    }

    fn write_err(&self, text: &str) {
        self.emit(text, true);
    }

    fn clear(&self) {}

    fn subscribe_input(&self) -> Option<broadcast::Receiver<String>> {
        Some(self.input.subscribe())
    }
}
