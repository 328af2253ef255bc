use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use replrun::errors::LaunchFailure;
use replrun::executor::ErrorReporter;
use replrun::sink::OutputSink;

/// Everything a [`RecordingSink`] was told, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Queued,
    Started,
    Cleared,
    Out(String),
    Err(String),
}

/// An output sink that records every call and can feed input to the
/// running block.
#[derive(Debug)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    input: broadcast::Sender<String>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        let (input, _) = broadcast::channel(16);
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            input,
        })
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// All stdout text, concatenated.
    pub fn stdout(&self) -> String {
        self.collect(|e| match e {
            SinkEvent::Out(s) => Some(s),
            _ => None,
        })
    }

    /// All stderr text, concatenated.
    pub fn stderr(&self) -> String {
        self.collect(|e| match e {
            SinkEvent::Err(s) => Some(s),
            _ => None,
        })
    }

    /// Publish input to the running block. Returns how many blocks are
    /// currently listening.
    pub fn send_input(&self, text: &str) -> usize {
        self.input.send(text.to_string()).unwrap_or(0)
    }

    /// Number of blocks currently subscribed to this sink's input.
    pub fn input_listeners(&self) -> usize {
        self.input.receiver_count()
    }

    fn collect(&self, pick: impl Fn(&SinkEvent) -> Option<&String>) -> String {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| pick(e).cloned())
            .collect()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl OutputSink for RecordingSink {
    fn queue_block(&self) {
        self.push(SinkEvent::Queued);
    }

    fn start_block(&self) {
        self.push(SinkEvent::Started);
    }

    fn write(&self, text: &str) {
        self.push(SinkEvent::Out(text.to_string()));
    }

    fn write_err(&self, text: &str) {
        self.push(SinkEvent::Err(text.to_string()));
    }

    fn clear(&self) {
        self.push(SinkEvent::Cleared);
    }

    fn subscribe_input(&self) -> Option<broadcast::Receiver<String>> {
        Some(self.input.subscribe())
    }
}

/// What a [`RecordingReporter`] saw, reduced to owned fields.
#[derive(Debug, Clone)]
pub struct ReportedFailure {
    pub binary_path: String,
    pub args: String,
    pub stdout: String,
    pub exit_code: Option<i32>,
    pub message: String,
    pub kind: std::io::ErrorKind,
}

/// Error reporter that keeps every launch failure.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    failures: Mutex<Vec<ReportedFailure>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<ReportedFailure> {
        self.failures.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report_launch_failure(&self, failure: &LaunchFailure) {
        self.failures.lock().unwrap().push(ReportedFailure {
            binary_path: failure.binary_path.clone(),
            args: failure.args.clone(),
            stdout: failure.stdout.clone(),
            exit_code: failure.exit_code,
            message: failure.message.clone(),
            kind: failure.source.kind(),
        });
    }
}
