// src/session/process.rs

//! REPL process lifecycle.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::ExecutorSettings;
use crate::errors::{LaunchFailure, Result};

use super::hub::{StreamHub, Subscription};
use super::utf8::Utf8Chunker;
use super::{SessionEvent, SessionState};

/// Script passed to `node -e`: a REPL with no prompt, no live preview and no
/// echo of `undefined`, which takes the whole process down when it exits.
pub const REPL_BOOTSTRAP: &str = r#"require("repl").start({prompt: "", preview: false, ignoreUndefined: true}).on("exit", ()=>process.exit())"#;

const READ_BUF_SIZE: usize = 8 * 1024;

/// Full argument list for the interpreter: the bootstrap first, then the
/// configured extra arguments.
pub fn launch_args(settings: &ExecutorSettings) -> Vec<String> {
    let mut args = vec!["-e".to_string(), REPL_BOOTSTRAP.to_string()];
    args.extend(settings.extra_args());
    args
}

/// Handle to one running REPL process.
///
/// Cloning is cheap; all clones drive the same process. Dropping the last
/// handle stops the process the same way [`ReplSession::stop`] does.
#[derive(Debug, Clone)]
pub struct ReplSession {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    binary_path: String,
    args: Vec<String>,
    pid: Option<u32>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    hub: StreamHub,
    state: Arc<watch::Sender<SessionState>>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl ReplSession {
    /// Launch the interpreter and dismiss its startup banner.
    ///
    /// Fails only if the OS cannot start the process; the caller decides how
    /// to report that.
    pub async fn start(settings: &ExecutorSettings) -> std::result::Result<Self, LaunchFailure> {
        let args = launch_args(settings);
        let binary_path = settings.node_path.clone();

        let mut cmd = Command::new(&binary_path);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| LaunchFailure::new(&binary_path, &args, e))?;

        let pipes = child
            .stdin
            .take()
            .zip(child.stdout.take())
            .zip(child.stderr.take());
        let Some(((stdin, stdout), stderr)) = pipes else {
            let _ = child.start_kill();
            return Err(LaunchFailure::new(
                &binary_path,
                &args,
                std::io::Error::other("failed to capture interpreter stdio"),
            ));
        };

        let pid = child.id();
        info!(pid, binary = %binary_path, "repl process started");

        let hub = StreamHub::new();
        let (state, _) = watch::channel(SessionState::Starting);
        let state = Arc::new(state);
        let (stop_tx, stop_rx) = oneshot::channel();

        let pump = spawn_pump(stdout, stderr, hub.clone());
        tokio::spawn(supervise(
            child,
            stop_rx,
            settings.stop_grace(),
            pump,
            hub.clone(),
            Arc::clone(&state),
        ));

        let session = Self {
            inner: Arc::new(Inner {
                binary_path,
                args,
                pid,
                stdin: tokio::sync::Mutex::new(Some(stdin)),
                hub,
                state,
                stop_tx: Mutex::new(Some(stop_tx)),
            }),
        };

        // A bare newline gets any banner flushed before the first job starts
        // listening, so it cannot be mistaken for program output.
        match session.write("\n").await {
            Ok(()) => {
                session.inner.state.send_if_modified(|s| {
                    let starting = *s == SessionState::Starting;
                    if starting {
                        *s = SessionState::Ready;
                    }
                    starting
                });
            }
            Err(err) => warn!(pid, error = %err, "failed to dismiss repl banner"),
        }

        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.pid
    }

    pub fn binary_path(&self) -> &str {
        &self.inner.binary_path
    }

    pub fn args(&self) -> &[String] {
        &self.inner.args
    }

    /// Subscribe to stdout/stderr chunks and the close event.
    pub fn subscribe(&self) -> Subscription {
        self.inner.hub.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.hub.listener_count()
    }

    /// Write raw text to the interpreter's stdin.
    pub async fn write(&self, data: &str) -> Result<()> {
        let mut guard = self.inner.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "session input is closed")
        })?;

        stdin.write_all(data.as_bytes()).await?;
        stdin.flush().await?;
        trace!(pid = self.inner.pid, bytes = data.len(), "wrote to repl stdin");
        Ok(())
    }

    /// Resolve once the process has exited and its output has drained.
    pub async fn closed(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|s| *s == SessionState::Closed).await;
    }

    /// Terminate the process and wait for it to close.
    ///
    /// The first call sends the stop request; later calls only wait. On an
    /// already closed session this returns immediately.
    pub async fn stop(&self) {
        let stop_tx = self
            .inner
            .stop_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(tx) = stop_tx {
            info!(pid = self.inner.pid, "stopping repl process");
            let _ = tx.send(());
        }

        self.inner.stdin.lock().await.take();
        self.closed().await;
    }
}

/// Read both pipes until EOF, publishing decoded chunks to the hub.
///
/// One task serves both streams and prefers stderr when both are readable,
/// so an error printed just before a sentinel reaches subscribers before the
/// sentinel does.
fn spawn_pump(
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
    hub: StreamHub,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut out_buf = vec![0u8; READ_BUF_SIZE];
        let mut err_buf = vec![0u8; READ_BUF_SIZE];
        let mut out = Utf8Chunker::new();
        let mut err = Utf8Chunker::new();
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            tokio::select! {
                biased;
                res = stderr.read(&mut err_buf), if err_open => {
                    err_open = publish_read(res, &err_buf, &mut err, &hub, "stderr", SessionEvent::Stderr);
                }
                res = stdout.read(&mut out_buf), if out_open => {
                    out_open = publish_read(res, &out_buf, &mut out, &hub, "stdout", SessionEvent::Stdout);
                }
            }
        }

        let rest = err.finish();
        if !rest.is_empty() {
            hub.publish(SessionEvent::Stderr(rest));
        }
        let rest = out.finish();
        if !rest.is_empty() {
            hub.publish(SessionEvent::Stdout(rest));
        }
        debug!("repl output streams ended");
    })
}

/// Publish one read; returns whether the stream is still open.
fn publish_read(
    res: std::io::Result<usize>,
    buf: &[u8],
    chunker: &mut Utf8Chunker,
    hub: &StreamHub,
    stream: &'static str,
    wrap: fn(String) -> SessionEvent,
) -> bool {
    match res {
        Ok(0) => {
            debug!(stream, "repl output stream reached EOF");
            false
        }
        Ok(n) => {
            trace!(stream, bytes = n, "repl output chunk");
            let text = chunker.decode(&buf[..n]);
            if !text.is_empty() {
                hub.publish(wrap(text));
            }
            true
        }
        Err(err) => {
            warn!(stream, error = %err, "reading repl output failed");
            false
        }
    }
}

/// Own the child until it exits, then close the hub and mark the session
/// closed. Runs exactly once per process, so the close event fires once.
async fn supervise(
    mut child: Child,
    mut stop_rx: oneshot::Receiver<()>,
    grace: Duration,
    pump: JoinHandle<()>,
    hub: StreamHub,
    state: Arc<watch::Sender<SessionState>>,
) {
    let pid = child.id();

    let status = tokio::select! {
        status = child.wait() => status,
        // Fires on an explicit stop and when every session handle is dropped.
        _ = &mut stop_rx => terminate(&mut child, grace).await,
    };

    match status {
        Ok(status) => info!(pid, code = ?status.code(), success = status.success(), "repl process exited"),
        Err(err) => warn!(pid, error = %err, "waiting for repl process failed"),
    }

    let _ = pump.await;

    hub.close();
    state.send_replace(SessionState::Closed);
    debug!(pid, "repl session closed");
}

/// Ask the process to exit, then kill it if it is still around after `grace`.
async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    send_graceful_signal(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                pid = child.id(),
                grace_ms = grace.as_millis() as u64,
                "repl did not exit after graceful signal; killing"
            );
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn send_graceful_signal(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let Ok(raw) = i32::try_from(pid) else {
        let _ = child.start_kill();
        return;
    };

    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(pid, error = %err, "SIGTERM failed; killing instead");
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn send_graceful_signal(child: &mut Child) {
    let _ = child.start_kill();
}
