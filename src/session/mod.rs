// src/session/mod.rs

//! The interactive interpreter process.
//!
//! - [`process`] launches the REPL, pumps its stdout/stderr and supervises
//!   its exit.
//! - [`hub`] fans output chunks out to job-scoped subscriptions.
//! - [`utf8`] decodes raw pipe reads into text.

pub mod hub;
pub mod process;
pub mod utf8;

pub use hub::{StreamHub, Subscription};
pub use process::{REPL_BOOTSTRAP, ReplSession, launch_args};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Process spawned, startup banner not yet dismissed.
    Starting,
    /// Accepting input.
    Ready,
    /// Process exited (or never launched). Terminal.
    Closed,
}

/// Something the process produced, as seen by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Stdout(String),
    Stderr(String),
    /// The process exited and both output streams have drained. Always the
    /// last event a subscription sees.
    Closed,
}
