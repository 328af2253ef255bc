// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplrunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Everything known about an interpreter process that could not be started.
///
/// Mirrors what the error reporter needs to render a useful message: the
/// binary, the exact argument string, whatever stdout had been produced so
/// far (always empty for a launch failure), the OS error and an exit-code
/// slot that stays `None` because the process never ran.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct LaunchFailure {
    pub binary_path: String,
    pub args: String,
    pub stdout: String,
    #[source]
    pub source: std::io::Error,
    pub exit_code: Option<i32>,
    pub message: String,
}

impl LaunchFailure {
    pub fn new(binary_path: &str, args: &[String], source: std::io::Error) -> Self {
        let message = format!("Error launching NodeJS process: {source}");
        Self {
            binary_path: binary_path.to_string(),
            args: args.join(" "),
            stdout: String::new(),
            source,
            exit_code: None,
            message,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ReplrunError>;
