// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `replrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "replrun",
    version,
    about = "Run JavaScript blocks, one after another, in a single long-lived Node.js REPL.",
    long_about = None
)]
pub struct CliArgs {
    /// Files whose contents are run as one block each, after any `--eval`.
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Code to run as a block. Repeatable; runs in the order given.
    #[arg(short = 'e', long = "eval", value_name = "CODE")]
    pub eval: Vec<String>,

    /// Path to the config file (TOML).
    ///
    /// Default: `Replrun.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Interpreter binary; overrides `[node].path`.
    #[arg(long, value_name = "PATH")]
    pub node_path: Option<String>,

    /// Extra interpreter arguments, space separated; overrides `[node].args`.
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    pub node_args: Option<String>,

    /// Forward lines typed on this terminal to the running block.
    #[arg(long)]
    pub forward_stdin: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `REPLRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the interpreter command and wrapped blocks without running anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
