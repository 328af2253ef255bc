// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod executor;
pub mod logging;
pub mod queue;
pub mod sentinel;
pub mod session;
pub mod sink;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ExecutorSettings, load_or_default};
use crate::executor::{JobOutcome, ReplExecutor, TracingReporter};
use crate::sentinel::{Sentinel, wrap_code};
use crate::session::launch_args;
use crate::sink::ConsoleSink;

pub use crate::executor::{ErrorReporter, Job};
pub use crate::sink::OutputSink;

/// One unit of work from the command line.
#[derive(Debug, Clone)]
pub struct Block {
    /// `--eval #N` or the file path, for logs.
    pub label: String,
    pub code: String,
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings (config file + CLI overrides)
/// - one executor and its REPL
/// - the console sink (and optional stdin forwarding)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let settings = resolve_settings(&args)?;
    let blocks = collect_blocks(&args)?;

    if args.dry_run {
        print_dry_run(&settings, &blocks)?;
        return Ok(());
    }

    if blocks.is_empty() {
        info!("no blocks given; nothing to run");
        return Ok(());
    }

    let executor = ReplExecutor::start(&settings, &TracingReporter).await;
    if executor.session().is_none() {
        bail!("could not launch interpreter '{}'", settings.node_path);
    }

    let sink = Arc::new(ConsoleSink::new());
    if args.forward_stdin {
        spawn_stdin_forwarder(Arc::clone(&sink));
    }

    // Everything is queued up front; the executor runs it in order.
    let completions: Vec<_> = blocks
        .iter()
        .map(|block| {
            debug!(block = %block.label, bytes = block.code.len(), "queueing block");
            (block.label.clone(), executor.run(block.code.clone(), sink.clone()))
        })
        .collect();

    let wait_all = async {
        let mut unfinished = Vec::new();
        for (label, completion) in completions {
            let outcome = completion.await;
            debug!(block = %label, ?outcome, "block resolved");
            if outcome != JobOutcome::Completed {
                unfinished.push(label);
            }
        }
        unfinished
    };

    let unfinished = tokio::select! {
        unfinished = wait_all => unfinished,
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
            info!("interrupted; stopping interpreter");
            vec!["(interrupted)".to_string()]
        }
    };

    executor.stop().await;

    if !unfinished.is_empty() {
        bail!("interpreter exited before these blocks finished: {unfinished:?}");
    }
    Ok(())
}

/// Config file first, then CLI flags on top.
fn resolve_settings(args: &CliArgs) -> Result<ExecutorSettings> {
    let base = load_or_default(args.config.as_deref()).context("loading settings")?;

    let node_path = args.node_path.clone().unwrap_or(base.node_path);
    let node_args = args.node_args.clone().or(base.node_args);

    let mut settings = ExecutorSettings::new(node_path, node_args)?;
    settings.stop_grace_ms = base.stop_grace_ms;
    Ok(settings)
}

/// `--eval` blocks in order, then files in order.
fn collect_blocks(args: &CliArgs) -> Result<Vec<Block>> {
    let mut blocks: Vec<Block> = args
        .eval
        .iter()
        .enumerate()
        .map(|(i, code)| Block {
            label: format!("--eval #{}", i + 1),
            code: code.clone(),
        })
        .collect();

    for path in &args.files {
        blocks.push(read_block(path)?);
    }
    Ok(blocks)
}

fn read_block(path: &Path) -> Result<Block> {
    let code = std::fs::read_to_string(path)
        .with_context(|| format!("reading block from {}", path.display()))?;
    Ok(Block {
        label: path.display().to_string(),
        code,
    })
}

/// Forward terminal lines to whichever block is running.
fn spawn_stdin_forwarder(sink: Arc<ConsoleSink>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => sink.send_input(format!("{line}\n")),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "reading terminal input failed");
                    break;
                }
            }
        }
        debug!("stdin forwarder finished");
    });
}

/// Dry-run output: the launch command and every wrapped block.
fn print_dry_run(settings: &ExecutorSettings, blocks: &[Block]) -> Result<()> {
    println!("replrun dry-run");
    println!("  node.path = {}", settings.node_path);
    println!("  node.args = {:?}", settings.extra_args());
    println!("  node.stop_grace_ms = {}", settings.stop_grace_ms);
    println!("  launch = {} {:?}", settings.node_path, launch_args(settings));
    println!();

    println!("blocks ({}):", blocks.len());
    for block in blocks {
        let sentinel = Sentinel::for_code(&block.code);
        println!("  - {}", block.label);
        println!("{}", wrap_code(&block.code, &sentinel)?);
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
