// tests/executor_blocks.rs
//
// End-to-end behaviour of queued blocks against a real `node` REPL. Every
// test returns early when no `node` binary is available.

mod common;
use crate::common::{RecordingSink, SinkEvent, position, start_node, with_timeout};

use std::error::Error;
use std::time::Duration;

use replrun::executor::JobOutcome;
use replrun::sentinel::SENTINEL_TAG;
use replrun::session::SessionState;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn output_round_trips_without_the_sentinel() -> TestResult {
    let Some(executor) = start_node().await else { return Ok(()) };
    let sink = RecordingSink::new();

    let outcome = with_timeout(executor.run(r#"console.log("hello")"#, sink.clone())).await;

    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(sink.stdout(), "hello\n");
    assert!(!sink.stdout().contains(SENTINEL_TAG));
    assert_eq!(sink.stderr(), "");

    executor.stop().await;
    Ok(())
}

#[tokio::test]
async fn sink_sees_queue_start_clear_then_output() -> TestResult {
    let Some(executor) = start_node().await else { return Ok(()) };
    let sink = RecordingSink::new();

    // `void` keeps the REPL from echoing the `true` that write() returns.
    with_timeout(executor.run(r#"void process.stdout.write("x")"#, sink.clone())).await;

    let events = sink.events();
    assert_eq!(
        &events[..3],
        &[SinkEvent::Queued, SinkEvent::Started, SinkEvent::Cleared]
    );
    assert_eq!(sink.stdout(), "x");

    executor.stop().await;
    Ok(())
}

#[tokio::test]
async fn block_without_output_still_resolves() -> TestResult {
    let Some(executor) = start_node().await else { return Ok(()) };
    let sink = RecordingSink::new();

    let outcome = with_timeout(executor.run("", sink.clone())).await;
    assert_eq!(outcome, JobOutcome::Completed);

    let outcome = with_timeout(executor.run("let quiet = 1;", sink.clone())).await;
    assert_eq!(outcome, JobOutcome::Completed);

    assert_eq!(sink.stdout(), "");
    executor.stop().await;
    Ok(())
}

#[tokio::test]
async fn thrown_error_goes_to_stderr_and_the_block_completes() -> TestResult {
    let Some(executor) = start_node().await else { return Ok(()) };
    let sink = RecordingSink::new();

    let outcome = with_timeout(executor.run(r#"throw new Error("boom")"#, sink.clone())).await;

    assert_eq!(outcome, JobOutcome::Completed);
    assert!(sink.stderr().contains("boom"), "stderr was {:?}", sink.stderr());
    assert_eq!(sink.stdout(), "", "the error must not reach stdout");

    // The REPL survived: the next block runs normally.
    let next = RecordingSink::new();
    let outcome = with_timeout(executor.run("console.log('still here')", next.clone())).await;
    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(next.stdout(), "still here\n");

    executor.stop().await;
    Ok(())
}

#[tokio::test]
async fn output_larger_than_the_pipe_buffer_completes_exactly() -> TestResult {
    let Some(executor) = start_node().await else { return Ok(()) };
    let sink = RecordingSink::new();

    // Far past the pipe buffer, so node's stdout is under backpressure when
    // the sentinel is written.
    let outcome = with_timeout(executor.run("console.log('y'.repeat(300000))", sink.clone())).await;

    assert_eq!(outcome, JobOutcome::Completed);
    let stdout = sink.stdout();
    assert_eq!(stdout.len(), 300_001);
    assert_eq!(stdout, format!("{}\n", "y".repeat(300_000)));
    assert!(!stdout.contains(SENTINEL_TAG));

    // The queue is not stuck behind the large block.
    let next = RecordingSink::new();
    let outcome = with_timeout(executor.run("console.log('after')", next.clone())).await;
    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(next.stdout(), "after\n");

    executor.stop().await;
    Ok(())
}

#[tokio::test]
async fn large_raw_write_keeps_the_sentinel_at_the_tail() -> TestResult {
    let Some(executor) = start_node().await else { return Ok(()) };
    let sink = RecordingSink::new();

    let outcome = with_timeout(
        executor.run("void process.stdout.write('z'.repeat(300000))", sink.clone()),
    )
    .await;

    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(sink.stdout(), "z".repeat(300_000));
    assert_eq!(sink.stderr(), "");

    executor.stop().await;
    Ok(())
}

#[tokio::test]
async fn blocks_run_in_submission_order_with_their_own_output() -> TestResult {
    let Some(executor) = start_node().await else { return Ok(()) };

    let sinks: Vec<_> = (0..5).map(|_| RecordingSink::new()).collect();
    let completions: Vec<_> = sinks
        .iter()
        .enumerate()
        .map(|(i, sink)| executor.run(format!("console.log('block {i}')"), sink.clone()))
        .collect();

    for completion in completions {
        assert_eq!(with_timeout(completion).await, JobOutcome::Completed);
    }

    for (i, sink) in sinks.iter().enumerate() {
        assert_eq!(sink.stdout(), format!("block {i}\n"));
    }

    executor.stop().await;
    Ok(())
}

#[tokio::test]
async fn second_block_waits_for_the_first_sentinel() -> TestResult {
    let Some(executor) = start_node().await else { return Ok(()) };
    let sink = RecordingSink::new();

    // Submitted back to back, never awaited individually.
    let first = executor.run(
        "const t0 = Date.now(); while (Date.now() - t0 < 200) {} console.log('first')",
        sink.clone(),
    );
    let second = executor.run("console.log('second')", sink.clone());

    assert_eq!(with_timeout(second).await, JobOutcome::Completed);
    assert_eq!(with_timeout(first).await, JobOutcome::Completed);

    let events = sink.events();
    let first_out = position(&events, |e| *e == SinkEvent::Out("first\n".into()));
    let second_start = events
        .iter()
        .enumerate()
        .filter(|(_, e)| **e == SinkEvent::Started)
        .map(|(i, _)| i)
        .nth(1)
        .expect("two started blocks");

    assert!(first_out < second_start, "events: {events:?}");
    assert_eq!(sink.stdout(), "first\nsecond\n");

    executor.stop().await;
    Ok(())
}

#[tokio::test]
async fn subscriptions_return_to_baseline_after_each_block() -> TestResult {
    let Some(executor) = start_node().await else { return Ok(()) };
    let sink = RecordingSink::new();

    assert_eq!(executor.listener_count(), 0);
    for code in ["console.log(1)", "throw new Error('x')", ""] {
        with_timeout(executor.run(code, sink.clone())).await;
        assert_eq!(executor.listener_count(), 0);
        assert_eq!(sink.input_listeners(), 0);
    }
    assert_eq!(executor.pending(), 0);

    executor.stop().await;
    Ok(())
}

#[tokio::test]
async fn sink_input_reaches_the_repl_only_while_a_block_runs() -> TestResult {
    let Some(executor) = start_node().await else { return Ok(()) };
    let sink = RecordingSink::new();

    // Nobody is listening before a block runs.
    assert_eq!(sink.send_input("void (globalThis.early = 1)\n"), 0);

    let busy = executor.run(
        "const t1 = Date.now(); while (Date.now() - t1 < 500) {}",
        sink.clone(),
    );

    with_timeout(async {
        while sink.input_listeners() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert_eq!(sink.send_input("void (globalThis.forwarded = 42)\n"), 1);

    assert_eq!(with_timeout(busy).await, JobOutcome::Completed);
    assert_eq!(sink.input_listeners(), 0);

    let check = RecordingSink::new();
    with_timeout(executor.run(
        "console.log(globalThis.forwarded, typeof globalThis.early)",
        check.clone(),
    ))
    .await;
    assert_eq!(check.stdout(), "42 undefined\n");

    executor.stop().await;
    Ok(())
}

#[tokio::test]
async fn state_is_ready_after_start() -> TestResult {
    let Some(executor) = start_node().await else { return Ok(()) };

    assert_eq!(executor.state(), SessionState::Ready);
    let session = executor.session().expect("live session");
    assert!(session.pid().is_some());
    assert_eq!(session.binary_path(), "node");
    assert_eq!(session.args()[0], "-e");

    executor.stop().await;
    assert_eq!(executor.state(), SessionState::Closed);
    assert_eq!(session.state(), SessionState::Closed);
    Ok(())
}
