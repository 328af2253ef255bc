#![allow(dead_code, unused_imports)]

pub use replrun_test_utils::builders::SettingsBuilder;
pub use replrun_test_utils::recording::{RecordingReporter, RecordingSink, SinkEvent};
pub use replrun_test_utils::{init_tracing, node_available, with_timeout};

use replrun::executor::{ReplExecutor, TracingReporter};

/// Start an executor on the `node` found on `PATH`, or `None` (after a note
/// on stderr) when there is none, so the calling test can bail out.
pub async fn start_node() -> Option<ReplExecutor> {
    init_tracing();

    if !node_available() {
        eprintln!("skipping: no `node` binary on PATH");
        return None;
    }

    let settings = SettingsBuilder::new().stop_grace_ms(500).build();
    Some(ReplExecutor::start(&settings, &TracingReporter).await)
}

/// Index of the first event matching `pred`.
pub fn position(events: &[SinkEvent], pred: impl Fn(&SinkEvent) -> bool) -> usize {
    events
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("no matching event in {events:?}"))
}
