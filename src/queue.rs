// src/queue.rs

//! Generic FIFO job serializer.
//!
//! A [`JobQueue`] owns one background worker that hands jobs to a
//! [`Dispatch`] implementation strictly one at a time and in submission
//! order. The next job is not dispatched until the previous dispatch future
//! has resolved. Submitting is synchronous, so the order of `submit` calls is
//! the execution order even if the returned [`Completion`]s are awaited in a
//! different order (or never).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// What the queue does with each job.
///
/// Mirrors an executor backend: the queue owns the implementation and calls
/// it from its worker, so it may keep mutable state between jobs without
/// locking.
pub trait Dispatch: Send + 'static {
    type Job: Send + 'static;
    type Output: Send + 'static;

    /// Run one job to completion.
    fn dispatch(
        &mut self,
        job: Self::Job,
    ) -> Pin<Box<dyn Future<Output = Self::Output> + Send + '_>>;

    /// Outcome reported to a waiter whose job was never dispatched because
    /// the worker went away.
    fn abandoned() -> Self::Output;
}

struct Queued<D: Dispatch> {
    id: u64,
    job: D::Job,
    done: oneshot::Sender<D::Output>,
}

/// Handle for submitting jobs to a running worker.
pub struct JobQueue<D: Dispatch> {
    tx: mpsc::UnboundedSender<Queued<D>>,
    next_id: AtomicU64,
    pending: Arc<AtomicUsize>,
}

impl<D: Dispatch> std::fmt::Debug for JobQueue<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl<D: Dispatch> JobQueue<D> {
    /// Spawn the worker loop. Must be called inside a Tokio runtime.
    pub fn spawn(mut dispatcher: D) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Queued<D>>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);

        tokio::spawn(async move {
            debug!("job queue worker started");

            while let Some(queued) = rx.recv().await {
                debug!(job = queued.id, "dispatching job");
                let output = dispatcher.dispatch(queued.job).await;
                worker_pending.fetch_sub(1, Ordering::SeqCst);

                if queued.done.send(output).is_err() {
                    debug!(job = queued.id, "job finished but nobody is waiting for it");
                } else {
                    debug!(job = queued.id, "job finished");
                }
            }

            info!("job queue worker finished (all handles dropped)");
        });

        Self {
            tx,
            next_id: AtomicU64::new(0),
            pending,
        }
    }

    /// Enqueue a job behind everything submitted before it.
    pub fn submit(&self, job: D::Job) -> Completion<D::Output> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (done, rx) = oneshot::channel();

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Queued { id, job, done }).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            debug!(job = id, "job queue worker is gone; job not queued");
        }

        Completion {
            rx,
            fallback: D::abandoned,
        }
    }

    /// Jobs submitted but not yet finished, including the running one.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Resolves with a job's output once it has run.
///
/// Never fails: a job dropped without running resolves with the dispatcher's
/// [`Dispatch::abandoned`] value.
#[must_use = "a Completion does nothing unless awaited; the job runs regardless"]
pub struct Completion<T> {
    rx: oneshot::Receiver<T>,
    fallback: fn() -> T,
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

impl<T> Future for Completion<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let fallback = self.fallback;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| fallback()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records start/end of each job and sleeps in between, so overlapping
    /// dispatches would show up as interleaved entries.
    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Dispatch for Recorder {
        type Job = (String, u64);
        type Output = String;

        fn dispatch(
            &mut self,
            (name, delay_ms): Self::Job,
        ) -> Pin<Box<dyn Future<Output = String> + Send + '_>> {
            let log = Arc::clone(&self.log);
            Box::pin(async move {
                log.lock().unwrap().push(format!("start {name}"));
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                log.lock().unwrap().push(format!("end {name}"));
                name
            })
        }

        fn abandoned() -> String {
            "abandoned".to_string()
        }
    }

    #[tokio::test]
    async fn jobs_run_one_at_a_time_in_submission_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = JobQueue::spawn(Recorder { log: Arc::clone(&log) });

        // Longer jobs first: a concurrent queue would finish "c" first.
        let a = queue.submit(("a".into(), 30));
        let b = queue.submit(("b".into(), 10));
        let c = queue.submit(("c".into(), 0));

        // Await out of order; execution order must not change.
        assert_eq!(c.await, "c");
        assert_eq!(a.await, "a");
        assert_eq!(b.await, "b");

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start a", "end a", "start b", "end b", "start c", "end c"]
        );
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn dropped_completion_does_not_stall_the_queue() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = JobQueue::spawn(Recorder { log: Arc::clone(&log) });

        drop(queue.submit(("ignored".into(), 5)));
        assert_eq!(queue.submit(("next".into(), 0)).await, "next");
        assert_eq!(log.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn completion_falls_back_when_sender_is_dropped() {
        let (tx, rx) = oneshot::channel::<String>();
        drop(tx);
        let completion = Completion {
            rx,
            fallback: Recorder::abandoned,
        };
        assert_eq!(completion.await, "abandoned");
    }
}
