//! Background job dispatch.
//!
//! Workflow code receives an `Arc<dyn TaskRunner>` and never learns whether the job
//! ran inline or on the background worker.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, warn};

use crate::config::TaskRunnerKind;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait TaskRunner: Send + Sync {
    fn run(&self, job: Job);

    fn name(&self) -> &'static str;
}

/// Executes every job immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineTaskRunner;

impl TaskRunner for InlineTaskRunner {
    fn run(&self, job: Job) {
        job();
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// Queues jobs for a tokio worker that executes them on the blocking pool.
///
/// When the worker is gone the job runs inline instead of being dropped.
pub struct QueuedTaskRunner {
    sender: UnboundedSender<Job>,
}

impl QueuedTaskRunner {
    pub fn spawn(handle: &Handle) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        handle.spawn(async move {
            while let Some(job) = receiver.recv().await {
                if let Err(err) = tokio::task::spawn_blocking(job).await {
                    error!(error = %err, "background job failed");
                }
            }
            debug!("task queue closed");
        });
        Self { sender }
    }
}

impl TaskRunner for QueuedTaskRunner {
    fn run(&self, job: Job) {
        if let Err(mpsc::error::SendError(job)) = self.sender.send(job) {
            warn!("task queue unavailable, running job inline");
            job();
        }
    }

    fn name(&self) -> &'static str {
        "queue"
    }
}

/// Build the runner selected by configuration. A queue needs a tokio runtime; without
/// one the inline runner is used.
pub fn task_runner(kind: TaskRunnerKind) -> Arc<dyn TaskRunner> {
    match kind {
        TaskRunnerKind::Inline => Arc::new(InlineTaskRunner),
        TaskRunnerKind::Queue => match Handle::try_current() {
            Ok(handle) => Arc::new(QueuedTaskRunner::spawn(&handle)),
            Err(_) => {
                warn!("no tokio runtime available for the task queue; running jobs inline");
                Arc::new(InlineTaskRunner)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn inline_runner_completes_before_returning() {
        let counter = Arc::new(AtomicUsize::new(0));
        let job_counter = counter.clone();
        InlineTaskRunner.run(Box::new(move || {
            job_counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn queued_runner_executes_in_background() {
        let runner = task_runner(TaskRunnerKind::Queue);
        assert_eq!(runner.name(), "queue");

        let (tx, rx) = std::sync::mpsc::channel();
        runner.run(Box::new(move || {
            tx.send(42).expect("receiver alive");
        }));

        let value = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .expect("join")
            .expect("job ran");
        assert_eq!(value, 42);
    }

    #[test]
    fn queue_falls_back_to_inline_without_runtime() {
        let runner = task_runner(TaskRunnerKind::Queue);
        assert_eq!(runner.name(), "inline");
    }

    #[test]
    fn closed_queue_runs_job_inline() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime builds");
        let runner = QueuedTaskRunner::spawn(runtime.handle());
        drop(runtime);

        let counter = Arc::new(AtomicUsize::new(0));
        let job_counter = counter.clone();
        runner.run(Box::new(move || {
            job_counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
