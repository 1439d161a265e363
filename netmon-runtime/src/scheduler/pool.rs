use crate::error::{ActivityResult, SchedulerError};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Outcome of [`WorkerPool::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// Every worker is busy. The job was dropped without running.
    Rejected,
}

/// Fixed-capacity pool of worker threads.
///
/// Jobs run on the blocking threads of a dedicated tokio runtime. A semaphore
/// holds one permit per worker, so submission never queues: it either takes a
/// permit or is rejected on the spot.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, SchedulerError> {
        let size = size.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(size)
            .thread_name("activity-worker")
            .enable_all()
            .build()
            .map_err(|source| SchedulerError::PoolConstruction {
                threads: size,
                source,
            })?;

        info!(threads = size, "Worker pool ready");
        Ok(Self {
            runtime: Some(runtime),
            permits: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers currently free to take a job.
    pub fn available(&self) -> usize {
        if self.runtime.is_none() {
            return 0;
        }
        self.permits.available_permits()
    }

    pub fn busy(&self) -> usize {
        self.size - self.permits.available_permits().min(self.size)
    }

    /// Hand `job` to a free worker. Errors and panics inside the job are
    /// logged here and never reach the submitter.
    pub fn submit<F>(&self, label: &str, job: F) -> Submission
    where
        F: FnOnce() -> ActivityResult + Send + 'static,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            debug!(activity = label, "Worker pool is shut down, rejecting job");
            return Submission::Rejected;
        };
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(activity = label, "Worker pool saturated, rejecting job");
                return Submission::Rejected;
            }
        };

        let label = label.to_string();
        runtime.spawn(async move {
            let outcome = tokio::task::spawn_blocking(job).await;
            drop(permit);
            match outcome {
                Ok(Ok(())) => debug!(activity = %label, "Activity completed"),
                Ok(Err(e)) => warn!(activity = %label, error = %e, "Activity failed"),
                Err(e) if e.is_panic() => error!(activity = %label, "Activity panicked"),
                Err(e) => warn!(activity = %label, error = %e, "Activity did not complete"),
            }
        });
        Submission::Accepted
    }

    /// Stop accepting jobs and wait for the in-flight ones to return.
    pub fn shutdown(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        // A runtime cannot block or be dropped from inside another runtime.
        if tokio::runtime::Handle::try_current().is_ok() {
            warn!(
                busy = self.busy(),
                "Worker pool shut down from an async context, not waiting for in-flight activities"
            );
            runtime.shutdown_background();
            return;
        }

        let busy = self.busy();
        if busy > 0 {
            info!(busy, "Waiting for in-flight activities to finish");
        }
        let all = runtime.block_on(self.permits.clone().acquire_many_owned(self.size as u32));
        drop(all);
        self.permits.close();
        drop(runtime);
        debug!("Worker pool drained");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
