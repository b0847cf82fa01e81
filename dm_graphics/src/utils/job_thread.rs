/// Background job thread with a worker-side process phase and a
/// caller-side completion phase.
///
/// `push_job` queues a pair of closures. The process closure runs on the
/// worker thread (or inline inside `update` when the thread was created
/// non-threaded). Its result is handed to the completion closure, which
/// always runs on the thread that calls `update`, i.e. the render thread.
///
/// Jobs are processed strictly in push order by a single worker, so a job
/// pushed after another one observes all of its side effects.

use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, SendError, Sender};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

type ProcessFn = Box<dyn FnOnce() -> Result<()> + Send>;
type CompleteFn = Box<dyn FnOnce(Result<()>) + Send>;

struct Job {
    process: ProcessFn,
    complete: CompleteFn,
}

struct FinishedJob {
    complete: CompleteFn,
    result: Result<()>,
}

pub struct JobThread {
    /// Worker queue; `None` when jobs are processed inline
    sender: Option<Sender<Job>>,
    inline_queue: VecDeque<Job>,
    finished_tx: Sender<FinishedJob>,
    finished_rx: Receiver<FinishedJob>,
    worker: Option<JoinHandle<()>>,
    /// Jobs pushed whose completion has not run yet
    pending: Arc<AtomicUsize>,
}

impl JobThread {
    /// Create a job thread
    ///
    /// With `threaded == false` no OS thread is spawned and the process
    /// phase runs inside `update`, which keeps tests deterministic.
    pub fn new(threaded: bool) -> Result<Self> {
        let (finished_tx, finished_rx) = crossbeam_channel::unbounded::<FinishedJob>();

        let (sender, worker) = if threaded {
            let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
            let worker_finished_tx = finished_tx.clone();
            let handle = std::thread::Builder::new()
                .name("dmgraphics-jobs".to_string())
                .spawn(move || {
                    while let Ok(job) = job_rx.recv() {
                        let result = run_process(job.process);
                        let finished = FinishedJob { complete: job.complete, result };
                        if worker_finished_tx.send(finished).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| {
                    crate::dm_error!("dmgraphics::jobs", "Failed to spawn job thread: {}", e);
                    Error::InitializationFailed(format!("Failed to spawn job thread: {}", e))
                })?;
            (Some(job_tx), Some(handle))
        } else {
            (None, None)
        };

        Ok(Self {
            sender,
            inline_queue: VecDeque::new(),
            finished_tx,
            finished_rx,
            worker,
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn is_threaded(&self) -> bool {
        self.sender.is_some()
    }

    /// Queue a job
    pub fn push_job<P, C>(&mut self, process: P, complete: C)
    where
        P: FnOnce() -> Result<()> + Send + 'static,
        C: FnOnce(Result<()>) + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let job = Job { process: Box::new(process), complete: Box::new(complete) };

        match &self.sender {
            Some(sender) => {
                if let Err(SendError(job)) = sender.send(job) {
                    // Worker is gone; fall back to inline processing
                    crate::dm_warn!("dmgraphics::jobs", "Job thread stopped, processing job inline");
                    self.inline_queue.push_back(job);
                }
            }
            None => self.inline_queue.push_back(job),
        }
    }

    /// Run completions of finished jobs on the calling thread
    ///
    /// Inline jobs are processed first. Returns the number of completions run.
    pub fn update(&mut self) -> usize {
        while let Some(job) = self.inline_queue.pop_front() {
            let result = run_process(job.process);
            // The receiver lives in self, the send cannot fail
            let _ = self.finished_tx.send(FinishedJob { complete: job.complete, result });
        }

        let mut completed = 0;
        while let Ok(finished) = self.finished_rx.try_recv() {
            self.complete(finished);
            completed += 1;
        }
        completed
    }

    /// Number of jobs whose completion has not run yet
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Block until every pushed job has completed
    pub fn wait_idle(&mut self) {
        self.update();
        while self.has_pending() {
            match self.finished_rx.recv() {
                Ok(finished) => self.complete(finished),
                Err(_) => break,
            }
            self.update();
        }
    }

    fn complete(&mut self, finished: FinishedJob) {
        (finished.complete)(finished.result);
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Run a process closure, turning a panic into an error for its completion
fn run_process(process: ProcessFn) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(process)).unwrap_or_else(|payload| {
        let reason = panic_reason(payload.as_ref());
        crate::dm_error!("dmgraphics::jobs", "Job panicked: {}", reason);
        Err(Error::BackendError(format!("Job panicked: {}", reason)))
    })
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Drop for JobThread {
    fn drop(&mut self) {
        // Closing the queue ends the worker loop
        self.sender = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
#[path = "job_thread_tests.rs"]
mod tests;
