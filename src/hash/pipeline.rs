// Worker pool module
// Bounded fan-out of jobs to hashing workers and fan-in of their outcomes

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;

/// Cooperative cancellation flag, cheap to clone and trip from any thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared state for one run: the progress counter and the cancel token
#[derive(Debug, Default)]
pub struct PipelineContext {
    processed: Arc<AtomicU64>,
    cancel: CancelToken,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context that observes an externally owned cancel token
    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self {
            processed: Arc::new(AtomicU64::new(0)),
            cancel,
        }
    }

    /// Paths processed so far, successful or not
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Handle for readers on other threads (the progress reporter)
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.processed)
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn mark_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// What happened to the jobs of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct DrainReport {
    /// Jobs handed to the queue
    pub dispatched: u64,
    /// Jobs that produced an outcome
    pub completed: u64,
    pub cancelled: bool,
}

impl DrainReport {
    /// Every dispatched job produced exactly one outcome
    pub fn is_complete(&self) -> bool {
        self.dispatched == self.completed
    }
}

/// Fixed-size pool of workers fed through a bounded queue
#[derive(Debug, Clone)]
pub struct Dispatcher {
    workers: usize,
    queue_capacity: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl Dispatcher {
    /// Pool of `workers` threads (at least one), queue capacity `4 * workers`
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            queue_capacity: workers * 4,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` over every job and feed each result to `sink`.
    ///
    /// A producer thread fills the job queue and blocks while it is full.
    /// `sink` runs on the calling thread, once per outcome, in completion
    /// order. Returns only after every worker has exited.
    pub fn run<J, O, I, F, S>(
        &self,
        ctx: &PipelineContext,
        jobs: I,
        work: F,
        mut sink: S,
    ) -> DrainReport
    where
        J: Send,
        O: Send,
        I: IntoIterator<Item = J>,
        I::IntoIter: Send,
        F: Fn(J) -> O + Sync,
        S: FnMut(O),
    {
        let (job_tx, job_rx) = bounded::<J>(self.queue_capacity);
        let (result_tx, result_rx) = bounded::<O>(self.queue_capacity);
        let jobs = jobs.into_iter();
        let work = &work;

        thread::scope(|scope| {
            let producer = scope.spawn(move || {
                let mut dispatched = 0u64;
                for job in jobs {
                    if ctx.is_cancelled() {
                        break;
                    }
                    // Fails only once every worker is gone
                    if job_tx.send(job).is_err() {
                        break;
                    }
                    dispatched += 1;
                }
                dispatched
            });

            for _ in 0..self.workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    while !ctx.is_cancelled() {
                        let Ok(job) = job_rx.recv() else {
                            break;
                        };
                        let outcome = work(job);
                        ctx.mark_processed();
                        if result_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }

            // Workers hold the only remaining ends
            drop(job_rx);
            drop(result_tx);

            let mut completed = 0u64;
            for outcome in result_rx.iter() {
                sink(outcome);
                completed += 1;
            }

            let dispatched = producer
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

            DrainReport {
                dispatched,
                completed,
                cancelled: ctx.is_cancelled(),
            }
        })
    }
}
