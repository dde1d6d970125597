use crate::task::{CompletionSignal, TaskError, TaskHandle};
use crate::Result;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Whether queued work may be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// Queued tasks can be purged; they resolve as [`TaskError::Purged`].
    CancelSafe,
    /// Every submitted task runs.
    RunToCompletion,
}

/// A named worker pool handing out [`TaskHandle`]s.
///
/// Purging bumps an epoch; closures captured under an older epoch skip their
/// body when a worker picks them up. Tasks already running are unaffected.
pub struct Executor {
    name: String,
    kind: ExecutorKind,
    pool: rayon::ThreadPool,
    inflight_jobs: Arc<AtomicUsize>,
    epoch: Arc<AtomicU64>,
    signal: Arc<CompletionSignal>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("threads", &self.pool.current_num_threads())
            .field("inflight", &self.load())
            .finish()
    }
}

struct JobGuard(Arc<AtomicUsize>);

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Executor {
    pub fn new(name: &str, num_threads: usize, kind: ExecutorKind) -> Result<Self> {
        let name_clone = name.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(move |idx| format!("{}-{}", name_clone, idx))
            .build()
            .map_err(|e| crate::Error::RuntimeError(format!("Failed to build thread pool: {}", e)))?;

        tracing::debug!(name, threads = pool.current_num_threads(), ?kind, "executor started");
        Ok(Self {
            name: name.to_string(),
            kind,
            pool,
            inflight_jobs: Arc::new(AtomicUsize::new(0)),
            epoch: Arc::new(AtomicU64::new(0)),
            signal: Arc::new(CompletionSignal::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ExecutorKind {
        self.kind
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn signal(&self) -> Arc<CompletionSignal> {
        self.signal.clone()
    }

    /// Queues `f` and returns a handle resolving to its output.
    pub fn submit<F, T>(&self, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (promise, handle) = TaskHandle::pair(self.signal.clone());
        let inflight = self.inflight_jobs.clone();
        let epoch = self.epoch.clone();
        let submitted_at = epoch.load(Ordering::SeqCst);
        inflight.fetch_add(1, Ordering::SeqCst);

        self.pool.spawn(move || {
            let _guard = JobGuard(inflight);
            if epoch.load(Ordering::SeqCst) != submitted_at {
                promise.fulfill(Err(TaskError::Purged));
                return;
            }
            let result = catch_unwind(AssertUnwindSafe(f)).map_err(|p| TaskError::Panicked(panic_message(p)));
            promise.fulfill(result);
        });
        handle
    }

    /// Fire-and-forget variant of [`Executor::submit`].
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        drop(self.submit(f));
    }

    /// Runs `f` inside this pool so nested rayon work uses its threads.
    pub fn install<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.inflight_jobs.fetch_add(1, Ordering::SeqCst);
        let _guard = JobGuard(self.inflight_jobs.clone());
        self.pool.install(f)
    }

    /// Discards queued tasks that have not started. No-op on a
    /// run-to-completion executor.
    pub fn purge(&self) {
        match self.kind {
            ExecutorKind::CancelSafe => {
                let e = self.epoch.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(name = %self.name, epoch = e + 1, "executor purged");
            }
            ExecutorKind::RunToCompletion => {
                tracing::trace!(name = %self.name, "purge ignored on run-to-completion executor");
            }
        }
    }

    pub fn load(&self) -> usize {
        self.inflight_jobs.load(Ordering::Relaxed)
    }
}
