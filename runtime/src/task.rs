use crate::progress::CancellationToken;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Why a task produced no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task was cancelled")]
    Cancelled,
    #[error("task was purged from the queue before it started")]
    Purged,
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task was dropped without producing a result")]
    Dropped,
}

/// Generation counter bumped whenever any task of an executor settles.
///
/// Waiters read the generation, check their handles, then sleep until the
/// generation moves or the poll interval elapses.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    generation: Mutex<u64>,
    cv: Condvar,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    pub fn notify(&self) {
        let mut g = self.generation.lock();
        *g = g.wrapping_add(1);
        self.cv.notify_all();
    }

    /// Returns `true` if the generation moved past `seen` before `timeout`.
    pub fn wait_for(&self, seen: u64, timeout: Duration) -> bool {
        let mut g = self.generation.lock();
        if *g != seen {
            return true;
        }
        self.cv.wait_for(&mut g, timeout);
        *g != seen
    }
}

/// Producer side of a task result. Dropping an unfulfilled promise resolves
/// the handle with [`TaskError::Dropped`].
pub struct Promise<T> {
    tx: Option<oneshot::Sender<Result<T, TaskError>>>,
    signal: Arc<CompletionSignal>,
}

impl<T> Promise<T> {
    pub fn fulfill(mut self, result: Result<T, TaskError>) {
        if let Some(tx) = self.tx.take() {
            // The receiver may be gone already; nobody is interested then.
            let _ = tx.send(result);
        }
        self.signal.notify();
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            self.signal.notify();
        }
    }
}

/// Consumer side of a task result.
pub struct TaskHandle<T> {
    rx: Option<oneshot::Receiver<Result<T, TaskError>>>,
    settled: Option<Result<T, TaskError>>,
    signal: Arc<CompletionSignal>,
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("settled", &self.settled.is_some())
            .finish()
    }
}

impl<T> TaskHandle<T> {
    /// Creates a connected promise/handle pair sharing `signal`.
    pub fn pair(signal: Arc<CompletionSignal>) -> (Promise<T>, TaskHandle<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Promise { tx: Some(tx), signal: signal.clone() },
            TaskHandle { rx: Some(rx), settled: None, signal },
        )
    }

    /// A handle that is already resolved.
    pub fn ready(result: Result<T, TaskError>) -> TaskHandle<T> {
        TaskHandle {
            rx: None,
            settled: Some(result),
            signal: Arc::new(CompletionSignal::new()),
        }
    }

    pub fn is_ready(&mut self) -> bool {
        if self.settled.is_some() {
            return true;
        }
        let Some(rx) = self.rx.as_mut() else {
            return false;
        };
        match rx.try_recv() {
            Ok(result) => self.settled = Some(result),
            Err(oneshot::error::TryRecvError::Empty) => return false,
            Err(oneshot::error::TryRecvError::Closed) => self.settled = Some(Err(TaskError::Dropped)),
        }
        self.rx = None;
        true
    }

    /// Waits up to `timeout` for the result.
    pub fn wait_timeout(&mut self, timeout: Duration) -> bool {
        let seen = self.signal.generation();
        if self.is_ready() {
            return true;
        }
        self.signal.wait_for(seen, timeout);
        self.is_ready()
    }

    /// Blocks until the task settles. Must not be called from inside an
    /// async runtime.
    pub fn get(mut self) -> Result<T, TaskError> {
        if let Some(result) = self.settled.take() {
            return result;
        }
        match self.rx.take() {
            Some(rx) => rx.blocking_recv().unwrap_or(Err(TaskError::Dropped)),
            None => Err(TaskError::Dropped),
        }
    }
}

/// Waits for every handle, checking `cancel` between polls.
///
/// Returns [`TaskError::Cancelled`] as soon as cancellation is observed;
/// the handles are dropped and their tasks keep running or get purged by
/// the owner. Otherwise the per-task results come back in input order.
pub fn wait_all<T>(
    mut handles: Vec<TaskHandle<T>>,
    cancel: &CancellationToken,
    poll: Duration,
) -> Result<Vec<Result<T, TaskError>>, TaskError> {
    loop {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        let pending = handles.iter_mut().position(|h| !h.is_ready());
        match pending {
            None => break,
            Some(idx) => {
                handles[idx].wait_timeout(poll);
            }
        }
    }
    Ok(handles.into_iter().map(TaskHandle::get).collect())
}
