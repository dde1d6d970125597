//! Task execution for the stitching pipeline.
//!
//! Two kinds of [`Executor`] exist. A cancel-safe pool can drop its queued,
//! not yet started work with [`Executor::purge`]; a run-to-completion pool
//! never does, and is reserved for work that must not be interrupted.
//! Submitted closures resolve exactly once through a [`TaskHandle`], and
//! long-running work reports into a shared [`ProgressMonitor`].

pub mod executor;
pub mod progress;
pub mod task;

pub use executor::{Executor, ExecutorKind};
pub use progress::{CancellationToken, ProgressMonitor, ProgressReport, ProgressType};
pub use task::{wait_all, CompletionSignal, Promise, TaskError, TaskHandle};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
