//! Background render tasks.
//!
//! A render is a long, blocking job (it waits on external encoders), so
//! hosts run it on its own thread and either join the handle or get told
//! through a callback when it finishes.

use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

use crate::error::RenderError;
use crate::pipeline::{RenderJob, RenderReport};

pub type RenderResult = Result<RenderReport, RenderError>;

pub struct RenderTask;

impl RenderTask {
    /// Start `job` on a dedicated worker thread.
    pub fn spawn(job: RenderJob) -> Result<RenderHandle, RenderError> {
        Self::spawn_inner(job, |result| result)
    }

    /// Start `job` and hand its result to `on_done` on the worker thread
    /// once it finishes, panics included. The handle still yields the
    /// result when joined.
    pub fn spawn_with_callback<F>(job: RenderJob, on_done: F) -> Result<RenderHandle, RenderError>
    where
        F: FnOnce(&RenderResult) + Send + 'static,
    {
        Self::spawn_inner(job, move |result| {
            on_done(&result);
            result
        })
    }

    fn spawn_inner<F>(job: RenderJob, finish: F) -> Result<RenderHandle, RenderError>
    where
        F: FnOnce(RenderResult) -> RenderResult + Send + 'static,
    {
        let name = job
            .input()
            .file_stem()
            .map(|s| format!("render-{}", s.to_string_lossy()))
            .unwrap_or_else(|| "render".to_string());
        log::debug!("spawning worker '{name}'");

        let thread = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| job.run())).unwrap_or_else(|_| {
                    log::error!("render worker panicked");
                    Err(RenderError::WorkerPanicked)
                });
                finish(result)
            })
            .map_err(|e| RenderError::io("spawning render worker", e))?;
        Ok(RenderHandle { thread })
    }
}

/// Handle to a running render.
pub struct RenderHandle {
    thread: JoinHandle<RenderResult>,
}

impl RenderHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the render finishes. A panic on the worker, including
    /// one raised by a completion callback, becomes `RenderError::WorkerPanicked`.
    pub fn join(self) -> RenderResult {
        match self.thread.join() {
            Ok(result) => result,
            Err(_) => {
                log::error!("render worker panicked");
                Err(RenderError::WorkerPanicked)
            }
        }
    }
}
