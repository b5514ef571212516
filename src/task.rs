use crate::aggregator::{SizeAggregator, SizeReport};
use crate::error::TraversalError;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub type TaskResult = Result<SizeReport, TraversalError>;

/// A size computation running on its own thread.
///
/// Front ends poll [`try_result`](Self::try_result) from their event loop
/// and render the report once it arrives.
pub struct SizeTask {
    path: PathBuf,
    cancel: Arc<AtomicBool>,
    result_rx: Receiver<TaskResult>,
    finished: Option<TaskResult>,
}

impl SizeTask {
    pub fn spawn<P: AsRef<Path>>(aggregator: SizeAggregator, path: P) -> Self {
        Self::spawn_with(path.as_ref().to_path_buf(), move |path, cancel| {
            aggregator.compute_size_cancellable(path, cancel)
        })
    }

    /// Run `work` on a worker thread; a panic inside it is reported as
    /// [`TraversalError::WorkerPanicked`].
    fn spawn_with<F>(path: PathBuf, work: F) -> Self
    where
        F: FnOnce(&Path, &AtomicBool) -> TaskResult + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<TaskResult>();

        let worker_path = path.clone();
        let worker_cancel = cancel.clone();
        thread::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                work(&worker_path, &worker_cancel)
            }))
            .unwrap_or_else(|_| {
                Err(TraversalError::WorkerPanicked {
                    path: worker_path.clone(),
                })
            });
            // The receiver may be gone if the task handle was dropped.
            let _ = tx.send(result);
        });

        debug!("spawned size task for {}", path.display());
        Self {
            path,
            cancel,
            result_rx: rx,
            finished: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ask the worker to stop at its next directory boundary.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Non-blocking poll. Once the worker is done, every call returns its result.
    pub fn try_result(&mut self) -> Option<&TaskResult> {
        if self.finished.is_none() {
            match self.result_rx.try_recv() {
                Ok(result) => self.finished = Some(result),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    self.finished = Some(Err(self.lost_worker()));
                }
            }
        }
        self.finished.as_ref()
    }

    /// Block up to `timeout` for the result.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<&TaskResult> {
        if self.finished.is_none() {
            match self.result_rx.recv_timeout(timeout) {
                Ok(result) => self.finished = Some(result),
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => {
                    self.finished = Some(Err(self.lost_worker()));
                }
            }
        }
        self.finished.as_ref()
    }

    pub fn wait(mut self) -> TaskResult {
        if let Some(result) = self.finished.take() {
            return result;
        }
        self.result_rx.recv().unwrap_or_else(|_| Err(self.lost_worker()))
    }

    fn lost_worker(&self) -> TraversalError {
        TraversalError::WorkerPanicked {
            path: self.path.clone(),
        }
    }
}
