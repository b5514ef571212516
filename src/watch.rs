use crate::error::WatchError;
use log::{debug, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

/// Tells a front end when a previously computed size no longer matches disk.
pub struct ReportWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    events: Receiver<PathBuf>,
    stale: bool,
}

impl ReportWatcher {
    pub fn watch<P: AsRef<Path>>(path: P) -> Result<Self, WatchError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(WatchError::PathNotFound { path });
        }

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if changes_size(&event.kind) => {
                for changed in event.paths {
                    let _ = tx.send(changed);
                }
            }
            Ok(_) => {}
            Err(err) => warn!("watch error: {}", err),
        })?;
        watcher.watch(&path, RecursiveMode::Recursive)?;
        debug!("watching {} for changes", path.display());

        Ok(Self {
            path,
            _watcher: watcher,
            events: rx,
            stale: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drain pending events without blocking.
    pub fn is_stale(&mut self) -> bool {
        while let Ok(changed) = self.events.try_recv() {
            self.mark(changed);
        }
        self.stale
    }

    /// Block up to `timeout` for the tree to change.
    pub fn wait_stale(&mut self, timeout: Duration) -> bool {
        if self.is_stale() {
            return true;
        }
        match self.events.recv_timeout(timeout) {
            Ok(changed) => {
                self.mark(changed);
                self.is_stale()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Forget changes seen so far, after the caller has recomputed.
    pub fn refresh(&mut self) {
        while self.events.try_recv().is_ok() {}
        self.stale = false;
    }

    fn mark(&mut self, changed: PathBuf) {
        debug!("{} changed under {}", changed.display(), self.path.display());
        self.stale = true;
    }
}

fn changes_size(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}
