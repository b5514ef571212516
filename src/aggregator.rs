use crate::error::TraversalError;
use crate::options::{AggregatorOptions, LinkPolicy, UnreadablePolicy};
use log::{debug, trace, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, DirEntry};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Snapshot of the bytes held by regular files under a directory.
///
/// Not a live value: it goes stale as soon as the tree changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeReport {
    pub path: PathBuf,
    pub total_bytes: u64,
    /// Regular files counted.
    pub files: u64,
    /// Directories descended into, the root excluded.
    pub dirs: u64,
    pub skipped_links: u64,
    /// Entries treated as empty because they could not be read.
    pub unreadable: Vec<PathBuf>,
}

impl SizeReport {
    fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            total_bytes: 0,
            files: 0,
            dirs: 0,
            skipped_links: 0,
            unreadable: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.unreadable.is_empty()
    }
}

/// Sums regular file sizes below a directory.
///
/// Each call is independent: nothing is cached between calls and no state
/// is shared, so one aggregator can serve many threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeAggregator {
    options: AggregatorOptions,
}

impl SizeAggregator {
    pub fn new(options: AggregatorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> AggregatorOptions {
        self.options
    }

    pub fn compute_size<P: AsRef<Path>>(&self, path: P) -> Result<SizeReport, TraversalError> {
        let never = AtomicBool::new(false);
        self.compute_size_cancellable(path, &never)
    }

    /// Like [`compute_size`](Self::compute_size), but gives up with
    /// [`TraversalError::Cancelled`] once `cancel` is set. The flag is
    /// checked before each directory listing.
    pub fn compute_size_cancellable<P: AsRef<Path>>(
        &self,
        path: P,
        cancel: &AtomicBool,
    ) -> Result<SizeReport, TraversalError> {
        let path = path.as_ref();
        let start = Instant::now();

        let canonical_root = open_root(path)?;
        let mut walk = Walk::new(self.options, path);
        walk.visited_dirs.insert(canonical_root);

        let report = walk.run(cancel)?;
        debug!(
            "sized {} in {}ms: {} bytes, {} files, {} dirs",
            path.display(),
            start.elapsed().as_millis(),
            report.total_bytes,
            report.files,
            report.dirs
        );
        Ok(report)
    }
}

/// Compute the size of `path` with default options.
pub fn compute_size<P: AsRef<Path>>(path: P) -> Result<SizeReport, TraversalError> {
    SizeAggregator::default().compute_size(path)
}

/// Resolve the root, which must be a directory (possibly through a link).
pub(crate) fn open_root(path: &Path) -> Result<PathBuf, TraversalError> {
    let metadata = fs::metadata(path).map_err(|err| TraversalError::from_io(path, err))?;
    if !metadata.is_dir() {
        return Err(TraversalError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    fs::canonicalize(path).map_err(|err| TraversalError::from_io(path, err))
}

fn read_entries(dir: &Path) -> Result<Vec<DirEntry>, TraversalError> {
    fs::read_dir(dir)
        .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
        .map_err(|err| TraversalError::from_io(dir, err))
}

/// State of one traversal: explicit work-list instead of recursion.
struct Walk {
    options: AggregatorOptions,
    report: SizeReport,
    pending: Vec<PathBuf>,
    visited_dirs: HashSet<PathBuf>,
    counted_files: HashSet<PathBuf>,
}

impl Walk {
    fn new(options: AggregatorOptions, root: &Path) -> Self {
        Self {
            options,
            report: SizeReport::empty(root),
            pending: Vec::new(),
            visited_dirs: HashSet::new(),
            counted_files: HashSet::new(),
        }
    }

    fn run(mut self, cancel: &AtomicBool) -> Result<SizeReport, TraversalError> {
        let root = self.report.path.clone();
        let cancelled = || TraversalError::Cancelled { path: root.clone() };

        if cancel.load(Ordering::Relaxed) {
            return Err(cancelled());
        }
        // The root must be listable whatever the policy says.
        let entries = read_entries(&root)?;
        self.visit_all(entries)?;

        while let Some(dir) = self.pending.pop() {
            if cancel.load(Ordering::Relaxed) {
                return Err(cancelled());
            }
            match read_entries(&dir) {
                Ok(entries) => self.visit_all(entries)?,
                Err(err) => self.tolerate(err)?,
            }
        }

        Ok(self.report)
    }

    fn visit_all(&mut self, entries: Vec<DirEntry>) -> Result<(), TraversalError> {
        for entry in entries {
            if let Err(err) = self.visit(&entry) {
                self.tolerate(err)?;
            }
        }
        Ok(())
    }

    fn visit(&mut self, entry: &DirEntry) -> Result<(), TraversalError> {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|err| TraversalError::from_io(&path, err))?;

        if file_type.is_dir() {
            self.push_dir(path)
        } else if file_type.is_file() {
            let len = entry
                .metadata()
                .map_err(|err| TraversalError::from_io(&path, err))?
                .len();
            self.add_file(&path, len)
        } else if file_type.is_symlink() {
            match self.options.links {
                LinkPolicy::Skip => {
                    self.report.skipped_links += 1;
                    Ok(())
                }
                LinkPolicy::Follow => self.follow_link(path),
            }
        } else {
            trace!("ignoring special entry {}", path.display());
            Ok(())
        }
    }

    fn follow_link(&mut self, path: PathBuf) -> Result<(), TraversalError> {
        // Dangling and self-referential links both end up here.
        let target = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!("unresolvable link {}: {}", path.display(), err);
                self.report.skipped_links += 1;
                return Ok(());
            }
        };

        if target.is_dir() {
            self.push_dir(path)
        } else if target.is_file() {
            self.add_file(&path, target.len())
        } else {
            trace!("link {} points at a special file", path.display());
            Ok(())
        }
    }

    fn push_dir(&mut self, path: PathBuf) -> Result<(), TraversalError> {
        // Without followed links every directory is reachable exactly once.
        if self.options.links == LinkPolicy::Follow {
            let canonical =
                fs::canonicalize(&path).map_err(|err| TraversalError::from_io(&path, err))?;
            if !self.visited_dirs.insert(canonical) {
                debug!("already visited {}", path.display());
                return Ok(());
            }
        }
        self.report.dirs += 1;
        self.pending.push(path);
        Ok(())
    }

    fn add_file(&mut self, path: &Path, len: u64) -> Result<(), TraversalError> {
        if self.options.links == LinkPolicy::Follow {
            let canonical =
                fs::canonicalize(path).map_err(|err| TraversalError::from_io(path, err))?;
            if !self.counted_files.insert(canonical) {
                return Ok(());
            }
        }
        self.report.files += 1;
        self.report.total_bytes = self.report.total_bytes.saturating_add(len);
        Ok(())
    }

    fn tolerate(&mut self, err: TraversalError) -> Result<(), TraversalError> {
        let fatal = self.options.unreadable == UnreadablePolicy::Abort
            || matches!(
                err,
                TraversalError::Cancelled { .. } | TraversalError::WorkerPanicked { .. }
            );
        if fatal {
            return Err(err);
        }
        warn!("counting unreadable entry as empty: {}", err);
        self.report.unreadable.push(err.path().to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, len: usize) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![b'x'; len]).unwrap();
    }

    #[test]
    fn test_nested_scenario() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "f1", 100);
        write(dir.path(), "f2", 250);
        write(dir.path(), "sub/f3", 50);

        let report = compute_size(dir.path()).unwrap();
        assert_eq!(report.total_bytes, 400);
        assert_eq!(report.files, 3);
        assert_eq!(report.dirs, 1);
        assert!(report.is_complete());
        assert_eq!(report.path, dir.path());
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let report = compute_size(dir.path()).unwrap();
        assert_eq!(report.total_bytes, 0);
        assert_eq!(report.files, 0);
    }

    #[test]
    fn test_file_root_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "plain.txt", 10);
        let err = compute_size(dir.path().join("plain.txt")).unwrap_err();
        assert!(matches!(err, TraversalError::NotADirectory { .. }));
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/b/c", 1);
        let cancel = AtomicBool::new(true);
        let err = SizeAggregator::default()
            .compute_size_cancellable(dir.path(), &cancel)
            .unwrap_err();
        assert!(matches!(err, TraversalError::Cancelled { .. }));
    }

    #[cfg(unix)]
    mod links {
        use super::*;
        use std::os::unix::fs::symlink;

        #[test]
        fn test_links_skipped_by_default() {
            let dir = TempDir::new().unwrap();
            let outside = TempDir::new().unwrap();
            write(outside.path(), "big", 4096);
            write(dir.path(), "small", 10);
            symlink(outside.path().join("big"), dir.path().join("to_big")).unwrap();
            symlink(outside.path(), dir.path().join("to_outside")).unwrap();

            let report = compute_size(dir.path()).unwrap();
            assert_eq!(report.total_bytes, 10);
            assert_eq!(report.skipped_links, 2);
        }

        #[test]
        fn test_follow_counts_link_targets_once() {
            let dir = TempDir::new().unwrap();
            let outside = TempDir::new().unwrap();
            write(outside.path(), "big", 4096);
            write(dir.path(), "small", 10);
            symlink(outside.path().join("big"), dir.path().join("to_big")).unwrap();
            symlink(outside.path(), dir.path().join("to_outside")).unwrap();
            symlink(dir.path().join("small"), dir.path().join("to_small")).unwrap();

            let aggregator = SizeAggregator::new(AggregatorOptions::default().follow_links(true));
            let report = aggregator.compute_size(dir.path()).unwrap();
            assert_eq!(report.total_bytes, 4096 + 10);
            assert_eq!(report.files, 2);
        }

        #[test]
        fn test_follow_survives_cycles() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "a/file", 7);
            symlink(dir.path(), dir.path().join("a/back_to_root")).unwrap();
            symlink(dir.path().join("a"), dir.path().join("a/self")).unwrap();
            symlink(dir.path().join("loop"), dir.path().join("loop")).unwrap();

            let aggregator = SizeAggregator::new(AggregatorOptions::default().follow_links(true));
            let report = aggregator.compute_size(dir.path()).unwrap();
            assert_eq!(report.total_bytes, 7);
            assert_eq!(report.dirs, 1);
            assert_eq!(report.skipped_links, 1);
        }

        #[test]
        fn test_root_may_be_a_link() {
            let dir = TempDir::new().unwrap();
            let holder = TempDir::new().unwrap();
            write(dir.path(), "f", 33);
            let link = holder.path().join("root_link");
            symlink(dir.path(), &link).unwrap();

            let report = compute_size(&link).unwrap();
            assert_eq!(report.total_bytes, 33);
            assert_eq!(report.path, link);
        }
    }
}
