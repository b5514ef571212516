use crate::aggregator::{open_root, SizeAggregator};
use crate::error::TraversalError;
use crate::options::{AggregatorOptions, LinkPolicy, UnreadablePolicy};
use dashmap::{DashMap, DashSet};
use jwalk::{Parallelism, WalkDir};
use log::{debug, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const PROGRESS_EMIT_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    Other,
}

impl EntryKind {
    fn of(file_type: &fs::FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

/// One row of a directory listing with its aggregated size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildSize {
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingReport {
    pub path: PathBuf,
    /// Largest first, ties broken by name.
    pub children: Vec<ChildSize>,
    pub total_bytes: u64,
    pub files: u64,
    pub dirs: u64,
    pub unreadable: Vec<PathBuf>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub entries_seen: u64,
    pub files: u64,
    pub dirs: u64,
    pub total_size: u64,
}

pub type ProgressReporter = Arc<dyn Fn(ScanProgress) + Send + Sync>;

#[derive(Default)]
struct Counters {
    entries_seen: AtomicU64,
    files: AtomicU64,
    dirs: AtomicU64,
    total_size: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            entries_seen: self.entries_seen.load(Ordering::Relaxed),
            files: self.files.load(Ordering::Relaxed),
            dirs: self.dirs.load(Ordering::Relaxed),
            total_size: self.total_size.load(Ordering::Relaxed),
        }
    }
}

/// Rate limit for progress callbacks shared by all worker threads.
struct ProgressThrottle<'a> {
    reporter: &'a Option<ProgressReporter>,
    started: Instant,
    last_emit_ms: AtomicU64,
}

impl<'a> ProgressThrottle<'a> {
    fn new(reporter: &'a Option<ProgressReporter>) -> Self {
        Self {
            reporter,
            started: Instant::now(),
            last_emit_ms: AtomicU64::new(0),
        }
    }

    /// True for at most one caller per interval.
    fn ready(&self) -> bool {
        let now_ms = self.started.elapsed().as_millis() as u64;
        let previous = self.last_emit_ms.load(Ordering::Relaxed);
        now_ms.saturating_sub(previous) >= PROGRESS_EMIT_INTERVAL_MS
            && self
                .last_emit_ms
                .compare_exchange(previous, now_ms, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
    }

    fn tick(&self, counters: &Counters) {
        if let Some(cb) = self.reporter {
            if self.ready() {
                cb(counters.snapshot());
            }
        }
    }
}

/// Parallel crawler that sizes every direct child of a directory in one pass.
pub struct ListingCrawler {
    options: AggregatorOptions,
}

impl ListingCrawler {
    pub fn new(options: AggregatorOptions) -> Self {
        Self { options }
    }

    /// Twice the core count, kept within 4..=64; walking is I/O bound.
    fn scan_threads() -> usize {
        let cores = std::thread::available_parallelism().map_or(4, |n| n.get());
        (cores * 2).clamp(4, 64)
    }

    /// First component of `path` below `root`, and whether `path` lies deeper.
    fn top_level_name(root: &Path, path: &Path) -> Option<(OsString, bool)> {
        let mut below = path.strip_prefix(root).ok()?.components();
        let child = below.next()?.as_os_str().to_os_string();
        Some((child, below.next().is_some()))
    }

    /// Map a path under the canonical root back under the requested one.
    fn rebase(requested: &Path, canonical: &Path, path: &Path) -> PathBuf {
        path.strip_prefix(canonical)
            .map(|rel| requested.join(rel))
            .unwrap_or_else(|_| path.to_path_buf())
    }

    fn walk_error(path: &Path, err: jwalk::Error) -> TraversalError {
        let message = err.to_string();
        let io_err = err.into_io_error().unwrap_or_else(|| io::Error::other(message));
        TraversalError::from_io(path, io_err)
    }

    fn tolerate(
        &self,
        err: TraversalError,
        unreadable: &DashSet<PathBuf>,
    ) -> Result<(), TraversalError> {
        match self.options.unreadable {
            UnreadablePolicy::Abort => Err(err),
            UnreadablePolicy::CountAsZero => {
                warn!("counting unreadable entry as empty: {}", err);
                unreadable.insert(err.path().to_path_buf());
                Ok(())
            }
        }
    }

    pub fn scan_children<P: AsRef<Path>>(&self, root: P) -> Result<ListingReport, TraversalError> {
        self.scan_children_with_progress(root, None)
    }

    pub fn scan_children_with_progress<P: AsRef<Path>>(
        &self,
        root: P,
        reporter: Option<ProgressReporter>,
    ) -> Result<ListingReport, TraversalError> {
        let requested = root.as_ref();
        let start = Instant::now();
        let canonical = open_root(requested)?;
        // The root itself must be listable regardless of policy.
        fs::read_dir(&canonical).map_err(|err| TraversalError::from_io(requested, err))?;

        let counters = Counters::default();
        let buckets: DashMap<OsString, ChildSize> = DashMap::new();
        let unreadable: DashSet<PathBuf> = DashSet::new();
        let scan_threads = Self::scan_threads();

        let scan = || match self.options.links {
            LinkPolicy::Skip => self.walk_shared(
                requested, &canonical, scan_threads, &counters, &buckets, &unreadable, &reporter,
            ),
            LinkPolicy::Follow => {
                self.size_each_child(requested, &counters, &buckets, &unreadable, &reporter)
            }
        };

        ThreadPoolBuilder::new()
            .num_threads(scan_threads)
            .build()
            .map(|pool| pool.install(scan))
            .unwrap_or_else(|_| scan())?;

        let progress = counters.snapshot();
        if let Some(cb) = &reporter {
            cb(progress);
        }

        let mut children: Vec<ChildSize> = buckets.into_iter().map(|(_, child)| child).collect();
        children.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));
        let mut unreadable: Vec<PathBuf> = unreadable.into_iter().collect();
        unreadable.sort();

        let report = ListingReport {
            path: requested.to_path_buf(),
            children,
            total_bytes: progress.total_size,
            files: progress.files,
            dirs: progress.dirs,
            unreadable,
            duration_ms: start.elapsed().as_millis(),
        };
        debug!(
            "listed {} children of {} in {}ms",
            report.children.len(),
            requested.display(),
            report.duration_ms
        );
        Ok(report)
    }

    /// One jwalk pass over the whole tree; every regular file is charged to
    /// the top-level child it lives under. Links are never resolved here.
    #[allow(clippy::too_many_arguments)]
    fn walk_shared(
        &self,
        requested: &Path,
        canonical: &Path,
        scan_threads: usize,
        counters: &Counters,
        buckets: &DashMap<OsString, ChildSize>,
        unreadable: &DashSet<PathBuf>,
        reporter: &Option<ProgressReporter>,
    ) -> Result<(), TraversalError> {
        let walker = WalkDir::new(canonical)
            .skip_hidden(false)
            .follow_links(false)
            .parallelism(Parallelism::RayonNewPool(scan_threads));

        let mut entries = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) if entry.depth == 0 => {}
                Ok(mut entry) => {
                    // jwalk reports a failed listing on the directory entry itself.
                    if let Some(err) = entry.read_children_error.take() {
                        let path = Self::rebase(requested, canonical, &entry.path());
                        self.tolerate(Self::walk_error(&path, err), unreadable)?;
                    }
                    entries.push(entry);
                }
                Err(err) => {
                    let path = err
                        .path()
                        .map(|p| Self::rebase(requested, canonical, p))
                        .unwrap_or_else(|| requested.to_path_buf());
                    self.tolerate(Self::walk_error(&path, err), unreadable)?;
                }
            }
        }

        let throttle = ProgressThrottle::new(reporter);

        entries.par_iter().try_for_each(|entry| {
            counters.entries_seen.fetch_add(1, Ordering::Relaxed);
            let path = entry.path();
            let Some((name, nested)) = Self::top_level_name(canonical, &path) else {
                return Ok(());
            };
            let kind = EntryKind::of(&entry.file_type);

            let size = match kind {
                EntryKind::File => match entry.metadata() {
                    Ok(metadata) => metadata.len(),
                    Err(err) => {
                        let shown = Self::rebase(requested, canonical, &path);
                        return self.tolerate(Self::walk_error(&shown, err), unreadable);
                    }
                },
                EntryKind::Directory => {
                    counters.dirs.fetch_add(1, Ordering::Relaxed);
                    0
                }
                EntryKind::Symlink | EntryKind::Other => 0,
            };

            if kind == EntryKind::File {
                counters.files.fetch_add(1, Ordering::Relaxed);
                counters.total_size.fetch_add(size, Ordering::Relaxed);
            }

            {
                let mut bucket = buckets.entry(name.clone()).or_insert_with(|| ChildSize {
                    name: name.to_string_lossy().into_owned(),
                    path: requested.join(&name),
                    kind: if nested { EntryKind::Directory } else { kind },
                    size: 0,
                });
                if !nested {
                    bucket.kind = kind;
                }
                bucket.size = bucket.size.saturating_add(size);
            }

            throttle.tick(counters);
            Ok(())
        })
    }

    /// Size each child independently with [`SizeAggregator`], so links are
    /// resolved under the same rules as a single-directory request.
    fn size_each_child(
        &self,
        requested: &Path,
        counters: &Counters,
        buckets: &DashMap<OsString, ChildSize>,
        unreadable: &DashSet<PathBuf>,
        reporter: &Option<ProgressReporter>,
    ) -> Result<(), TraversalError> {
        let entries = fs::read_dir(requested)
            .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
            .map_err(|err| TraversalError::from_io(requested, err))?;
        let aggregator = SizeAggregator::new(self.options);
        let throttle = ProgressThrottle::new(reporter);

        entries.par_iter().try_for_each(|entry| {
            let path = entry.path();
            let name = entry.file_name();
            counters.entries_seen.fetch_add(1, Ordering::Relaxed);

            let kind = match entry.file_type() {
                Ok(file_type) => EntryKind::of(&file_type),
                Err(err) => return self.tolerate(TraversalError::from_io(&path, err), unreadable),
            };
            let resolved = match kind {
                EntryKind::Symlink => fs::metadata(&path).ok(),
                _ => None,
            };
            let points_to_dir = resolved.as_ref().is_some_and(|m| m.is_dir());

            let size = if kind == EntryKind::Directory || points_to_dir {
                match aggregator.compute_size(&path) {
                    Ok(report) => {
                        counters.files.fetch_add(report.files, Ordering::Relaxed);
                        counters.dirs.fetch_add(report.dirs + 1, Ordering::Relaxed);
                        for path in report.unreadable {
                            unreadable.insert(path);
                        }
                        report.total_bytes
                    }
                    Err(err) => {
                        self.tolerate(err, unreadable)?;
                        0
                    }
                }
            } else {
                let (len, counted) = match (kind, &resolved) {
                    (EntryKind::File, _) => match entry.metadata() {
                        Ok(metadata) => (metadata.len(), true),
                        Err(err) => {
                            return self.tolerate(TraversalError::from_io(&path, err), unreadable)
                        }
                    },
                    (EntryKind::Symlink, Some(target)) if target.is_file() => (target.len(), true),
                    _ => (0, false),
                };
                if counted {
                    counters.files.fetch_add(1, Ordering::Relaxed);
                }
                len
            };
            counters.total_size.fetch_add(size, Ordering::Relaxed);

            buckets.insert(
                name.clone(),
                ChildSize {
                    name: name.to_string_lossy().into_owned(),
                    path,
                    kind,
                    size,
                },
            );
            throttle.tick(counters);
            Ok(())
        })
    }
}

impl Default for ListingCrawler {
    fn default() -> Self {
        Self::new(AggregatorOptions::default())
    }
}
