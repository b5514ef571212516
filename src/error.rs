use std::io;
use std::path::{Path, PathBuf};

/// Failure while walking a directory tree.
#[derive(Debug, thiserror::Error)]
pub enum TraversalError {
    #[error("path does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("size computation for {} was cancelled", path.display())]
    Cancelled { path: PathBuf },

    #[error("size worker for {} panicked", path.display())]
    WorkerPanicked { path: PathBuf },
}

impl TraversalError {
    /// Classify an I/O failure on `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        let path = path.to_path_buf();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::NotADirectory => Self::NotADirectory { path },
            _ => Self::Io { path, source: err },
        }
    }

    /// The path the failure is attributed to.
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound { path }
            | Self::NotADirectory { path }
            | Self::PermissionDenied { path }
            | Self::Io { path, .. }
            | Self::Cancelled { path }
            | Self::WorkerPanicked { path } => path,
        }
    }
}

/// Failure loading an options file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure setting up a change watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("cannot watch missing path: {}", path.display())]
    PathNotFound { path: PathBuf },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_classifies_kinds() {
        let p = Path::new("/nowhere");
        let err = TraversalError::from_io(p, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, TraversalError::NotFound { .. }));

        let err = TraversalError::from_io(p, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, TraversalError::PermissionDenied { .. }));

        let err = TraversalError::from_io(p, io::Error::other("boom"));
        assert!(matches!(err, TraversalError::Io { .. }));
        assert_eq!(err.path(), p);
    }

    #[test]
    fn test_display_mentions_path() {
        let err = TraversalError::NotADirectory {
            path: PathBuf::from("/tmp/file.txt"),
        };
        assert_eq!(err.to_string(), "not a directory: /tmp/file.txt");
    }
}
