//! Error types shared by the key extractors, the refinement engine and the
//! configuration layer.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// A per-file failure raised while computing a comparison key.
///
/// Most variants are recoverable: the file is dropped from the current run
/// and processing continues. See [`FileAccessError::is_recoverable`].
#[derive(Debug, Error)]
pub enum FileAccessError {
    #[error("'{}' vanished before it could be read", path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied reading '{}'", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileAccessError {
    /// Classifies an I/O error raised while accessing `path`.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound { path } | Self::PermissionDenied { path } | Self::Io { path, .. } => {
                path
            }
        }
    }

    /// Whether the run may continue without this file.
    ///
    /// Running out of memory while reading is treated as fatal for the whole
    /// run; every other access failure only excludes the file.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::PermissionDenied { .. } => true,
            Self::Io { source, .. } => source.kind() != io::ErrorKind::OutOfMemory,
        }
    }
}

/// Why a refinement run stopped without producing results.
#[derive(Debug, Error)]
pub enum RefineError {
    #[error("duplicate search interrupted")]
    Interrupted,

    #[error("unrecoverable error during duplicate search: {0}")]
    Fatal(#[source] FileAccessError),
}

/// Invalid settings, reported before any scanning starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("'show_all' and 'top = {top}' cannot both be set in {}", file.display())]
    ConflictingDisplayLimit { top: usize, file: PathBuf },

    #[error("thread count must be at least 1")]
    ZeroThreads,

    #[error("root directory '{}' does not exist or is not a directory", .0.display())]
    MissingRoot(PathBuf),

    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_io_error_kinds() {
        let path = Path::new("/data/a.bin");

        let err = FileAccessError::from_io(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, FileAccessError::NotFound { .. }));
        assert!(err.is_recoverable());

        let err = FileAccessError::from_io(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, FileAccessError::PermissionDenied { .. }));
        assert_eq!(err.path(), path);

        let err = FileAccessError::from_io(path, io::Error::other("bad sector"));
        assert!(matches!(err, FileAccessError::Io { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn out_of_memory_is_fatal() {
        let err = FileAccessError::from_io(
            Path::new("/data/huge.iso"),
            io::Error::from(io::ErrorKind::OutOfMemory),
        );
        assert!(!err.is_recoverable());
    }
}
