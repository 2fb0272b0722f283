//! Key extractors: cheap-to-expensive ways of telling two files apart.
//!
//! Every extractor maps a path to a [`Key`]. Keys from different extractors are
//! never compared with each other; the engine only compares keys produced by
//! the same stage for files in the same cluster.

use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::Crc;
use log::trace;

use crate::error::FileAccessError;

/// Number of leading bytes covered by [`PrefixChecksum`].
pub const CHECKSUM_PREFIX_LEN: usize = 1024;

/// Read buffer size used by [`ContentDigest`].
pub const DIGEST_CHUNK_SIZE: usize = 8 * 1024;

/// A stage-specific comparison key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(OsString),
    Size(u64),
    Checksum(u32),
    Digest([u8; 32]),
}

/// Computes one kind of [`Key`] for a file.
///
/// Implementations must be deterministic for an unmodified file and must not
/// keep the file open after returning.
pub trait KeyExtractor: Send + Sync {
    /// Short label used in progress output and logs.
    fn label(&self) -> &'static str;

    fn extract(&self, path: &Path) -> Result<Key, FileAccessError>;
}

/// The file's base name.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseName;

impl KeyExtractor for BaseName {
    fn label(&self) -> &'static str {
        "By Name"
    }

    fn extract(&self, path: &Path) -> Result<Key, FileAccessError> {
        path.file_name()
            .map(|name| Key::Name(name.to_os_string()))
            .ok_or_else(|| {
                FileAccessError::from_io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
                )
            })
    }
}

/// Exact byte length, from a metadata read.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSize;

impl KeyExtractor for FileSize {
    fn label(&self) -> &'static str {
        "By Size"
    }

    fn extract(&self, path: &Path) -> Result<Key, FileAccessError> {
        let metadata = fs::metadata(path).map_err(|e| FileAccessError::from_io(path, e))?;
        Ok(Key::Size(metadata.len()))
    }
}

/// CRC-32 over the first `prefix_len` bytes of the file.
///
/// Two files that share size and prefix but differ later pass this test;
/// only [`ContentDigest`] tells them apart.
#[derive(Debug, Clone, Copy)]
pub struct PrefixChecksum {
    prefix_len: usize,
}

impl PrefixChecksum {
    pub fn new(prefix_len: usize) -> Self {
        Self { prefix_len }
    }
}

impl Default for PrefixChecksum {
    fn default() -> Self {
        Self::new(CHECKSUM_PREFIX_LEN)
    }
}

impl KeyExtractor for PrefixChecksum {
    fn label(&self) -> &'static str {
        "By Checksum"
    }

    fn extract(&self, path: &Path) -> Result<Key, FileAccessError> {
        let file = fs::File::open(path).map_err(|e| FileAccessError::from_io(path, e))?;
        let mut prefix = Vec::with_capacity(self.prefix_len);
        file.take(self.prefix_len as u64)
            .read_to_end(&mut prefix)
            .map_err(|e| FileAccessError::from_io(path, e))?;

        let mut crc = Crc::new();
        crc.update(&prefix);
        Ok(Key::Checksum(crc.sum()))
    }
}

/// BLAKE3 digest of the whole file, streamed in fixed-size chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentDigest;

impl KeyExtractor for ContentDigest {
    fn label(&self) -> &'static str {
        "By Digest"
    }

    fn extract(&self, path: &Path) -> Result<Key, FileAccessError> {
        let mut file = fs::File::open(path).map_err(|e| FileAccessError::from_io(path, e))?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0; DIGEST_CHUNK_SIZE];
        let mut total_bytes = 0u64;

        loop {
            let bytes_read = file
                .read(&mut buffer)
                .map_err(|e| FileAccessError::from_io(path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            total_bytes += bytes_read as u64;
        }

        let hash = hasher.finalize();
        trace!(
            "Digest for '{}': {} ({} bytes)",
            path.display(),
            hash.to_hex(),
            total_bytes
        );
        Ok(Key::Digest(*hash.as_bytes()))
    }
}
