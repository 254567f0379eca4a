//! Lazy read streams over committed cache files.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use bytes::Bytes;

const CHUNK_SIZE: usize = 64 * 1024;

/// A chunked reader over one committed cache file.
///
/// The file is not opened until the first chunk is pulled. If the stale
/// cleaner reclaims the file between lookup and first read, that read
/// yields the open error instead of stale bytes.
pub struct CacheReader {
    path: PathBuf,
    file: Option<File>,
    done: bool,
}

impl CacheReader {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: None,
            done: false,
        }
    }

    /// Path of the underlying permanent file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole stream into one buffer.
    pub fn bytes(self) -> io::Result<Bytes> {
        let mut out = Vec::new();
        for chunk in self {
            out.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(out))
    }
}

impl std::fmt::Debug for CacheReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheReader")
            .field("path", &self.path)
            .field("opened", &self.file.is_some())
            .finish()
    }
}

impl Iterator for CacheReader {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.file.is_none() {
            match File::open(&self.path) {
                Ok(file) => self.file = Some(file),
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        let file = self.file.as_mut()?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        match file.read(&mut buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(n) => {
                buf.truncate(n);
                Some(Ok(Bytes::from(buf)))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
