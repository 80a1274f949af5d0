// src/file_manager.rs - Data-directory file access for the evaluators
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("file access failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Thin wrapper around the pattern/playlist directory.
///
/// Reads are synchronous: the evaluators run inside the cooperative tick
/// loop and only ever pull small bounded amounts per tick.
#[derive(Debug, Clone)]
pub struct FileManager {
    base_dir: PathBuf,
}

impl FileManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Lowercased extension of a file name, empty if none.
    pub fn extension(name: &str) -> String {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Length of a file in bytes, or `None` if it does not exist.
    pub fn file_len(&self, name: &str) -> Option<u64> {
        std::fs::metadata(self.resolve(name))
            .ok()
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len())
    }

    /// Read at most `max_len` bytes of a text file.
    pub fn read_to_string_capped(&self, name: &str, max_len: usize) -> Result<String, FileError> {
        let file = File::open(self.resolve(name))?;
        let mut contents = String::new();
        file.take(max_len as u64).read_to_string(&mut contents)?;
        Ok(contents)
    }

    /// Open a file for incremental line reads, returning its total length.
    pub fn open_streaming(&self, name: &str) -> Result<(BufReader<File>, u64), FileError> {
        let file = File::open(self.resolve(name))?;
        let len = file.metadata()?.len();
        Ok((BufReader::with_capacity(512, file), len))
    }
}
