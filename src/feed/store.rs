use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::document::{self, Channel, FeedDocument, MalformedFeedError, SerializeError};

/// File-system failures while reading or replacing the feed file.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create feed directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read feed file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write feed file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to rename '{}' to '{}': {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

/// Errors from loading an existing feed file.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Malformed feed file '{}': {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: MalformedFeedError,
    },
}

/// Durable home of the one feed document, at a path fixed at construction.
#[derive(Debug, Clone)]
pub struct FeedStore {
    path: PathBuf,
}

impl FeedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Creates the feed directory if needed and writes a document holding
    /// only the channel header.
    pub fn initialize_empty(&self, channel: Channel) -> Result<FeedDocument, StorageError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StorageError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let document = FeedDocument::new(channel);
        self.save(&document)?;
        tracing::info!(path = %self.path.display(), "Initialized empty feed");
        Ok(document)
    }

    /// Reads and parses the feed file.
    pub fn load(&self) -> Result<FeedDocument, FeedError> {
        let bytes = std::fs::read(&self.path).map_err(|source| StorageError::Read {
            path: self.path.clone(),
            source,
        })?;
        document::parse(&bytes).map_err(|source| FeedError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the feed file atomically.
    ///
    /// Writes to a temporary file in the same directory, syncs it to disk,
    /// then renames it over the feed. Readers see either the old or the new
    /// document, never a partial or missing file.
    pub fn save(&self, document: &FeedDocument) -> Result<(), StorageError> {
        use std::time::{SystemTime, UNIX_EPOCH};

        let content = document::serialize(document)?;

        // SEC-009: Randomized temp filename to prevent TOCTOU race conditions
        let random_suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = self.path.with_extension(format!(
            "tmp.{}.{:016x}",
            std::process::id(),
            random_suffix
        ));

        let write_err = |source: std::io::Error| StorageError::Write {
            path: temp_path.clone(),
            source,
        };

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(write_err)?;

        if let Err(source) = file.write_all(&content).and_then(|()| file.sync_all()) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(write_err(source));
        }

        drop(file);

        // On Windows, rename fails if destination exists, so remove it first
        #[cfg(windows)]
        if self.path.exists() {
            if let Err(source) = std::fs::remove_file(&self.path) {
                let _ = std::fs::remove_file(&temp_path);
                return Err(write_err(source));
            }
        }

        if let Err(source) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(StorageError::Rename {
                from: temp_path,
                to: self.path.clone(),
                source,
            });
        }

        tracing::debug!(
            path = %self.path.display(),
            items = document.len(),
            bytes = content.len(),
            "Saved feed"
        );
        Ok(())
    }
}
