//! On-disk write-behind queue for observations that could not be persisted.
//!
//! The queue is a single JSON array file. Every read-modify-write of that file
//! happens while holding an exclusive advisory lock on a sibling `.lock` file,
//! so a collector appending and a drainer rewriting can run in separate
//! processes without losing entries. Nothing is cached in memory between
//! calls; the file is the source of truth.

use crate::models::Observation;
use crate::sink::ObservationSink;
use fs2::FileExt;
use log::{error, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const QUEUE_FILE_NAME: &str = "observation_queue.json";
pub const LOCK_FILE_NAME: &str = "observation_queue.lock";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to lock queue at '{path}': {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read queue file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write queue file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to remove drained queue file '{path}': {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize queue entries: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("queue worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    pub processed: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub struct DurableQueue {
    queue_path: PathBuf,
    lock_path: PathBuf,
}

/// Held for the duration of one read-modify-write; released on drop.
struct QueueLock {
    file: File,
    path: PathBuf,
}

impl QueueLock {
    fn acquire(path: &Path) -> Result<Self, QueueError> {
        let lock_error = |source| QueueError::Lock {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(lock_error)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(lock_error)?;
        file.lock_exclusive().map_err(lock_error)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Blocks on a pool thread so the runtime keeps serving other tasks while
    /// another process holds the lock.
    async fn acquire_async(path: &Path) -> Result<Self, QueueError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire(&path)).await?
    }
}

impl Drop for QueueLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!("Failed to release queue lock {}: {}", self.path.display(), err);
        }
    }
}

impl DurableQueue {
    /// Queue stored under `dir` using the standard file names.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self::with_paths(dir.join(QUEUE_FILE_NAME), dir.join(LOCK_FILE_NAME))
    }

    pub fn with_paths(queue_path: PathBuf, lock_path: PathBuf) -> Self {
        Self {
            queue_path,
            lock_path,
        }
    }

    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    /// Unlocked hint; callers must not rely on it for correctness.
    pub fn exists(&self) -> bool {
        self.queue_path.exists()
    }

    /// Adds `entries` to the end of the queue. Empty input never touches disk.
    pub async fn append(&self, entries: &[Observation]) -> Result<usize, QueueError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let queue = self.clone();
        let entries = entries.to_vec();
        tokio::task::spawn_blocking(move || queue.append_blocking(entries)).await?
    }

    fn append_blocking(&self, entries: Vec<Observation>) -> Result<usize, QueueError> {
        let _lock = QueueLock::acquire(&self.lock_path)?;
        let mut pending = read_entries(&self.queue_path)?;
        let added = entries.len();
        pending.extend(entries);
        write_entries(&self.queue_path, &pending)?;
        info!(
            "Queued {} observation(s); {} pending in {}",
            added,
            pending.len(),
            self.queue_path.display()
        );
        Ok(added)
    }

    /// Snapshot of the pending entries, read under the lock.
    /// A missing queue yields an empty list without creating anything on disk.
    pub async fn pending(&self) -> Result<Vec<Observation>, QueueError> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let queue = self.clone();
        tokio::task::spawn_blocking(move || {
            let _lock = QueueLock::acquire(&queue.lock_path)?;
            read_entries(&queue.queue_path)
        })
        .await?
    }

    /// Retries every queued entry through `sink.insert_one`, in order.
    ///
    /// Entries the sink accepts are dropped; the rest are written back in their
    /// original relative order. When nothing remains the queue file is
    /// removed. The lock is held from the first read until the final write, so
    /// concurrent appends wait rather than interleave.
    ///
    /// A failure to persist the rewritten queue is logged and otherwise
    /// ignored: accepted entries stay on disk and are replayed next time,
    /// which the store's natural key makes harmless.
    pub async fn drain_and_retry<S>(&self, sink: &mut S) -> Result<DrainOutcome, QueueError>
    where
        S: ObservationSink + ?Sized,
    {
        if !self.exists() {
            return Ok(DrainOutcome::default());
        }

        let lock = QueueLock::acquire_async(&self.lock_path).await?;
        let queue_path = self.queue_path.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            if queue_path.exists() {
                read_entries(&queue_path).map(Some)
            } else {
                Ok(None)
            }
        })
        .await??;
        let Some(entries) = loaded else {
            return Ok(DrainOutcome::default());
        };

        let mut processed = 0;
        let mut retained = Vec::new();
        for entry in entries {
            if sink.insert_one(&entry).await {
                processed += 1;
            } else {
                retained.push(entry);
            }
        }

        let remaining = retained.len();
        let queue_path = self.queue_path.clone();
        let rewrite = tokio::task::spawn_blocking(move || {
            if retained.is_empty() {
                remove_queue_file(&queue_path)
            } else {
                write_entries(&queue_path, &retained)
            }
        })
        .await
        .map_err(QueueError::from)
        .and_then(|result| result);
        if let Err(err) = rewrite {
            error!("Discarding drain result: {}", err);
        }
        drop(lock);

        Ok(DrainOutcome {
            processed,
            remaining,
        })
    }
}

fn read_entries(path: &Path) -> Result<Vec<Observation>, QueueError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(QueueError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    match serde_json::from_slice::<Vec<Observation>>(&bytes) {
        Ok(entries) => Ok(entries),
        Err(err) => {
            warn!(
                "Queue file {} is not a valid observation list ({}); treating it as empty",
                path.display(),
                err
            );
            Ok(Vec::new())
        }
    }
}

/// Writes to a temporary sibling and renames it over the queue file.
fn write_entries(path: &Path, entries: &[Observation]) -> Result<(), QueueError> {
    let payload = serde_json::to_vec_pretty(entries)?;
    let write_error = |source| QueueError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
    }

    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let written = File::create(&temp_path).and_then(|mut file| {
        file.write_all(&payload)?;
        file.sync_all()
    });
    if let Err(source) = written.and_then(|()| fs::rename(&temp_path, path)) {
        discard_temp_file(&temp_path);
        return Err(write_error(source));
    }
    Ok(())
}

fn discard_temp_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to remove temporary queue file {}: {}", path.display(), err),
    }
}

fn remove_queue_file(path: &Path) -> Result<(), QueueError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(QueueError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}
