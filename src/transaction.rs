//! Pending mutations and their COMMIT / ROLLBACK handling.
//!
//! Every mutating statement registers a pending result. COMMIT flushes
//! them to disk in registration order with best-effort semantics: a
//! failure aborts the remaining writes but already-written files stay
//! written. ROLLBACK walks the log in reverse, deleting created files and
//! releasing write locks without writing.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use fs2::FileExt;

use crate::error::{QueryError, SourcePos};

/// Kind of a not-yet-committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// CREATE TABLE: the file does not exist until COMMIT.
    Create,
    /// INSERT/UPDATE/DELETE or content-mutating DDL on an existing file.
    Update,
}

/// One entry of the pending-results log.
#[derive(Debug, Clone)]
pub struct PendingResult {
    pub kind: PendingKind,
    pub key: String,
    pub path: PathBuf,
}

/// Tracks pending results and the advisory locks of files opened for
/// mutation. Locks are held from the first mutation through COMMIT,
/// ROLLBACK, or RELEASE.
#[derive(Debug, Default)]
pub struct TransactionManager {
    results: Vec<PendingResult>,
    locks: HashMap<String, File>,
}

impl TransactionManager {
    pub fn new() -> Self {
        TransactionManager::default()
    }

    /// Register a pending CREATE. A later content mutation of the same
    /// file stays covered by the create entry.
    pub fn register_create(&mut self, key: String, path: PathBuf) {
        if !self.results.iter().any(|r| r.key == key) {
            self.results.push(PendingResult {
                kind: PendingKind::Create,
                key,
                path,
            });
        }
    }

    /// Register a pending content mutation; deduplicated per file.
    pub fn register_update(&mut self, key: String, path: PathBuf) {
        if !self.results.iter().any(|r| r.key == key) {
            self.results.push(PendingResult {
                kind: PendingKind::Update,
                key,
                path,
            });
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.results.iter().any(|r| r.key == key)
    }

    pub fn results(&self) -> &[PendingResult] {
        &self.results
    }

    /// Acquire the exclusive advisory lock on a file about to be
    /// mutated. Idempotent per file; the handle doubles as the write
    /// handle at COMMIT.
    pub fn lock_file(&mut self, key: &str, path: &PathBuf, pos: SourcePos) -> Result<(), QueryError> {
        if self.locks.contains_key(key) {
            return Ok(());
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| QueryError::io(e, pos))?;
        file.lock_exclusive().map_err(|e| QueryError::io(e, pos))?;
        log::debug!("acquired write lock on {}", path.display());
        self.locks.insert(key.to_string(), file);
        Ok(())
    }

    pub fn take_lock(&mut self, key: &str) -> Option<File> {
        self.locks.remove(key)
    }

    /// Release one file's advisory lock without writing.
    pub fn release_lock(&mut self, key: &str) {
        if let Some(file) = self.locks.remove(key) {
            let _ = FileExt::unlock(&file);
        }
    }

    /// Drop the first `count` entries after a partial COMMIT.
    pub fn discard_results(&mut self, count: usize) {
        self.results.drain(..count.min(self.results.len()));
    }

    pub fn clear_results(&mut self) -> Vec<PendingResult> {
        std::mem::take(&mut self.results)
    }

    /// Close every open handle unconditionally; used by RELEASE.
    pub fn release_all(&mut self) {
        for (_, file) in self.locks.drain() {
            let _ = FileExt::unlock(&file);
        }
        self.results.clear();
    }
}
