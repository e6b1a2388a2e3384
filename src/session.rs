//! The engine handle.
//!
//! A [`Session`] owns the view cache, the transaction manager, and the
//! scalar function registry, and is threaded explicitly through every
//! operation. The cache and the pending-results log sit behind coarse
//! locks taken only in this module's public surface.

use std::fs::File;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;

use crate::ast::Statement;
use crate::cache::{ViewCache, resolve_table_path};
use crate::config::SessionConfig;
use crate::error::{QueryError, SourcePos};
use crate::executor::{self, StatementResult};
use crate::filter::Filter;
use crate::function::ScalarRegistry;
use crate::io::delimited;
use crate::transaction::{PendingKind, PendingResult, TransactionManager};
use crate::view::{FileInfo, View, file_key};

pub struct Session {
    config: SessionConfig,
    scalars: ScalarRegistry,
    cache: Mutex<ViewCache>,
    txn: Mutex<TransactionManager>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Session {
            config,
            scalars: ScalarRegistry::new(),
            cache: Mutex::new(ViewCache::new()),
            txn: Mutex::new(TransactionManager::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn scalars(&self) -> &ScalarRegistry {
        &self.scalars
    }

    /// Register a scalar function implementation; see
    /// [`ScalarRegistry::register`].
    pub fn register_scalar<F>(&mut self, name: &str, min_args: usize, max_args: usize, func: F)
    where
        F: Fn(&[crate::value::Value]) -> Result<crate::value::Value, QueryError>
            + Send
            + Sync
            + 'static,
    {
        self.scalars.register(name, min_args, max_args, func);
    }

    /// Build a root filter for statement execution.
    pub fn filter(&self) -> Filter<'_> {
        Filter::new(self)
    }

    /// Evaluate one statement.
    pub fn execute(
        &self,
        statement: &Statement,
        filter: &mut Filter<'_>,
    ) -> Result<StatementResult, QueryError> {
        executor::execute(statement, filter)
    }

    fn cache_lock(&self) -> MutexGuard<'_, ViewCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn txn_lock(&self) -> MutexGuard<'_, TransactionManager> {
        self.txn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load a file-backed table through the cache, acquiring its write
    /// lock when the load is for mutation. Returns a working copy; the
    /// cache keeps the canonical instance.
    pub(crate) fn load_file_view(
        &self,
        name: &str,
        for_update: bool,
        pos: SourcePos,
    ) -> Result<View, QueryError> {
        let path = resolve_table_path(name, &self.config);
        let key = file_key(&path);
        let mut cache = self.cache_lock();
        let view = cache.load(&path, &self.config, pos)?.clone();
        drop(cache);
        // Tables created in this transaction have no file to lock yet.
        if for_update && path.is_file() {
            self.txn_lock().lock_file(&key, &path, pos)?;
        }
        Ok(view)
    }

    /// Write a mutated working copy back as the canonical instance and
    /// register the pending content mutation.
    pub(crate) fn stage_update(&self, name: &str, view: View) {
        let path = resolve_table_path(name, &self.config);
        let key = file_key(&path);
        self.cache_lock().insert(key.clone(), view);
        self.txn_lock().register_update(key, path);
    }

    /// Install a newly created table in the cache and register the
    /// pending create. Fails when the file or a cache entry exists.
    pub(crate) fn stage_create(
        &self,
        name: &str,
        view: View,
        pos: SourcePos,
    ) -> Result<(), QueryError> {
        let path = resolve_table_path(name, &self.config);
        let key = file_key(&path);
        let mut cache = self.cache_lock();
        if path.exists() || cache.contains(&key) {
            return Err(QueryError::FileAlreadyExists {
                path: path.display().to_string(),
                pos,
            });
        }
        cache.insert(key.clone(), view);
        self.txn_lock().register_create(key, path);
        Ok(())
    }

    /// Flush the pending-results log in registration order. Best-effort:
    /// the first failure aborts the remaining writes, already-written
    /// files stay written.
    pub fn commit(&self, pos: SourcePos) -> Result<(), QueryError> {
        let mut cache = self.cache_lock();
        let mut txn = self.txn_lock();
        let results: Vec<PendingResult> = txn.results().to_vec();

        for (i, result) in results.iter().enumerate() {
            if let Err(err) = self.commit_one(&mut cache, &mut txn, result, pos) {
                txn.discard_results(i);
                return Err(err);
            }
        }
        txn.clear_results();
        Ok(())
    }

    fn commit_one(
        &self,
        cache: &mut ViewCache,
        txn: &mut TransactionManager,
        result: &PendingResult,
        pos: SourcePos,
    ) -> Result<(), QueryError> {
        let view = cache
            .get(&result.key)
            .cloned()
            .ok_or_else(|| QueryError::internal(format!("{} is not cached", result.key)))?;
        let info = view
            .file_info
            .clone()
            .unwrap_or_else(|| FileInfo::for_file(result.path.clone(), &self.config));

        match result.kind {
            PendingKind::Create => {
                let mut file = File::create(&result.path).map_err(|e| QueryError::io(e, pos))?;
                file.write_all(delimited::encode(&view, &info).as_bytes())
                    .map_err(|e| QueryError::io(e, pos))?;
                if !self.config.quiet {
                    log::info!("Commit: file \"{}\" is created.", result.path.display());
                }
            }
            PendingKind::Update => {
                let mut file = match txn.take_lock(&result.key) {
                    Some(file) => file,
                    None => File::options()
                        .read(true)
                        .write(true)
                        .open(&result.path)
                        .map_err(|e| QueryError::io(e, pos))?,
                };
                delimited::write_view(&mut file, &view, &info)?;
                let _ = FileExt::unlock(&file);
                if !self.config.quiet {
                    log::info!("Commit: file \"{}\" is updated.", result.path.display());
                }
            }
        }
        Ok(())
    }

    /// Discard the pending-results log in reverse registration order.
    /// Created files are deleted if present; mutated files keep their
    /// on-disk state and their cache entry is evicted so the next read
    /// reloads it. Temporary-view changes are not reverted.
    pub fn rollback(&self) -> Result<(), QueryError> {
        let mut cache = self.cache_lock();
        let mut txn = self.txn_lock();

        for result in txn.clear_results().iter().rev() {
            match result.kind {
                PendingKind::Create => {
                    if result.path.exists() {
                        let _ = std::fs::remove_file(&result.path);
                    }
                    cache.remove(&result.key);
                    if !self.config.quiet {
                        log::info!("Rollback: file \"{}\" is deleted.", result.path.display());
                    }
                }
                PendingKind::Update => {
                    txn.release_lock(&result.key);
                    cache.remove(&result.key);
                    if !self.config.quiet {
                        log::info!("Rollback: file \"{}\" is restored.", result.path.display());
                    }
                }
            }
        }
        Ok(())
    }

    /// Drop every cache entry and close every open handle
    /// unconditionally; used at process exit.
    pub fn release(&self) {
        self.cache_lock().clear();
        self.txn_lock().release_all();
    }

    pub(crate) fn resolve_path(&self, name: &str) -> std::path::PathBuf {
        resolve_table_path(name, &self.config)
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new(SessionConfig::default())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
