//! Process-wide view cache.
//!
//! At most one view lives in the cache per canonical path. The session
//! takes a coarse lock around every cache operation, which also gives
//! loads at-most-once semantics: the losing callers of a concurrent get
//! receive the instance the winner inserted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::SessionConfig;
use crate::error::{QueryError, SourcePos};
use crate::io::delimited;
use crate::view::{FileInfo, View, file_key};

#[derive(Debug, Default)]
pub struct ViewCache {
    views: HashMap<String, View>,
}

impl ViewCache {
    pub fn new() -> Self {
        ViewCache::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.views.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&View> {
        self.views.get(key)
    }

    pub fn insert(&mut self, key: String, view: View) {
        self.views.insert(key, view);
    }

    pub fn remove(&mut self, key: &str) -> Option<View> {
        self.views.remove(key)
    }

    pub fn clear(&mut self) {
        self.views.clear();
    }

    /// Load a file into the cache unless it is already present, and
    /// return the cached instance.
    pub fn load(
        &mut self,
        path: &Path,
        config: &SessionConfig,
        pos: SourcePos,
    ) -> Result<&View, QueryError> {
        let key = file_key(path);
        if !self.views.contains_key(&key) {
            if !path.is_file() {
                return Err(QueryError::FileDoesNotExist {
                    path: path.display().to_string(),
                    pos,
                });
            }
            log::debug!("loading {} into the view cache", path.display());
            let info = FileInfo::for_file(path.to_path_buf(), config);
            let view_name = table_name(path);
            let view = delimited::read_view(path, &view_name, info)?;
            self.views.insert(key.clone(), view);
        }
        Ok(self.views.get(&key).expect("view inserted above"))
    }
}

/// Default view qualifier of a file-backed table: the file stem.
pub fn table_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Resolve a table identifier to a path: unqualified names resolve
/// against the repository and get a `.csv` extension when they carry
/// none.
pub fn resolve_table_path(name: &str, config: &SessionConfig) -> PathBuf {
    let mut path = PathBuf::from(name);
    if path.extension().is_none() {
        path.set_extension("csv");
    }
    if path.is_relative() {
        config.repository.join(path)
    } else {
        path
    }
}
