//! Staging directory and file naming for encrypted uploads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mmc_core::MediaType;

/// Source of unique file-name ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Upper-case simple-form UUID v4 ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string().to_uppercase()
    }
}

/// Deterministic counter ids, for tests.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

#[derive(Clone)]
pub struct TempStore {
    dir: PathBuf,
    ids: Arc<dyn IdGenerator>,
}

impl std::fmt::Debug for TempStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempStore").field("dir", &self.dir).finish()
    }
}

impl TempStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_ids(dir, Arc::new(UuidIds))
    }

    pub fn with_ids(dir: impl Into<PathBuf>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            dir: dir.into(),
            ids,
        }
    }

    pub fn from_config(cfg: &mmc_core::config::StorageConfig) -> Self {
        Self::new(cfg.tmp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fresh base path `{dir}/{type}{id}`; callers append their suffix.
    pub fn allocate(&self, media_type: MediaType) -> StagedName {
        StagedName {
            base: self.dir.join(format!("{media_type}{}", self.ids.next_id())),
        }
    }
}

/// Base name reserved for one operation.
#[derive(Debug, Clone)]
pub struct StagedName {
    base: PathBuf,
}

impl StagedName {
    pub fn raw(&self) -> PathBuf {
        self.base.clone()
    }

    pub fn encrypted(&self) -> PathBuf {
        self.with_suffix("-enc")
    }

    pub fn original(&self) -> PathBuf {
        self.with_suffix("-original")
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.base.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }
}
