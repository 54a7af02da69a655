//! Db factories and sandbox-relative paths.

use crate::db::Db;
use crate::error::{DbError, DbResult};
use crate::file::FileDb;
use crate::memory::MemoryDb;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// A sandbox-root-relative database path.
///
/// Factories resolve a `DbPath` against their own root; absolute paths and
/// parent-directory components are rejected so a page can never name a
/// database outside its sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbPath {
    relative: PathBuf,
}

impl DbPath {
    /// Creates a path from a relative component string.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidPath`] for absolute paths, empty paths, and
    /// paths containing `..` components.
    pub fn new(relative: impl Into<PathBuf>) -> DbResult<Self> {
        let relative = relative.into();
        if relative.as_os_str().is_empty() {
            return Err(DbError::invalid_path("empty path"));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                Component::CurDir => {}
                _ => {
                    return Err(DbError::invalid_path(format!(
                        "path must be sandbox-relative: {}",
                        relative.display()
                    )));
                }
            }
        }
        Ok(Self { relative })
    }

    /// Returns the relative path component.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.relative
    }
}

/// Creates and reopens [`Db`] instances.
///
/// `create_db` expects the database to not exist yet; `get_db` expects it to
/// exist. Both hand back a shared handle.
pub trait DbFactory: Send + Sync {
    /// Creates a new database at `path`.
    fn create_db(&self, path: &DbPath) -> DbResult<Arc<dyn Db>>;

    /// Opens an existing database at `path`.
    fn get_db(&self, path: &DbPath) -> DbResult<Arc<dyn Db>>;
}

/// A factory handing out shared [`MemoryDb`] instances keyed by path.
///
/// Re-opening the same path returns the same store, which lets tests
/// simulate "the same on-disk database" without a filesystem.
#[derive(Default)]
pub struct MemoryDbFactory {
    dbs: Mutex<HashMap<DbPath, Arc<MemoryDb>>>,
}

impl MemoryDbFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DbFactory for MemoryDbFactory {
    fn create_db(&self, path: &DbPath) -> DbResult<Arc<dyn Db>> {
        let mut dbs = self.dbs.lock();
        if dbs.contains_key(path) {
            return Err(DbError::invalid_path(format!(
                "database already exists: {}",
                path.as_path().display()
            )));
        }
        let db = Arc::new(MemoryDb::new());
        dbs.insert(path.clone(), Arc::clone(&db));
        Ok(db)
    }

    fn get_db(&self, path: &DbPath) -> DbResult<Arc<dyn Db>> {
        let dbs = self.dbs.lock();
        let db = dbs.get(path).ok_or_else(|| {
            DbError::invalid_path(format!("no such database: {}", path.as_path().display()))
        })?;
        Ok(Arc::clone(db) as Arc<dyn Db>)
    }
}

/// A factory rooting [`FileDb`] instances under a sandbox directory.
pub struct FileDbFactory {
    root: PathBuf,
}

impl FileDbFactory {
    /// Creates a factory with the given sandbox root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &DbPath) -> PathBuf {
        self.root.join(path.as_path())
    }
}

impl DbFactory for FileDbFactory {
    fn create_db(&self, path: &DbPath) -> DbResult<Arc<dyn Db>> {
        let resolved = self.resolve(path);
        if resolved.exists() {
            return Err(DbError::invalid_path(format!(
                "database already exists: {}",
                resolved.display()
            )));
        }
        Ok(Arc::new(FileDb::open(&resolved)?))
    }

    fn get_db(&self, path: &DbPath) -> DbResult<Arc<dyn Db>> {
        let resolved = self.resolve(path);
        if !resolved.exists() {
            return Err(DbError::invalid_path(format!(
                "no such database: {}",
                resolved.display()
            )));
        }
        Ok(Arc::new(FileDb::open(&resolved)?))
    }
}
