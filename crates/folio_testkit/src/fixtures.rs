//! Page storage fixtures.
//!
//! Convenience constructors for tests that need a working page without
//! repeating the db and config plumbing.

use folio_core::{
    Commit, CommitId, KeyPriority, ObjectStoreConfig, PageId, PageStorage,
};
use folio_db::{FileDb, MemoryDb};
use std::sync::Arc;
use tempfile::TempDir;

/// A test page with automatic cleanup of its backing files.
pub struct TestPage {
    /// The page storage instance.
    pub page: Arc<PageStorage>,
    /// Kept alive so the backing directory outlives the page.
    _temp_dir: Option<TempDir>,
}

impl TestPage {
    /// Creates a page over an in-memory db.
    #[must_use]
    pub fn memory() -> Self {
        Self::memory_with_id(PageId::new([1; 16]))
    }

    /// Creates an in-memory page with a specific id.
    #[must_use]
    pub fn memory_with_id(page_id: PageId) -> Self {
        let page = PageStorage::open(
            Arc::new(MemoryDb::new()),
            page_id,
            ObjectStoreConfig::default(),
        )
        .expect("in-memory page should open");
        Self {
            page: Arc::new(page),
            _temp_dir: None,
        }
    }

    /// Creates a page over a file-backed db in a temporary directory.
    #[must_use]
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("temp directory should be creatable");
        let db = FileDb::open(&temp_dir.path().join("page.db")).expect("file db should open");
        let page = PageStorage::open(
            Arc::new(db),
            PageId::new([1; 16]),
            ObjectStoreConfig::default(),
        )
        .expect("file page should open");
        Self {
            page: Arc::new(page),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the page's single head, panicking if history has diverged.
    #[must_use]
    pub fn head(&self) -> Commit {
        let heads = self.page.get_heads().expect("heads should be readable");
        assert_eq!(heads.len(), 1, "page has {} heads, expected 1", heads.len());
        heads.into_iter().next().expect("one head")
    }

    /// Commits a batch of puts on top of the current head and returns the
    /// new commit's id.
    pub fn commit_puts(&self, entries: &[(&[u8], &[u8])]) -> CommitId {
        let head = self.head();
        let mut journal = self
            .page
            .new_journal(&head.id())
            .expect("journal should open on the head");
        for (key, value) in entries {
            let id = self.page.store_value(value).expect("value should store");
            journal
                .put(key.to_vec(), id, KeyPriority::Eager)
                .expect("journal should accept puts");
        }
        self.page
            .commit_journal(&mut journal)
            .expect("commit should succeed")
            .id()
    }
}

impl std::ops::Deref for TestPage {
    type Target = PageStorage;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

/// Runs a test against an in-memory page.
pub fn with_memory_page<F, R>(f: F) -> R
where
    F: FnOnce(&TestPage) -> R,
{
    f(&TestPage::memory())
}

/// Runs a test against a file-backed page.
pub fn with_file_page<F, R>(f: F) -> R
where
    F: FnOnce(&TestPage) -> R,
{
    f(&TestPage::file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fixture_commits() {
        with_memory_page(|page| {
            let commit = page.commit_puts(&[(b"k", b"v")]);
            assert_eq!(page.get_value(&commit, b"k").unwrap().unwrap(), b"v");
        });
    }

    #[test]
    fn file_fixture_commits() {
        with_file_page(|page| {
            let commit = page.commit_puts(&[(b"k", b"v")]);
            assert_eq!(page.head().id(), commit);
        });
    }
}
