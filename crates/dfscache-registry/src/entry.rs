//! Cache entries and the entry directory
//!
//! Each locally mirrored file is represented by one `CacheEntry`, keyed by
//! its canonical local path. Usage is tracked by a refcount behind the
//! `EntryPin` guard; a pinned entry refuses removal. The directory also
//! handles the startup reconciliation scan that re-registers cached files
//! surviving from a previous run.

use dfscache_common::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// How an entry came to exist locally
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryOrigin {
    /// Written locally first, to be published to the remote side later
    FreshlyCreated,
    /// Local mirror of content that exists remotely
    MirrorsRemote,
}

/// One locally cached file
pub struct CacheEntry {
    local_path: PathBuf,
    origin: EntryOrigin,
    users: AtomicU32,
}

impl CacheEntry {
    fn new(local_path: PathBuf, origin: EntryOrigin) -> Self {
        Self {
            local_path,
            origin,
            users: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    #[must_use]
    pub fn origin(&self) -> EntryOrigin {
        self.origin
    }

    /// Current number of live pins
    #[must_use]
    pub fn users(&self) -> u32 {
        self.users.load(Ordering::SeqCst)
    }

    /// Take a usage pin. The entry cannot be removed while any pin lives.
    #[must_use]
    pub fn pin(self: &Arc<Self>) -> EntryPin {
        self.users.fetch_add(1, Ordering::SeqCst);
        EntryPin {
            entry: Arc::clone(self),
        }
    }
}

/// Scope-bound usage pin on a cache entry
pub struct EntryPin {
    entry: Arc<CacheEntry>,
}

impl EntryPin {
    #[must_use]
    pub fn entry(&self) -> &Arc<CacheEntry> {
        &self.entry
    }
}

impl Drop for EntryPin {
    fn drop(&mut self) {
        self.entry.users.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Directory of cache entries, keyed by canonical local path
#[derive(Default)]
pub struct EntryDirectory {
    entries: Mutex<HashMap<PathBuf, Arc<CacheEntry>>>,
}

impl EntryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn find(&self, path: &Path) -> Option<Arc<CacheEntry>> {
        self.entries.lock().get(path).cloned()
    }

    /// Register an entry. Returns false if the path is already registered;
    /// the existing entry is left untouched.
    pub fn add(&self, path: PathBuf, origin: EntryOrigin) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&path) {
            return false;
        }
        let entry = Arc::new(CacheEntry::new(path.clone(), origin));
        entries.insert(path, entry);
        true
    }

    /// Remove an entry. A pinned entry refuses removal with no side
    /// effects. With `physically` the local content is unlinked first and
    /// a failed unlink keeps the entry registered.
    pub fn remove(&self, path: &Path, physically: bool) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(path) else {
            return false;
        };
        let users = entry.users();
        if users > 0 {
            warn!(path = %path.display(), users, "entry is in use, removal refused");
            return false;
        }
        if physically {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unable to unlink cached content");
                    return false;
                }
            }
        }
        entries.remove(path);
        true
    }

    /// Remove every entry under a path prefix. Pinned entries block their
    /// own removal only; the rest are still removed and the overall result
    /// reports whether all of them went away. There is no rollback.
    pub fn remove_tree(&self, prefix: &Path, physically: bool) -> bool {
        let targets: Vec<PathBuf> = self
            .entries
            .lock()
            .keys()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect();

        let mut all = true;
        for path in targets {
            all &= self.remove(&path, physically);
        }
        all
    }

    /// Reconcile the directory with content already on disk under the
    /// cache root. Files modified within the window are re-registered as
    /// remote mirrors; older files are stale leftovers and are unlinked.
    /// Returns the number of re-registered entries.
    pub fn reload(&self, root: &Path, window: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut registered = 0usize;
        self.reload_dir(root, window, now, &mut registered)?;
        info!(root = %root.display(), registered, "cache directory reloaded");
        Ok(registered)
    }

    fn reload_dir(
        &self,
        dir: &Path,
        window: Duration,
        now: SystemTime,
        registered: &mut usize,
    ) -> Result<()> {
        for dirent in std::fs::read_dir(dir)? {
            let dirent = dirent?;
            let path = dirent.path();
            let meta = dirent.metadata()?;
            if meta.is_dir() {
                self.reload_dir(&path, window, now, registered)?;
                continue;
            }
            let modified = meta.modified()?;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= window {
                if self.add(path.clone(), EntryOrigin::MirrorsRemote) {
                    debug!(path = %path.display(), "re-registered surviving cache file");
                    *registered += 1;
                }
            } else {
                debug!(path = %path.display(), age_secs = age.as_secs(),
                       "dropping stale cache file");
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "unable to drop stale cache file");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_insert_once() {
        let dir = EntryDirectory::new();
        let p = PathBuf::from("/cache/hdfs/nn1/a");
        assert!(dir.add(p.clone(), EntryOrigin::MirrorsRemote));
        assert!(!dir.add(p.clone(), EntryOrigin::FreshlyCreated));
        // the original entry survives the rejected second add
        assert_eq!(dir.find(&p).unwrap().origin(), EntryOrigin::MirrorsRemote);
    }

    #[test]
    fn test_pin_refcount() {
        let dir = EntryDirectory::new();
        let p = PathBuf::from("/cache/hdfs/nn1/b");
        dir.add(p.clone(), EntryOrigin::MirrorsRemote);
        let entry = dir.find(&p).unwrap();
        assert_eq!(entry.users(), 0);

        let pin1 = entry.pin();
        let pin2 = entry.pin();
        assert_eq!(entry.users(), 2);
        assert_eq!(pin1.entry().users(), 2);
        drop(pin1);
        assert_eq!(entry.users(), 1);
        drop(pin2);
        assert_eq!(entry.users(), 0);
    }

    #[test]
    fn test_pinned_entry_refuses_removal() {
        let dir = EntryDirectory::new();
        let p = PathBuf::from("/cache/hdfs/nn1/c");
        dir.add(p.clone(), EntryOrigin::MirrorsRemote);
        let pin = dir.find(&p).unwrap().pin();

        assert!(!dir.remove(&p, false));
        assert!(dir.find(&p).is_some());

        drop(pin);
        assert!(dir.remove(&p, false));
        assert!(dir.find(&p).is_none());
    }

    #[test]
    fn test_physical_removal_unlinks_content() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("cached.dat");
        std::fs::write(&p, b"bytes").unwrap();

        let dir = EntryDirectory::new();
        dir.add(p.clone(), EntryOrigin::MirrorsRemote);
        assert!(dir.remove(&p, true));
        assert!(!p.exists());
    }

    #[test]
    fn test_remove_tree_partial_when_busy() {
        let dir = EntryDirectory::new();
        let a = PathBuf::from("/cache/hdfs/nn1/t/a");
        let b = PathBuf::from("/cache/hdfs/nn1/t/b");
        let outside = PathBuf::from("/cache/hdfs/nn1/u/c");
        dir.add(a.clone(), EntryOrigin::MirrorsRemote);
        dir.add(b.clone(), EntryOrigin::MirrorsRemote);
        dir.add(outside.clone(), EntryOrigin::MirrorsRemote);

        let pin = dir.find(&a).unwrap().pin();
        assert!(!dir.remove_tree(Path::new("/cache/hdfs/nn1/t"), false));
        // the busy entry stays, its sibling is gone, unrelated paths untouched
        assert!(dir.find(&a).is_some());
        assert!(dir.find(&b).is_none());
        assert!(dir.find(&outside).is_some());

        drop(pin);
        assert!(dir.remove_tree(Path::new("/cache/hdfs/nn1/t"), false));
        assert!(dir.find(&a).is_none());
    }

    #[test]
    fn test_reload_registers_fresh_and_drops_stale() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("hdfs").join("nn1");
        std::fs::create_dir_all(&sub).unwrap();

        let fresh = sub.join("fresh.parq");
        std::fs::write(&fresh, b"new").unwrap();

        let stale = sub.join("stale.parq");
        std::fs::write(&stale, b"old").unwrap();
        let old_mtime = SystemTime::now() - Duration::from_secs(60 * 60 * 24 * 30);
        std::fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(old_mtime)
            .unwrap();

        let dir = EntryDirectory::new();
        let n = dir
            .reload(tmp.path(), Duration::from_secs(60 * 60 * 24 * 7))
            .unwrap();
        assert_eq!(n, 1);
        assert!(dir.find(&fresh).is_some());
        assert!(dir.find(&stale).is_none());
        assert!(!stale.exists());
    }
}
