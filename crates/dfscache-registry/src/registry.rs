//! Cache registry
//!
//! The registry is the single entry point of the caching layer. It owns
//! three independent tables behind their own locks:
//! - the adapter directory, one pooling adapter per (backend-type, host)
//! - the entry directory of locally mirrored files
//! - the create-from-select pairing table (local path -> remote path)

use crate::entry::{CacheEntry, EntryDirectory, EntryOrigin};
use dfscache_backend::RemoteBinding;
use dfscache_common::{BackendDescriptor, CacheConfig, Error, PoolKey, Result};
use dfscache_pool::FilesystemAdapter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Registry of adapters, cache entries and pairings for one cache root
pub struct CacheRegistry<B: RemoteBinding> {
    binding: Arc<B>,
    config: CacheConfig,
    adapters: Mutex<HashMap<PoolKey, Arc<FilesystemAdapter<B>>>>,
    entries: EntryDirectory,
    pairings: Mutex<HashMap<PathBuf, String>>,
}

impl<B: RemoteBinding> std::fmt::Debug for CacheRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<B: RemoteBinding> CacheRegistry<B> {
    /// Bring up the registry over a cache root. The root is created when
    /// absent; content surviving from a previous run is reconciled through
    /// the entry directory's reload scan.
    pub fn new(binding: Arc<B>, config: CacheConfig) -> Result<Self> {
        let root = &config.root;
        if root.exists() {
            if !root.is_dir() {
                warn!(root = %root.display(), "cache root is not a directory");
                return Err(Error::configuration(format!(
                    "cache root {} is not a directory",
                    root.display()
                )));
            }
        } else {
            std::fs::create_dir_all(root).map_err(|e| {
                Error::configuration(format!(
                    "unable to create cache root {}: {e}",
                    root.display()
                ))
            })?;
        }

        let entries = EntryDirectory::new();
        entries
            .reload(root, config.reload_time_window)
            .map_err(|e| {
                Error::configuration(format!(
                    "reload of cache root {} failed: {e}",
                    root.display()
                ))
            })?;
        info!(root = %root.display(), "cache registry initialized");

        Ok(Self {
            binding,
            config,
            adapters: Mutex::new(HashMap::new()),
            entries,
            pairings: Mutex::new(HashMap::new()),
        })
    }

    /// Make a backend endpoint usable. Resolves the from-config sentinel
    /// host first, then registers a pooling adapter for the endpoint if
    /// one is not present yet. Idempotent for identical descriptors.
    pub fn setup_filesystem(&self, descriptor: &mut BackendDescriptor) -> Result<()> {
        if descriptor.needs_resolution() {
            FilesystemAdapter::resolve_default_endpoint(self.binding.as_ref(), descriptor)
                .map_err(|e| {
                    Error::AdapterNotConfigured(format!(
                        "default endpoint resolution failed: {e}"
                    ))
                })?;
        }

        let key = descriptor.pool_key();
        let mut adapters = self.adapters.lock();
        if !adapters.contains_key(&key) {
            info!(backend = %descriptor, "registering filesystem adapter");
            adapters.insert(
                key,
                Arc::new(FilesystemAdapter::new(self.binding.clone(), descriptor)),
            );
        }
        Ok(())
    }

    /// Adapter for an endpoint that went through `setup_filesystem`
    #[must_use]
    pub fn adapter(&self, descriptor: &BackendDescriptor) -> Option<Arc<FilesystemAdapter<B>>> {
        self.adapters.lock().get(&descriptor.pool_key()).cloned()
    }

    #[must_use]
    pub fn adapter_count(&self) -> usize {
        self.adapters.lock().len()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Canonical local path for a remote file:
    /// `root / backend-type / host / remote-path`, with an optional
    /// transform discriminator appended to the file name so transformed
    /// copies key separately. An empty remote path derives nothing, and so
    /// does one whose components would escape the cache root.
    #[must_use]
    pub fn local_path(
        &self,
        descriptor: &BackendDescriptor,
        remote_path: &str,
        transform: Option<&str>,
    ) -> Option<PathBuf> {
        let rel = remote_path.trim_start_matches('/');
        if rel.is_empty() {
            return None;
        }
        // the derived key must stay under the cache root once joined
        if Path::new(rel)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        let mut path = self.config.root.join(descriptor.fs_type.to_string());
        if !descriptor.host.is_empty() {
            path.push(&descriptor.host);
        }
        path.push(rel);
        if let Some(transform) = transform {
            let name = path.file_name()?.to_str()?.to_owned();
            path.set_file_name(format!("{name}.{transform}"));
        }
        Some(path)
    }

    /// Look up the cache entry mirroring a remote file
    #[must_use]
    pub fn find_file(
        &self,
        remote_path: &str,
        descriptor: &BackendDescriptor,
        transform: Option<&str>,
    ) -> Option<Arc<CacheEntry>> {
        let path = self.local_path(descriptor, remote_path, transform)?;
        self.entries.find(&path)
    }

    /// Look up an entry directly by its canonical local path
    #[must_use]
    pub fn find_file_local(&self, canonical: &Path) -> Option<Arc<CacheEntry>> {
        self.entries.find(canonical)
    }

    /// Register a cache entry for a remote file. False when the remote
    /// path derives no local key or the entry already exists.
    pub fn add_file(
        &self,
        remote_path: &str,
        descriptor: &BackendDescriptor,
        transform: Option<&str>,
        origin: EntryOrigin,
    ) -> bool {
        match self.local_path(descriptor, remote_path, transform) {
            Some(path) => self.entries.add(path, origin),
            None => false,
        }
    }

    /// Drop the cache entry for one remote file. Refused without side
    /// effects while the entry is pinned; with `physically` the local
    /// content must actually go away for the call to report true.
    pub fn delete_file(
        &self,
        descriptor: &BackendDescriptor,
        remote_path: &str,
        physically: bool,
    ) -> bool {
        match self.local_path(descriptor, remote_path, None) {
            Some(path) => self.entries.remove(&path, physically),
            None => false,
        }
    }

    /// Drop every cache entry under a remote directory, physically. True
    /// only when all contained entries were removable; pinned entries
    /// block their own removal and there is no rollback.
    pub fn delete_path(&self, descriptor: &BackendDescriptor, remote_path: &str) -> bool {
        match self.local_path(descriptor, remote_path, None) {
            Some(prefix) => self.entries.remove_tree(&prefix, true),
            None => false,
        }
    }

    /// Record a create-from-select pairing. Insert-once per local path;
    /// a second registration for the same local path is refused.
    pub fn register_create_from_select(&self, local: &Path, remote: &str) -> bool {
        let mut pairings = self.pairings.lock();
        if pairings.contains_key(local) {
            return false;
        }
        pairings.insert(local.to_path_buf(), remote.to_string());
        true
    }

    /// Drop a pairing; false if none was registered
    pub fn unregister_create_from_select(&self, local: &Path) -> bool {
        self.pairings.lock().remove(local).is_some()
    }

    /// Remote side of a registered pairing
    #[must_use]
    pub fn create_from_select(&self, local: &Path) -> Option<String> {
        self.pairings.lock().get(local).cloned()
    }
}
