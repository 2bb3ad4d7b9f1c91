//! Configuration types for dfscache
//!
//! This module defines the configuration handed to the cache registry at
//! construction time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the cache registry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Local cache root (absolute filesystem path)
    pub root: PathBuf,
    /// Share of host memory the tiered backend may use, in percent
    pub memory_limit_percent: u8,
    /// Files whose mtime falls within this window are re-registered when
    /// the registry reconciles pre-existing on-disk cache content
    pub reload_time_window: Duration,
    /// Hard limit for total cached bytes; enforced by the entry
    /// subsystem, not by this layer
    pub size_hard_limit: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/dfscache"),
            memory_limit_percent: 50,
            reload_time_window: Duration::from_secs(7 * 24 * 3600),
            size_hard_limit: 0, // 0 = unlimited
        }
    }
}

impl CacheConfig {
    /// Create a configuration rooted at the given path, other fields default
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}
