//! Core type definitions for dfscache
//!
//! This module defines the backend descriptor, pooling identity and the
//! small value types crossing the native-binding seam.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Host value requesting that the effective endpoint be resolved from the
/// backend's own configuration before first use.
pub const DEFAULT_HOST_ALIAS: &str = "default";

/// Supported remote filesystem kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FsType {
    /// Primary distributed filesystem (Hadoop-style namenode)
    Hdfs,
    /// Object store, first dialect
    S3n,
    /// Object store, second dialect
    S3a,
    /// Local disk
    Local,
    /// Tiered in-memory store; files become cheap to seek only after one
    /// complete sequential read
    TieredMemory,
    /// Effective type must be resolved from backend configuration
    DefaultFromConfig,
    Other,
    Unspecified,
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hdfs => "hdfs",
            Self::S3n => "s3n",
            Self::S3a => "s3a",
            // local maps to the file scheme
            Self::Local => "file",
            Self::TieredMemory => "tiered",
            Self::DefaultFromConfig => "default",
            Self::Other => "other",
            Self::Unspecified => "unspecified",
        };
        write!(f, "{s}")
    }
}

/// Connection details for one remote filesystem backend, as configured.
///
/// Identity for pooling purposes is `(fs_type, host)` only; port and the
/// auth fields are connection parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub fs_type: FsType,
    pub host: String,
    pub port: i32,
    /// User/credential name forwarded to the native binding
    pub credentials: String,
    pub password: String,
    /// True when this descriptor names the cluster default backend
    pub default: bool,
}

impl BackendDescriptor {
    pub fn new(fs_type: FsType, host: impl Into<String>, port: i32) -> Self {
        Self {
            fs_type,
            host: host.into(),
            port,
            credentials: String::new(),
            password: String::new(),
            default: false,
        }
    }

    /// True when the host carries the resolve-from-config sentinel and the
    /// effective endpoint must be resolved before any pooling happens
    #[must_use]
    pub fn needs_resolution(&self) -> bool {
        self.host == DEFAULT_HOST_ALIAS
    }

    /// Pooling identity of this descriptor
    #[must_use]
    pub fn pool_key(&self) -> PoolKey {
        PoolKey::new(self.fs_type, &self.host)
    }
}

impl fmt::Display for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.fs_type, self.host, self.port)
    }
}

/// Composite pooling identity: one adapter exists per distinct key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub fs_type: FsType,
    pub host: String,
}

impl PoolKey {
    pub fn new(fs_type: FsType, host: impl Into<String>) -> Self {
        Self {
            fs_type,
            host: host.into(),
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fs_type, self.host)
    }
}

/// Connection parameters handed to the native binding.
///
/// An empty host selects the local/default filesystem; the port is present
/// only when the configured port was positive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub fs_type: FsType,
    pub host: String,
    pub port: Option<u16>,
}

impl Endpoint {
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.host.is_empty()
    }
}

/// Access mode for opening a remote file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or overwrite
    Write,
    Append,
}

impl OpenMode {
    #[must_use]
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read)
    }
}

/// Kind of a remote filesystem object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// Metadata for one remote filesystem object, as reported by the binding
#[derive(Clone, Debug)]
pub struct FileStatus {
    pub path: String,
    pub kind: FileKind,
    pub len: u64,
    pub modified: Option<SystemTime>,
    pub owner: String,
    pub group: String,
    pub permissions: u16,
}

/// Options for a zero-copy read, fixed at setup time.
///
/// Buffer teardown is the drop of the returned buffer.
#[derive(Clone, Debug, Default)]
pub struct ZeroCopyOptions {
    pub skip_checksum: bool,
    /// Byte-buffer pool implementation name, backend-specific
    pub buffer_pool: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_key_ignores_port_and_auth() {
        let mut a = BackendDescriptor::new(FsType::Hdfs, "nn1", 8020);
        let mut b = BackendDescriptor::new(FsType::Hdfs, "nn1", 9000);
        a.credentials = "alice".into();
        b.credentials = "bob".into();
        assert_eq!(a.pool_key(), b.pool_key());
    }

    #[test]
    fn test_needs_resolution() {
        let d = BackendDescriptor::new(FsType::DefaultFromConfig, DEFAULT_HOST_ALIAS, 0);
        assert!(d.needs_resolution());
        let d = BackendDescriptor::new(FsType::Hdfs, "nn1", 8020);
        assert!(!d.needs_resolution());
    }

    #[test]
    fn test_fs_type_display() {
        assert_eq!(FsType::Local.to_string(), "file");
        assert_eq!(FsType::Hdfs.to_string(), "hdfs");
        assert_eq!(FsType::TieredMemory.to_string(), "tiered");
    }
}
