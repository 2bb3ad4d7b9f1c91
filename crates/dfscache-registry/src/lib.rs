//! dfscache Registry - the caching layer's entry point
//!
//! Maps remote filesystem identities and remote paths to pooled adapters
//! and local cache entries:
//! - adapter directory with at most one pooling adapter per endpoint
//! - refcounted entry directory over the local cache root, reconciled on
//!   startup against content surviving from a previous run
//! - create-from-select pairing table for files written locally first

pub mod entry;
pub mod registry;

pub use entry::{CacheEntry, EntryDirectory, EntryOrigin, EntryPin};
pub use registry::CacheRegistry;
