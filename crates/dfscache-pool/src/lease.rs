//! Scope-bound connection lease
//!
//! A lease is the exclusive right to use one pooled connection. It cannot
//! be cloned, it cannot outlive its adapter, and its drop returns the slot
//! to `FreeReady` on every exit path. A failed acquisition never produces
//! a lease, so every lease in existence is usable.

use crate::adapter::FilesystemAdapter;
use dfscache_backend::RemoteBinding;
use std::sync::Arc;

/// Exclusive lease over one pooled connection
pub struct ConnLease<'a, B: RemoteBinding> {
    adapter: &'a FilesystemAdapter<B>,
    slot: usize,
    conn: Arc<B::Conn>,
    broken: bool,
}

impl<B: RemoteBinding> std::fmt::Debug for ConnLease<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnLease")
            .field("slot", &self.slot)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl<'a, B: RemoteBinding> ConnLease<'a, B> {
    pub(crate) fn new(adapter: &'a FilesystemAdapter<B>, slot: usize, conn: Arc<B::Conn>) -> Self {
        Self {
            adapter,
            slot,
            conn,
            broken: false,
        }
    }

    /// The leased native connection
    #[must_use]
    pub fn conn(&self) -> &B::Conn {
        &self.conn
    }

    /// Index of the leased slot in its adapter's pool
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Give the connection back flagged as broken. The slot goes to
    /// `Uninitialized` instead of `FreeReady`; the next acquisition will
    /// repair it in place.
    pub fn mark_broken(mut self) {
        self.broken = true;
    }
}

impl<B: RemoteBinding> Drop for ConnLease<'_, B> {
    fn drop(&mut self) {
        if self.broken {
            self.adapter.break_slot(self.slot);
        } else {
            self.adapter.release_slot(self.slot);
        }
    }
}
