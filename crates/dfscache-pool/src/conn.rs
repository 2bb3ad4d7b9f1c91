//! Pooled connection slots
//!
//! A slot, once appended to its pool, is never removed; a broken slot is
//! repaired in place on a later acquisition. State transitions happen only
//! under the owning adapter's pool lock.

use dfscache_backend::RemoteBinding;
use std::sync::Arc;

/// Observable state of one pooled connection slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    /// No usable native handle; eligible for in-place repair
    Uninitialized,
    /// Reserved while an in-place repair connect is in flight
    Connecting,
    /// Connected and available for acquisition
    FreeReady,
    /// Exclusively held by a lease
    Busy,
}

/// One slot of an adapter's pool.
///
/// The handle is carried inside the state so that a `FreeReady` or `Busy`
/// slot without a connection is unrepresentable.
pub(crate) enum Slot<B: RemoteBinding> {
    Uninitialized,
    Connecting,
    FreeReady(Arc<B::Conn>),
    Busy(Arc<B::Conn>),
}

impl<B: RemoteBinding> Slot<B> {
    pub(crate) fn state(&self) -> ConnState {
        match self {
            Self::Uninitialized => ConnState::Uninitialized,
            Self::Connecting => ConnState::Connecting,
            Self::FreeReady(_) => ConnState::FreeReady,
            Self::Busy(_) => ConnState::Busy,
        }
    }

    /// Uninitialized → Connecting, claiming the slot for a repair whose
    /// native connect runs with the pool lock released
    pub(crate) fn reserve(&mut self) {
        if matches!(self, Self::Uninitialized) {
            *self = Self::Connecting;
        }
    }

    /// Free → Busy; returns the handle for the lease, `None` if the slot
    /// was not acquirable
    pub(crate) fn acquire(&mut self) -> Option<Arc<B::Conn>> {
        match self {
            Self::FreeReady(conn) => {
                let conn = conn.clone();
                *self = Self::Busy(conn.clone());
                Some(conn)
            }
            _ => None,
        }
    }

    /// Busy → FreeReady. A release of a non-busy slot is a no-op.
    pub(crate) fn release(&mut self) {
        if let Self::Busy(conn) = self {
            let conn = conn.clone();
            *self = Self::FreeReady(conn);
        }
    }

    /// Any state → Uninitialized, dropping the pool's handle reference
    pub(crate) fn invalidate(&mut self) {
        *self = Self::Uninitialized;
    }

    /// Install a freshly connected handle and hand it out Busy
    /// (the in-place repair path skips FreeReady)
    pub(crate) fn repair(&mut self, conn: Arc<B::Conn>) -> Arc<B::Conn> {
        *self = Self::Busy(conn.clone());
        conn
    }

    pub(crate) fn conn(&self) -> Option<&Arc<B::Conn>> {
        match self {
            Self::Uninitialized | Self::Connecting => None,
            Self::FreeReady(conn) | Self::Busy(conn) => Some(conn),
        }
    }
}
