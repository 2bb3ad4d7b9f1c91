//! dfscache Backend - the native remote-filesystem binding seam
//!
//! This crate defines the opaque boundary to the native filesystem
//! libraries:
//! - `RemoteBinding`, the full operation surface one backend library
//!   exposes against a single endpoint
//! - `LocalBinding`, a local-disk implementation used for the `local`
//!   backend type and as a test backend

pub mod binding;
pub mod local;
pub mod mock;

pub use binding::RemoteBinding;
pub use local::{LocalBinding, LocalConn, LocalFile};
pub use mock::MockBinding;
