//! dfscache Pool - per-endpoint connection pooling
//!
//! One `FilesystemAdapter` owns a growable pool of native connections to a
//! single (backend-type, host, port) endpoint:
//! - demand-driven pool growth with in-place repair of broken slots
//! - scope-bound `ConnLease` gating every remote operation
//! - warm-open strategy for tiered backends that must fully read a file
//!   once before it becomes cheap to seek

pub mod adapter;
pub mod conn;
pub mod lease;
pub mod warm;

pub use adapter::FilesystemAdapter;
pub use conn::ConnState;
pub use lease::ConnLease;
pub use warm::OpenStrategy;
