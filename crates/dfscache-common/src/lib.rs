//! dfscache Common - Shared types and utilities
//!
//! This crate provides the common types, error definitions, and
//! configuration structures used across all dfscache components.

pub mod config;
pub mod error;
pub mod types;

pub use config::CacheConfig;
pub use error::{Error, Result};
pub use types::*;
