//! Error types for the fvcrypt-core crate
//!
//! This module re-exports all error types from their defining modules so
//! callers have a single place to import them from.

// Re-export error types from submodules
pub use crate::container::creator::CreateError;
pub use crate::container::header::HeaderError;
pub use crate::crypto::keys::KeyFormatError;
pub use crate::fs::file::{FileVaultError, IoContext};
