//! Storage module for persisting crawl data
//!
//! This module handles everything written to disk, including:
//! - Atomic temp-then-rename file replacement with a backup copy
//! - The checkpoint store used for pause and resume
//! - A coalescing single-flight background writer shared by both lanes

mod atomic;
mod progress;
mod writer;

pub use atomic::write_atomic;
pub use progress::{ProgressPaths, ProgressStore};
pub use writer::CoalescingWriter;

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
