//! Storage Layer
//!
//! Keyed job ledger behind the [`JobRepository`] abstraction.

mod file;
mod record;
mod repository;

pub use file::JsonFileRepository;
pub use record::{JobRecord, JobStatus};
pub use repository::{InMemoryRepository, JobRepository};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("Job not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
