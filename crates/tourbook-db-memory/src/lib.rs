//! In-memory record store backend for the tourbook server.
//!
//! This crate provides an in-memory implementation of the `RecordStore` trait
//! from `tourbook-storage`, using a papaya lock-free HashMap for concurrent access.
//! It backs local development and tests.
//!
//! # Example
//!
//! ```ignore
//! use tourbook_db_memory::InMemoryRecordStore;
//! use tourbook_storage::{RecordFilter, RecordStore};
//!
//! let store = InMemoryRecordStore::new();
//! store.insert(record);
//! let all = store.find_many(&RecordFilter::all()).await?;
//! ```

pub mod storage;

pub use storage::InMemoryRecordStore;
pub use tourbook_storage::{RecordStore, StorageError};

/// Creates a new shareable in-memory record store.
pub fn create_record_store() -> tourbook_storage::DynRecordStore {
    std::sync::Arc::new(InMemoryRecordStore::new())
}
