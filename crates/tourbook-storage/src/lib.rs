//! # tourbook-storage
//!
//! Record store abstraction for the tourbook server.
//!
//! This crate defines the lifecycle record model and the [`RecordStore`] trait
//! that storage backends implement. It contains no backend itself; see
//! `tourbook-db-memory` and `tourbook-db-postgres`.
//!
//! ## Example
//!
//! ```ignore
//! use tourbook_storage::{RecordFilter, RecordStore, StorageError, TourStatus};
//!
//! async fn active_tours(store: &dyn RecordStore) -> Result<usize, StorageError> {
//!     let filter = RecordFilter::status_in([TourStatus::Upcoming, TourStatus::Ongoing]);
//!     Ok(store.find_many(&filter).await?.len())
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::RecordStore;
pub use types::{LifecycleRecord, RecordFilter, RecordId, RecordPatch, TourStatus};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shareable record store.
pub type DynRecordStore = std::sync::Arc<dyn RecordStore>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tourbook_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::RecordStore;
    pub use crate::types::{LifecycleRecord, RecordFilter, RecordId, RecordPatch, TourStatus};
    pub use crate::{DynRecordStore, StorageResult};
}
