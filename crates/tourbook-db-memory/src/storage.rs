use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use tourbook_storage::{
    LifecycleRecord, RecordFilter, RecordId, RecordPatch, RecordStore, StorageError,
};

/// In-memory record store using papaya lock-free HashMap.
///
/// Updates go through papaya's compare-and-swap `update`, so each one is
/// atomic with respect to concurrent writers of the same record.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    data: PapayaHashMap<RecordId, LifecycleRecord>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            data: PapayaHashMap::new(),
        }
    }

    /// Creates a store seeded with `records`.
    pub fn with_records(records: impl IntoIterator<Item = LifecycleRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Inserts or replaces a record.
    pub fn insert(&self, record: LifecycleRecord) {
        self.data.pin().insert(record.id, record);
    }

    /// Returns a copy of the record with the given id.
    pub fn get(&self, id: RecordId) -> Option<LifecycleRecord> {
        self.data.pin().get(&id).cloned()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_many(&self, filter: &RecordFilter) -> Result<Vec<LifecycleRecord>, StorageError> {
        let guard = self.data.pin();
        let mut records: Vec<LifecycleRecord> = guard
            .iter()
            .filter(|(_, record)| filter.matches(record))
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    async fn update(
        &self,
        id: RecordId,
        patch: &RecordPatch,
    ) -> Result<LifecycleRecord, StorageError> {
        let guard = self.data.pin();
        let updated = guard
            .update(id, |current| {
                let mut next = current.clone();
                patch.apply(&mut next);
                next
            })
            .cloned()
            .ok_or_else(|| StorageError::not_found(id))?;

        tracing::debug!(record_id = id, status = %updated.status, "record updated (memory)");
        Ok(updated)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
