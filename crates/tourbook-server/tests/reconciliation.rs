//! End-to-end reconciliation against the in-memory backends.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::macros::datetime;
use tourbook_db_memory::InMemoryRecordStore;
use tourbook_server::cache::{
    CacheAside, CacheStore, Invalidator, MemoryCacheStore, ResourceKind, StalePatterns,
};
use tourbook_server::clock::ManualClock;
use tourbook_server::jobs::{JobScheduler, JobSchedulerConfig, TourStatusReconciler};
use tourbook_storage::{
    LifecycleRecord, RecordFilter, RecordId, RecordPatch, RecordStore, StorageError, TourStatus,
};

/// Record store whose writes to selected ids never return.
struct Stalling {
    inner: InMemoryRecordStore,
    stalled: HashSet<RecordId>,
}

#[async_trait]
impl RecordStore for Stalling {
    async fn find_many(&self, filter: &RecordFilter) -> Result<Vec<LifecycleRecord>, StorageError> {
        self.inner.find_many(filter).await
    }

    async fn update(&self, id: RecordId, patch: &RecordPatch) -> Result<LifecycleRecord, StorageError> {
        if self.stalled.contains(&id) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.update(id, patch).await
    }

    fn backend_name(&self) -> &'static str {
        "stalling"
    }
}

#[tokio::test]
async fn test_cached_tour_list_reflects_reconciled_status() {
    let clock = Arc::new(ManualClock::new(datetime!(2026-08-01 09:58 UTC)));
    let cache = Arc::new(MemoryCacheStore::with_clock(clock.clone()));
    let records = Arc::new(InMemoryRecordStore::with_records([
        LifecycleRecord::new(
            1,
            TourStatus::Upcoming,
            datetime!(2026-08-01 10:00 UTC),
            datetime!(2026-08-03 18:00 UTC),
        ),
        LifecycleRecord::new(
            2,
            TourStatus::Cancelled,
            datetime!(2026-08-01 10:00 UTC),
            datetime!(2026-08-02 18:00 UTC),
        ),
    ]));

    let tours: CacheAside<str> =
        CacheAside::new(cache.clone(), Duration::from_secs(3600), |q: &str| {
            ResourceKind::Tours.list_key(q)
        });
    let list = |store: Arc<InMemoryRecordStore>| async move {
        store.find_many(&RecordFilter::all()).await
    };

    let before = tours.fetch("page=1", || list(records.clone())).await.unwrap();
    assert_eq!(before[0].status, TourStatus::Upcoming);

    let invalidator = Invalidator::new(cache.clone(), StalePatterns::new());
    let job = TourStatusReconciler::new(records.clone(), clock.clone()).with_invalidator(invalidator);
    let scheduler = JobScheduler::new(Arc::new(job), JobSchedulerConfig::default());

    // Nothing is due yet: cache keeps serving the same list.
    let report = scheduler.run_once().await.unwrap();
    assert_eq!(report.counts(), (0, 0, 1));
    assert!(cache.get("tours:list:page=1").await.unwrap().is_some());

    // Past the start, well within the cache TTL.
    clock.advance(Duration::from_secs(5 * 60));
    assert!(cache.get("tours:list:page=1").await.unwrap().is_some());
    let report = scheduler.run_once().await.unwrap();
    assert_eq!(report.counts(), (1, 0, 0));
    assert!(cache.get("tours:list:page=1").await.unwrap().is_none());

    let after = tours.fetch("page=1", || list(records.clone())).await.unwrap();
    assert_eq!(after[0].status, TourStatus::Ongoing);
    assert_eq!(after[1].status, TourStatus::Cancelled);

    clock.advance(Duration::from_secs(3 * 24 * 3600));
    let report = scheduler.run_once().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(records.get(1).unwrap().status, TourStatus::Completed);
    assert_eq!(records.get(2).unwrap().status, TourStatus::Cancelled);

    // Completed tours leave the active scan.
    let report = scheduler.run_once().await.unwrap();
    assert_eq!(report.counts(), (0, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cut_run_still_invalidates_written_tours() {
    let clock = Arc::new(ManualClock::new(datetime!(2026-08-01 10:05 UTC)));
    let cache = Arc::new(MemoryCacheStore::with_clock(clock.clone()));
    let start = datetime!(2026-08-01 10:00 UTC);
    let end = datetime!(2026-08-03 18:00 UTC);
    let records = Arc::new(Stalling {
        inner: InMemoryRecordStore::with_records([
            LifecycleRecord::new(1, TourStatus::Upcoming, start, end),
            LifecycleRecord::new(2, TourStatus::Upcoming, start, end),
        ]),
        stalled: HashSet::from([2]),
    });

    let tour: CacheAside<RecordId> =
        CacheAside::new(cache.clone(), Duration::from_secs(3600), |id: &RecordId| {
            ResourceKind::Tours.item_key(id)
        });
    let read = |id: RecordId| {
        let records = records.clone();
        async move { Ok::<_, StorageError>(records.inner.get(id)) }
    };
    let cached = tour.fetch(&1, || read(1)).await.unwrap();
    assert_eq!(cached.map(|r| r.status), Some(TourStatus::Upcoming));

    let invalidator = Invalidator::new(cache.clone(), StalePatterns::new());
    let job = TourStatusReconciler::new(records.clone(), clock.clone()).with_invalidator(invalidator);
    let scheduler = JobScheduler::new(
        Arc::new(job),
        JobSchedulerConfig {
            max_run_secs: Some(1),
            ..Default::default()
        },
    );

    let report = scheduler.run_once().await.unwrap();
    assert!(report.timed_out);
    assert_eq!(report.counts(), (1, 1, 0));
    assert_eq!(records.inner.get(1).unwrap().status, TourStatus::Ongoing);
    assert_eq!(records.inner.get(2).unwrap().status, TourStatus::Upcoming);

    // The written tour is no longer served from cache.
    assert!(cache.get("tours:item:1").await.unwrap().is_none());
    let fresh = tour.fetch(&1, || read(1)).await.unwrap();
    assert_eq!(fresh.map(|r| r.status), Some(TourStatus::Ongoing));
}
