//! Record types for the storage abstraction layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::StorageError;

/// Identifier of a stored record.
pub type RecordId = i64;

/// Lifecycle status of a tour.
///
/// `Cancelled` is absorbing: no automatic transition ever leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TourStatus {
    Upcoming,
    Ongoing,
    Completed,
    Cancelled,
}

impl TourStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TourStatus; 4] = [
        TourStatus::Upcoming,
        TourStatus::Ongoing,
        TourStatus::Completed,
        TourStatus::Cancelled,
    ];

    /// Returns the canonical upper-case name stored in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TourStatus::Upcoming => "UPCOMING",
            TourStatus::Ongoing => "ONGOING",
            TourStatus::Completed => "COMPLETED",
            TourStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TourStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TourStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TourStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StorageError::invalid_record(format!("unknown tour status '{s}'")))
    }
}

/// A record with a lifecycle status and a time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRecord {
    pub id: RecordId,
    pub status: TourStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
}

impl LifecycleRecord {
    /// Creates a new record.
    #[must_use]
    pub fn new(
        id: RecordId,
        status: TourStatus,
        start_time: OffsetDateTime,
        end_time: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            status,
            start_time,
            end_time,
        }
    }
}

/// Predicate used by [`RecordStore::find_many`](crate::RecordStore::find_many).
///
/// An empty status set matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub statuses: Vec<TourStatus>,
}

impl RecordFilter {
    /// Matches every record.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches records whose status is one of `statuses`.
    #[must_use]
    pub fn status_in(statuses: impl IntoIterator<Item = TourStatus>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
        }
    }

    /// Evaluates the filter against a record.
    #[must_use]
    pub fn matches(&self, record: &LifecycleRecord) -> bool {
        self.statuses.is_empty() || self.statuses.contains(&record.status)
    }
}

/// Partial update applied by [`RecordStore::update`](crate::RecordStore::update).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub status: Option<TourStatus>,
}

impl RecordPatch {
    /// A patch that only sets the status.
    #[must_use]
    pub fn status(status: TourStatus) -> Self {
        Self {
            status: Some(status),
        }
    }

    /// Returns `true` when the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
    }

    /// Applies the patch to a record in place.
    pub fn apply(&self, record: &mut LifecycleRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(status: TourStatus) -> LifecycleRecord {
        LifecycleRecord::new(
            1,
            status,
            datetime!(2026-05-01 08:00 UTC),
            datetime!(2026-05-07 18:00 UTC),
        )
    }

    #[test]
    fn test_status_serialization() {
        let serialized = serde_json::to_string(&TourStatus::Ongoing).unwrap();
        assert_eq!(serialized, "\"ONGOING\"");

        let parsed: TourStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(parsed, TourStatus::Cancelled);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("upcoming".parse::<TourStatus>().unwrap(), TourStatus::Upcoming);
        assert_eq!("COMPLETED".parse::<TourStatus>().unwrap(), TourStatus::Completed);
        assert!("ARCHIVED".parse::<TourStatus>().is_err());
    }

    #[test]
    fn test_filter_matches() {
        let active = RecordFilter::status_in([TourStatus::Upcoming, TourStatus::Ongoing]);
        assert!(active.matches(&record(TourStatus::Ongoing)));
        assert!(!active.matches(&record(TourStatus::Cancelled)));
        assert!(RecordFilter::all().matches(&record(TourStatus::Completed)));
    }

    #[test]
    fn test_patch_apply() {
        let mut rec = record(TourStatus::Upcoming);
        RecordPatch::default().apply(&mut rec);
        assert_eq!(rec.status, TourStatus::Upcoming);

        RecordPatch::status(TourStatus::Ongoing).apply(&mut rec);
        assert_eq!(rec.status, TourStatus::Ongoing);
        assert!(RecordPatch::default().is_empty());
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_value(record(TourStatus::Upcoming)).unwrap();
        assert_eq!(json["status"], "UPCOMING");
        assert_eq!(json["startTime"], "2026-05-01T08:00:00Z");
        assert!(json.get("endTime").is_some());
    }
}
