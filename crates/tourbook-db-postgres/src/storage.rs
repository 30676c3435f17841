//! `RecordStore` implementation backed by PostgreSQL.

use async_trait::async_trait;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use tourbook_storage::{
    LifecycleRecord, RecordFilter, RecordId, RecordPatch, RecordStore, StorageError, TourStatus,
};
use tracing::{debug, instrument};

use crate::config::PostgresConfig;
use crate::error::PostgresError;
use crate::pool::create_pool;
use crate::schema::ensure_table;

type RecordRow = (i64, String, OffsetDateTime, OffsetDateTime);

/// PostgreSQL-backed record store.
///
/// Each `update` is a single `UPDATE ... RETURNING` statement, so it is atomic
/// on its own.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
    table: String,
}

impl PostgresRecordStore {
    /// Connects using `config`, creating the table when `create_table` is set.
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let table = config.quoted_table()?;
        let pool = create_pool(&config).await?;
        if config.create_table {
            ensure_table(&pool, &table).await?;
        }
        Ok(Self { pool, table })
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_record(row: RecordRow) -> Result<LifecycleRecord, StorageError> {
    let (id, status, start_time, end_time) = row;
    Ok(LifecycleRecord::new(
        id,
        status.parse::<TourStatus>()?,
        start_time,
        end_time,
    ))
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self), fields(table = %self.table))]
    async fn find_many(&self, filter: &RecordFilter) -> Result<Vec<LifecycleRecord>, StorageError> {
        let rows: Vec<RecordRow> = if filter.statuses.is_empty() {
            let sql = format!(
                "SELECT id, status, start_date, end_date FROM {} ORDER BY id",
                self.table
            );
            query_as(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(PostgresError::from)?
        } else {
            let statuses: Vec<String> = filter
                .statuses
                .iter()
                .map(|status| status.as_str().to_string())
                .collect();
            let sql = format!(
                "SELECT id, status, start_date, end_date FROM {} WHERE status = ANY($1) ORDER BY id",
                self.table
            );
            query_as(&sql)
                .bind(statuses)
                .fetch_all(&self.pool)
                .await
                .map_err(PostgresError::from)?
        };

        debug!(rows = rows.len(), "records fetched");
        rows.into_iter().map(row_to_record).collect()
    }

    #[instrument(skip(self, patch), fields(table = %self.table))]
    async fn update(
        &self,
        id: RecordId,
        patch: &RecordPatch,
    ) -> Result<LifecycleRecord, StorageError> {
        let sql = format!(
            "UPDATE {} SET status = COALESCE($2, status) WHERE id = $1 \
             RETURNING id, status, start_date, end_date",
            self.table
        );
        let row: Option<RecordRow> = query_as(&sql)
            .bind(id)
            .bind(patch.status.map(|status| status.as_str().to_string()))
            .fetch_optional(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        row.ok_or_else(|| StorageError::not_found(id))
            .and_then(row_to_record)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
