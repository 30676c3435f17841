//! Table bootstrap for development databases.
//!
//! Production schemas are owned by the application's migration tooling; this
//! only creates the minimal shape the record store reads and writes.

use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::Result;

/// Creates the tour table if it does not exist.
///
/// `quoted_table` must already be validated and quoted
/// (see [`PostgresConfig::quoted_table`](crate::PostgresConfig::quoted_table)).
#[instrument(skip(pool))]
pub async fn ensure_table(pool: &PgPool, quoted_table: &str) -> Result<()> {
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {quoted_table} (
            id BIGSERIAL PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'UPCOMING',
            start_date TIMESTAMPTZ NOT NULL,
            end_date TIMESTAMPTZ NOT NULL
        )
        "#
    );
    sqlx_core::query::query(&ddl).execute(pool).await?;

    info!(table = %quoted_table, "Tour table ensured");
    Ok(())
}
