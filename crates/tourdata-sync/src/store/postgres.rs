//! PostgreSQL record store

use super::{check_identifier, RecordStore, DEFAULT_BATCH_SIZE, SYNC_LOG_TABLE};
use crate::config::DatabaseConfig;
use crate::error::{Result, SyncError};
use crate::models::{ColumnValue, ProjectedRow, Row, SyncLogEntry};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::query_builder::Separated;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row as _};
use std::fmt::Display;
use std::time::Duration;
use tracing::debug;

/// Record store backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a pool without connecting.
    ///
    /// Connections open on first use, so an unreachable database surfaces
    /// from [`RecordStore::ping`].
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_lazy(&config.url)
            .map_err(|e| SyncError::config(format!("Invalid database URL: {}", e)))?;
        Ok(Self::new(pool))
    }
}

/// Validate the column set shared by every row of a batch
fn batch_columns(rows: &[Row]) -> Result<Vec<&str>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    first
        .keys()
        .map(|column| check_identifier(column))
        .collect()
}

fn bind_separated<Sep: Display>(b: &mut Separated<'_, '_, Postgres, Sep>, value: Option<&ColumnValue>) {
    match value.cloned() {
        None => {
            b.push("NULL");
        },
        Some(ColumnValue::Text(v)) => {
            b.push_bind(v);
        },
        Some(ColumnValue::Float(v)) => {
            b.push_bind(v);
        },
        Some(ColumnValue::Int(v)) => {
            b.push_bind(v);
        },
        Some(ColumnValue::Json(v)) => {
            b.push_bind(Json(v));
        },
    }
}

fn bind_value(qb: &mut QueryBuilder<'_, Postgres>, value: &ColumnValue) {
    match value.clone() {
        ColumnValue::Text(v) => {
            qb.push_bind(v);
        },
        ColumnValue::Float(v) => {
            qb.push_bind(v);
        },
        ColumnValue::Int(v) => {
            qb.push_bind(v);
        },
        ColumnValue::Json(v) => {
            qb.push_bind(Json(v));
        },
    }
}

fn insert_statement<'a>(table: &str, columns: &[&str], rows: &'a [Row]) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("INSERT INTO {} ({}) ", table, columns.join(", ")));
    qb.push_values(rows.iter(), |mut b, row| {
        for column in columns {
            bind_separated(&mut b, row.get(*column));
        }
    });
    qb
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT id FROM sync_logs LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::storage(SYNC_LOG_TABLE, e))?;
        Ok(())
    }

    async fn select(&self, table: &str, columns: &[&str]) -> Result<Vec<ProjectedRow>> {
        let table = check_identifier(table)?;
        let columns = columns
            .iter()
            .map(|column| check_identifier(column))
            .collect::<Result<Vec<_>>>()?;

        let projection = columns
            .iter()
            .map(|column| format!("{0}::text AS {0}", column))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {} FROM {}", projection, table);

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::storage(table, e))?;

        rows.iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| {
                        let value: Option<String> =
                            row.try_get(*column).map_err(|e| SyncError::storage(table, e))?;
                        Ok((column.to_string(), value))
                    })
                    .collect::<Result<ProjectedRow>>()
            })
            .collect()
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64> {
        let table = check_identifier(table)?;
        let columns = batch_columns(rows)?;
        if columns.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        for chunk in rows.chunks(DEFAULT_BATCH_SIZE) {
            let result = insert_statement(table, &columns, chunk)
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| SyncError::storage(table, e))?;
            written += result.rows_affected();
        }

        debug!(table, written, "Inserted rows");
        Ok(written)
    }

    async fn update(&self, table: &str, id: i64, row: &Row) -> Result<()> {
        let table = check_identifier(table)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET ", table));
        for (column, value) in row {
            qb.push(check_identifier(column)?).push(" = ");
            bind_value(&mut qb, value);
            qb.push(", ");
        }
        qb.push("updated_at = NOW() WHERE id = ").push_bind(id);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::storage(table, e))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::storage(table, format!("no row with id {}", id)));
        }
        Ok(())
    }

    async fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        conflict_columns: &[&str],
        batch_size: usize,
    ) -> Result<u64> {
        let table = check_identifier(table)?;
        let columns = batch_columns(rows)?;
        if columns.is_empty() {
            return Ok(0);
        }
        let conflict = conflict_columns
            .iter()
            .map(|column| check_identifier(column))
            .collect::<Result<Vec<_>>>()?;

        let assignments = columns
            .iter()
            .filter(|column| !conflict.contains(*column))
            .map(|column| format!("{0} = EXCLUDED.{0}", column))
            .chain(std::iter::once("updated_at = NOW()".to_string()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut written = 0;
        for chunk in rows.chunks(batch_size.max(1)) {
            let mut qb = insert_statement(table, &columns, chunk);
            qb.push(format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                conflict.join(", "),
                assignments
            ));
            let result = qb
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| SyncError::storage(table, e))?;
            written += result.rows_affected();
        }

        debug!(table, written, "Upserted rows");
        Ok(written)
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_logs (
                api_type, table_name, sync_date, total_items, new_items,
                updated_items, status, error_message, completed_at,
                execution_time_seconds
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&entry.api_type)
        .bind(&entry.table_name)
        .bind(entry.sync_date)
        .bind(entry.total_items)
        .bind(entry.new_items)
        .bind(entry.updated_items)
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .bind(entry.completed_at)
        .bind(entry.execution_time_seconds)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::storage(SYNC_LOG_TABLE, e))?;
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let table = check_identifier(table)?;
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::storage(table, e))?;
        row.try_get("n").map_err(|e| SyncError::storage(table, e))
    }
}
