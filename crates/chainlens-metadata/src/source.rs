//! The data-source seam between the metadata layer and the indexed tables.
//!
//! Identifier arguments (`table`, `column`) are only ever supplied from the
//! physical schema description, never from user input.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};

use chainlens_storage::PostgresStore;

use crate::error::MetadataError;
use crate::query::{BindValue, SqlStatement};
use crate::schema::DataType;

/// Read access to the indexed tables for discovery and queries.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Total number of rows in an entity's table.
    async fn count_rows(&self, table: &str) -> Result<u64, MetadataError>;

    /// Distinct values of one column, optionally bounded to a prefix.
    async fn distinct_values(
        &self,
        table: &str,
        column: &str,
        prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, MetadataError>;

    /// Execute a compiled statement and return rows as JSON objects keyed by
    /// attribute name.
    async fn select_rows(
        &self,
        stmt: &SqlStatement,
    ) -> Result<Vec<Map<String, Value>>, MetadataError>;
}

/// Postgres-backed data source.
#[derive(Clone)]
pub struct PgDataSource {
    pool: PgPool,
}

impl PgDataSource {
    pub fn new(store: &PostgresStore) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }
}

/// Escape LIKE wildcards so a prefix only ever matches literally.
fn escape_like(prefix: &str) -> String {
    prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl DataSource for PgDataSource {
    async fn count_rows(&self, table: &str) -> Result<u64, MetadataError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MetadataError::Source(e.to_string()))?;
        Ok(count as u64)
    }

    async fn distinct_values(
        &self,
        table: &str,
        column: &str,
        prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, MetadataError> {
        let rows: Vec<Option<String>> = match prefix {
            Some(p) => {
                let pattern = format!("{}%", escape_like(p));
                sqlx::query_scalar(&format!(
                    "SELECT DISTINCT {column} FROM {table}
                     WHERE {column} LIKE $1 ESCAPE '\\'
                     ORDER BY {column} LIMIT {limit}"
                ))
                .bind(pattern)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_scalar(&format!(
                    "SELECT DISTINCT {column} FROM {table} ORDER BY {column} LIMIT {limit}"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| MetadataError::Source(e.to_string()))?;

        Ok(rows.into_iter().flatten().collect())
    }

    async fn select_rows(
        &self,
        stmt: &SqlStatement,
    ) -> Result<Vec<Map<String, Value>>, MetadataError> {
        let mut query = sqlx::query(&stmt.sql);
        for bind in &stmt.binds {
            query = match bind {
                BindValue::Text(v) => query.bind(v.clone()),
                BindValue::Int(v) => query.bind(*v),
                BindValue::Decimal(v) => query.bind(*v),
                BindValue::Bool(v) => query.bind(*v),
                BindValue::Timestamp(v) => query.bind(*v),
            };
        }

        let rows = tokio::time::timeout(stmt.timeout, query.fetch_all(&self.pool))
            .await
            .map_err(|_| MetadataError::Source("query timed out".into()))?
            .map_err(|e| MetadataError::Source(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut obj = Map::new();
            for (i, (name, data_type)) in stmt.projection.iter().enumerate() {
                let value = match data_type {
                    DataType::Int | DataType::Currency => row
                        .try_get::<Option<i64>, _>(i)
                        .map(|v| v.map(Value::from)),
                    DataType::Decimal => row
                        .try_get::<Option<f64>, _>(i)
                        .map(|v| v.map(Value::from)),
                    DataType::Boolean => row
                        .try_get::<Option<bool>, _>(i)
                        .map(|v| v.map(Value::from)),
                    DataType::DateTime => row
                        .try_get::<Option<DateTime<Utc>>, _>(i)
                        .map(|v| v.map(|ts| Value::from(ts.to_rfc3339()))),
                    DataType::String | DataType::Hash | DataType::AccountAddress => row
                        .try_get::<Option<String>, _>(i)
                        .map(|v| v.map(Value::from)),
                }
                .map_err(|e| MetadataError::Source(e.to_string()))?;
                obj.insert(name.clone(), value.unwrap_or(Value::Null));
            }
            out.push(obj);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_escaping_neutralizes_wildcards() {
        assert_eq!(escape_like("tz1%"), "tz1\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("plain"), "plain");
    }
}
