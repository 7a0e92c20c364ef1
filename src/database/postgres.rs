//! Postgres-backed store.
//!
//! One table per resource type (`blog-posts` -> `blog_posts`). Rows travel as JSONB:
//! reads use `to_jsonb(t)` and writes go through `jsonb_populate_record`, so the store
//! needs no per-table mapping code.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::{debug, info};

use super::record::Record;
use super::store::{Store, StoreError};
use crate::filter::{Filter, Query, SqlResult};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        info!("Connected Postgres store");
        Ok(Self::new(pool))
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn table_name(resource_type: &str) -> Result<String, StoreError> {
        let table = resource_type.replace('-', "_");
        Filter::validate_table_name(&table)?;
        Ok(table)
    }

    fn quoted_columns(attributes: &Map<String, Value>) -> Result<String, StoreError> {
        let mut columns = Vec::with_capacity(attributes.len());
        for key in attributes.keys() {
            Filter::validate_column(key)?;
            columns.push(format!("\"{}\"", key));
        }
        Ok(columns.join(", "))
    }

    fn row_to_map(value: Value) -> Result<Map<String, Value>, StoreError> {
        match value {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::RowShape(format!("expected JSON object, got {}", other))),
        }
    }

    async fn fetch_rows(&self, sql: &SqlResult) -> Result<Vec<Map<String, Value>>, StoreError> {
        debug!("SQL: {} {:?}", sql.query, sql.params);
        let mut q = sqlx::query(&sql.query);
        for param in &sql.params {
            q = q.bind(param);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| Self::row_to_map(row.try_get::<Value, _>("row")?))
            .collect()
    }

    async fn insert(&self, table: &str, record: &Record) -> Result<Value, StoreError> {
        let attributes = record.attributes();
        let row = if attributes.is_empty() {
            let sql = format!("INSERT INTO \"{}\" AS t DEFAULT VALUES RETURNING to_jsonb(t) AS row", table);
            debug!("SQL: {}", sql);
            sqlx::query(&sql).fetch_one(&self.pool).await?
        } else {
            let columns = Self::quoted_columns(attributes)?;
            let sql = format!(
                "INSERT INTO \"{table}\" AS t ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::\"{table}\", $1) RETURNING to_jsonb(t) AS row"
            );
            debug!("SQL: {}", sql);
            sqlx::query(&sql)
                .bind(Value::Object(attributes.clone()))
                .fetch_one(&self.pool)
                .await?
        };
        Ok(row.try_get::<Value, _>("row")?)
    }

    async fn update(&self, table: &str, id: &str, record: &Record) -> Result<Option<Value>, StoreError> {
        let dirty: Map<String, Value> = record
            .dirty_fields()
            .into_iter()
            .filter_map(|key| record.get(key).map(|value| (key.to_string(), value.clone())))
            .collect();
        let columns = Self::quoted_columns(&dirty)?;
        let sql = format!(
            "UPDATE \"{table}\" AS t SET ({columns}) = (SELECT {columns} FROM jsonb_populate_record(NULL::\"{table}\", $1)) WHERE t.\"id\"::text = $2 RETURNING to_jsonb(t) AS row"
        );
        debug!("SQL: {}", sql);
        let row = sqlx::query(&sql)
            .bind(Value::Object(dirty))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row.try_get::<Value, _>("row")).transpose().map_err(StoreError::from)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find(&self, resource_type: &str, id: &str) -> Result<Option<Record>, StoreError> {
        let table = Self::table_name(resource_type)?;
        let sql = SqlResult {
            query: format!("SELECT to_jsonb(t) AS row FROM \"{}\" t WHERE t.\"id\"::text = $1", table),
            params: vec![id.to_string()],
        };
        let row = self.fetch_rows(&sql).await?.into_iter().next();
        Ok(row.map(|row| Record::from_store(resource_type, row)))
    }

    async fn select(&self, resource_type: &str, query: &Query) -> Result<Vec<Record>, StoreError> {
        let table = Self::table_name(resource_type)?;
        let sql = Filter::new(table, query)?.to_sql()?;
        Ok(self
            .fetch_rows(&sql)
            .await?
            .into_iter()
            .map(|row| Record::from_store(resource_type, row))
            .collect())
    }

    async fn count(&self, resource_type: &str, query: &Query) -> Result<u64, StoreError> {
        let table = Self::table_name(resource_type)?;
        let sql = Filter::new(table, query)?.to_count_sql()?;
        debug!("SQL: {} {:?}", sql.query, sql.params);
        let mut q = sqlx::query(&sql.query);
        for param in &sql.params {
            q = q.bind(param);
        }
        let row = q.fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn save(&self, record: &mut Record) -> Result<bool, StoreError> {
        if record.exists() && !record.is_dirty() {
            return Ok(true);
        }
        let table = Self::table_name(record.resource_type())?;

        let stored = match record.id().map(str::to_string) {
            Some(id) if record.exists() => match self.update(&table, &id, record).await? {
                Some(row) => row,
                None => return Ok(false),
            },
            _ => self.insert(&table, record).await?,
        };

        let refreshed = Record::from_store(record.resource_type(), Self::row_to_map(stored)?);
        if let Some(id) = refreshed.id() {
            record.set_id(id);
        }
        record.refresh_attributes(refreshed.attributes().clone());
        Ok(true)
    }

    async fn delete(&self, record: &Record) -> Result<bool, StoreError> {
        let id = record
            .id()
            .ok_or_else(|| StoreError::MissingId(record.resource_type().to_string()))?;
        let table = Self::table_name(record.resource_type())?;
        let result = sqlx::query(&format!("DELETE FROM \"{}\" WHERE \"id\"::text = $1", table))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_names_are_underscored_and_validated() {
        assert_eq!(PgStore::table_name("blog-posts").unwrap(), "blog_posts");
        assert!(PgStore::table_name("bad\"name").is_err());
    }

    #[test]
    fn rejects_unsafe_attribute_columns() {
        let mut attributes = Map::new();
        attributes.insert("name".into(), json!("x"));
        assert_eq!(PgStore::quoted_columns(&attributes).unwrap(), "\"name\"");
        attributes.insert("x\"; DROP TABLE widgets; --".into(), json!("x"));
        assert!(PgStore::quoted_columns(&attributes).is_err());
    }
}
