use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::record::Record;
use super::store::{Store, StoreError};
use crate::filter::{FilterOrder, FilterWhere, Query};

#[derive(Debug, Default)]
struct Table {
    next_id: u64,
    rows: IndexMap<String, Map<String, Value>>,
}

/// In-process store. Ids are sequential per type, starting at "1".
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    timestamps: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maintain `created_at` / `updated_at` on save
    pub fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    fn filtered(table: &Table, query: &Query) -> Vec<(String, Map<String, Value>)> {
        let mut rows: Vec<(String, Map<String, Value>)> = table
            .rows
            .iter()
            .filter(|(_, row)| FilterWhere::matches(&query.filters, row))
            .map(|(id, row)| (id.clone(), row.clone()))
            .collect();
        if !query.order.is_empty() {
            rows.sort_by(|(_, a), (_, b)| FilterOrder::compare(&query.order, a, b));
        }
        rows
    }

    fn to_record(resource_type: &str, id: String, mut row: Map<String, Value>) -> Record {
        row.insert("id".to_string(), Value::String(id));
        Record::from_store(resource_type, row)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(&self, resource_type: &str, id: &str) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.read().await;
        let row = tables.get(resource_type).and_then(|table| table.rows.get(id)).cloned();
        Ok(row.map(|row| Self::to_record(resource_type, id.to_string(), row)))
    }

    async fn select(&self, resource_type: &str, query: &Query) -> Result<Vec<Record>, StoreError> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(resource_type) else {
            return Ok(vec![]);
        };
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(Self::filtered(table, query)
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(id, row)| Self::to_record(resource_type, id, row))
            .collect())
    }

    async fn count(&self, resource_type: &str, query: &Query) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(resource_type)
            .map(|table| table.rows.values().filter(|row| FilterWhere::matches(&query.filters, row)).count())
            .unwrap_or(0) as u64)
    }

    async fn save(&self, record: &mut Record) -> Result<bool, StoreError> {
        if record.exists() && !record.is_dirty() {
            return Ok(true);
        }

        let mut tables = self.tables.write().await;
        let table = tables.entry(record.resource_type().to_string()).or_default();

        if self.timestamps {
            let now = Value::String(Utc::now().to_rfc3339());
            if !record.exists() {
                record.set_system_field("created_at", now.clone());
            }
            record.set_system_field("updated_at", now);
        }

        let id = match record.id() {
            Some(id) => id.to_string(),
            None => {
                table.next_id += 1;
                let id = table.next_id.to_string();
                record.set_id(id.clone());
                id
            }
        };

        table.rows.insert(id, record.attributes().clone());
        record.sync_original();
        Ok(true)
    }

    async fn delete(&self, record: &Record) -> Result<bool, StoreError> {
        let id = record
            .id()
            .ok_or_else(|| StoreError::MissingId(record.resource_type().to_string()))?;
        let mut tables = self.tables.write().await;
        Ok(tables
            .get_mut(record.resource_type())
            .and_then(|table| table.rows.shift_remove(id))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{SortDirection, SortSpec};
    use serde_json::json;

    async fn seed(store: &MemoryStore, names: &[&str]) {
        for name in names {
            let mut record = Record::new("widgets");
            record.set("name", *name);
            store.save(&mut record).await.unwrap();
        }
    }

    #[tokio::test]
    async fn assigns_sequential_ids() {
        let store = MemoryStore::new();
        let mut first = Record::new("widgets");
        first.set("name", "a");
        store.save(&mut first).await.unwrap();
        let mut second = Record::new("widgets");
        second.set("name", "b");
        store.save(&mut second).await.unwrap();

        assert_eq!(first.id(), Some("1"));
        assert_eq!(second.id(), Some("2"));
        assert!(!second.is_dirty());

        let found = store.find("widgets", "2").await.unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&json!("b")));
    }

    #[tokio::test]
    async fn selects_filtered_sorted_windowed() {
        let store = MemoryStore::new();
        seed(&store, &["b", "c", "a", "c"]).await;

        let query = Query::new()
            .filter("name", "c")
            .order_by(vec![SortSpec { column: "name".into(), sort: SortDirection::Asc }]);
        assert_eq!(store.count("widgets", &query).await.unwrap(), 2);

        let sorted = Query::new()
            .order_by(vec![SortSpec { column: "name".into(), sort: SortDirection::Desc }])
            .page(1, 2);
        let names: Vec<_> = store
            .select("widgets", &sorted)
            .await
            .unwrap()
            .iter()
            .map(|r| r.get("name").cloned().unwrap())
            .collect();
        assert_eq!(names, vec![json!("c"), json!("c")]);
    }

    #[tokio::test]
    async fn timestamps_are_maintained() {
        let store = MemoryStore::new().with_timestamps();
        let mut record = Record::new("widgets");
        record.set("name", "a");
        store.save(&mut record).await.unwrap();
        assert!(record.get("created_at").is_some());
        assert!(record.get("updated_at").is_some());
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store = MemoryStore::new();
        seed(&store, &["a"]).await;
        let record = store.find("widgets", "1").await.unwrap().unwrap();
        assert!(store.delete(&record).await.unwrap());
        assert!(store.find("widgets", "1").await.unwrap().is_none());
        assert!(!store.delete(&record).await.unwrap());
    }
}
