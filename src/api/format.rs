//! Record -> JSON:API resource object.
//!
//! `{ id, type, attributes, links: { self }, relationships? }` with dasherized attribute
//! keys. Unchanged records are rendered once per TTL and then served from the cache.

use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::cache::{Cache, CacheKeys};
use crate::database::record::{Record, Related};
use crate::naming::NameMapper;

pub struct ResourceSerializer<'a> {
    names: &'a dyn NameMapper,
    cache: &'a dyn Cache,
    base_url: &'a str,
    ttl: Duration,
}

impl<'a> ResourceSerializer<'a> {
    pub fn new(names: &'a dyn NameMapper, cache: &'a dyn Cache, base_url: &'a str, ttl: Duration) -> Self {
        Self { names, cache, base_url: base_url.trim_end_matches('/'), ttl }
    }

    /// Render `record` with its exposed relationships. Computed relations are detached
    /// once rendered.
    pub async fn serialize(&self, record: &mut Record) -> Value {
        let key = self.array_key(record);
        if let Some(key) = &key {
            if let Some(cached) = self.cache.get(key).await {
                debug!("Array cache hit: {}", key);
                record.detach_computed();
                return cached;
            }
        }

        let value = self.render(record, true);
        record.detach_computed();

        if let Some(key) = key {
            self.cache.put(&key, value.clone(), self.ttl).await;
        }
        value
    }

    /// Render without relationships, as used for `included` entries
    pub fn serialize_flat(&self, record: &Record) -> Value {
        self.render(record, false)
    }

    pub async fn serialize_all(&self, records: &mut [Record]) -> Vec<Value> {
        let mut out = Vec::with_capacity(records.len());
        for record in records.iter_mut() {
            out.push(self.serialize(record).await);
        }
        out
    }

    /// `{base_url}/{type}/{id}`
    pub fn self_link(&self, record: &Record) -> String {
        format!("{}/{}/{}", self.base_url, record.resource_type(), record.id().unwrap_or_default())
    }

    /// Changed records and records without an id are never cached
    fn array_key(&self, record: &Record) -> Option<String> {
        let id = record.id()?;
        if record.changed() {
            return None;
        }
        let keys = CacheKeys::new(self.names, record.resource_type());
        Some(if record.has_loaded_relations() {
            keys.array_with_relations(id)
        } else {
            keys.array_without_relations(id)
        })
    }

    fn render(&self, record: &Record, with_relationships: bool) -> Value {
        let attributes: Map<String, Value> = record
            .attributes()
            .iter()
            .filter(|(key, _)| key.as_str() != "id")
            .map(|(key, value)| (self.names.dasherize(key), value.clone()))
            .collect();

        let mut object = Map::new();
        object.insert("id".into(), record.id().map(Value::from).unwrap_or(Value::Null));
        object.insert("type".into(), Value::String(record.resource_type().to_string()));
        object.insert("attributes".into(), Value::Object(attributes));
        object.insert("links".into(), json!({ "self": self.self_link(record) }));

        if with_relationships {
            let relationships = self.relationships(record);
            if !relationships.is_empty() {
                object.insert("relationships".into(), Value::Object(relationships));
            }
        }
        Value::Object(object)
    }

    /// Keyed by related type: singular for a to-one, plural for a to-many
    fn relationships(&self, record: &Record) -> Map<String, Value> {
        let mut out = Map::new();
        for (name, related) in record.relations() {
            if !record.exposed().iter().any(|exposed| exposed == name) {
                continue;
            }
            match related {
                Related::Null => {}
                Related::One(item) if item.is_pivot() => {}
                Related::One(item) => {
                    let key = self.names.singular(&self.names.dasherize(item.resource_type()));
                    out.insert(key, json!({ "data": identifier(item) }));
                }
                Related::Many(items) => {
                    let items: Vec<&Record> = items.iter().filter(|item| !item.is_pivot()).collect();
                    let Some(first) = items.first() else { continue };
                    let key = self.names.plural(&self.names.dasherize(first.resource_type()));
                    let data: Vec<Value> = items.iter().map(|item| identifier(item)).collect();
                    out.insert(key, json!({ "data": data }));
                }
            }
        }
        out
    }
}

fn identifier(record: &Record) -> Value {
    json!({ "id": record.id(), "type": record.resource_type() })
}
