//! Relationship handling for one request.
//!
//! Write path: apply the `relationships` member of a request document to a record.
//! Read path: resolve which relations a request exposes, load them, and flatten the
//! related records into a deduplicated `included` set.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::api::format::ResourceSerializer;
use crate::api::request::RequestContext;
use crate::cache::{Cache, CacheKeys};
use crate::database::record::{Record, Related};
use crate::database::store::Store;
use crate::error::JsonApiError;
use crate::filter::{value_as_text, Query};
use crate::naming::NameMapper;
use crate::resource::{RelationKind, Resource, ResourceRegistry};

pub struct RelationshipResolver<'a> {
    resource: &'a dyn Resource,
    ctx: &'a RequestContext,
    store: &'a dyn Store,
    cache: &'a dyn Cache,
    names: &'a dyn NameMapper,
    registry: &'a ResourceRegistry,
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(
        resource: &'a dyn Resource,
        ctx: &'a RequestContext,
        store: &'a dyn Store,
        cache: &'a dyn Cache,
        names: &'a dyn NameMapper,
        registry: &'a ResourceRegistry,
    ) -> Self {
        Self { resource, ctx, store, cache, names, registry }
    }

    fn invalid(&self, title: impl Into<String>) -> JsonApiError {
        JsonApiError::invalid_attrs(self.resource.error_scope(), title)
    }

    fn store_error(&self, err: crate::database::store::StoreError) -> JsonApiError {
        JsonApiError::from_store(self.resource.error_scope(), err)
    }

    // ========================================
    // Write path
    // ========================================

    /// Apply `data.relationships` to `record`. Runs twice on create: before the first save
    /// (belongs-to) and after it (has/morph, which need this record's key).
    pub async fn update_relationships(
        &self,
        data: &Map<String, Value>,
        record: &mut Record,
        creating: bool,
    ) -> Result<(), JsonApiError> {
        let Some(relationships) = data.get("relationships") else {
            return Ok(());
        };
        let Value::Object(relationships) = relationships else {
            return Err(self.invalid("Relationship object is not an array"));
        };

        for (name, relationship) in relationships {
            let Value::Object(relationship) = relationship else {
                return Err(self.invalid("Relationship object is not an array"));
            };
            let Some(linkage) = relationship.get("data") else {
                return Err(self.invalid("Relationship must have an object with \"data\" key"));
            };

            match linkage {
                Value::Null => {}
                Value::Object(item) if item.contains_key("type") => {
                    self.update_single(record, item, name, creating).await?;
                }
                Value::Object(items) if items.keys().all(|key| key.parse::<i64>().is_ok()) => {
                    for item in items.values() {
                        self.update_list_item(record, item, name, creating).await?;
                    }
                }
                Value::Object(_) => {
                    return Err(self.invalid("Relationship type key not present in the request"));
                }
                Value::Array(items) => {
                    for item in items {
                        self.update_list_item(record, item, name, creating).await?;
                    }
                }
                _ => return Err(self.invalid("Relationship \"data\" object must be an array or null")),
            }
        }
        Ok(())
    }

    async fn update_list_item(
        &self,
        record: &mut Record,
        item: &Value,
        name: &str,
        creating: bool,
    ) -> Result<(), JsonApiError> {
        match item {
            Value::Object(item) if item.contains_key("type") => self.update_single(record, item, name, creating).await,
            _ => Err(self.invalid("Relationship type key not present in the request for an item")),
        }
    }

    async fn update_single(
        &self,
        record: &mut Record,
        item: &Map<String, Value>,
        name: &str,
        creating: bool,
    ) -> Result<(), JsonApiError> {
        let related_type = item.get("type").and_then(value_as_text).unwrap_or_default();
        let Some(related_id) = item.get("id").and_then(value_as_text) else {
            return Err(self.invalid("Relationship id key not present in the request"));
        };

        let Some(mut related) = self.find_related(&related_type, &related_id).await? else {
            return Err(self.invalid(format!(
                "Model {} with id {} not found in database",
                self.names.humanize(&related_type),
                related_id
            )));
        };

        let relation_name = self.names.underscore(name);
        let Some(descriptor) = self.resource.relation(&relation_name) else {
            return Err(self.invalid(format!("Relationship {} is not valid", relation_name)));
        };

        match &descriptor.kind {
            RelationKind::BelongsTo { foreign_key } => {
                if !creating || record.is_dirty() {
                    let current = record.get(foreign_key).and_then(value_as_text);
                    if current.as_deref() != Some(related_id.as_str()) {
                        debug!("Associating {} -> {}/{}", relation_name, related_type, related_id);
                        record.set(foreign_key.clone(), related_id.clone());
                        record.mark_changed();
                    }
                }
            }
            RelationKind::HasOne { foreign_key } | RelationKind::HasMany { foreign_key } => {
                if !creating || !record.is_dirty() {
                    let Some(owner_id) = record.id().map(str::to_string) else {
                        return Ok(());
                    };
                    if self.attach(&mut related, &[(foreign_key.clone(), owner_id)]).await? {
                        record.mark_changed();
                    }
                }
            }
            RelationKind::MorphOne { morph } | RelationKind::MorphMany { morph } => {
                if !creating || !record.is_dirty() {
                    let Some(owner_id) = record.id().map(str::to_string) else {
                        return Ok(());
                    };
                    let keys = [
                        (format!("{}_id", morph), owner_id),
                        (format!("{}_type", morph), record.resource_type().to_string()),
                    ];
                    if self.attach(&mut related, &keys).await? {
                        record.mark_changed();
                    }
                }
            }
            RelationKind::Computed { .. } => {
                debug!("Ignoring write to computed relation {}", relation_name);
            }
        }
        Ok(())
    }

    /// Point `related` at this record and save it. False when it already pointed here.
    async fn attach(&self, related: &mut Record, keys: &[(String, String)]) -> Result<bool, JsonApiError> {
        let mut altered = false;
        for (column, value) in keys {
            if related.get(column).and_then(value_as_text).as_deref() != Some(value.as_str()) {
                related.set(column.clone(), value.clone());
                altered = true;
            }
        }
        if !altered {
            return Ok(false);
        }
        match self.store.save(related).await {
            Ok(true) => {
                // the related record's cached forms now predate its new foreign key
                let keys = CacheKeys::new(self.names, related.resource_type()).invalidation(related.id());
                debug!("Invalidating {:?}", keys);
                self.cache.forget_all(&keys).await;
                Ok(true)
            }
            Ok(false) => Err(JsonApiError::unknown(self.resource.error_scope())),
            Err(err) => Err(self.store_error(err)),
        }
    }

    /// Only registered types are looked up; anything else reads as not found
    async fn find_related(&self, related_type: &str, id: &str) -> Result<Option<Record>, JsonApiError> {
        if self.registry.get(related_type).is_none() {
            return Ok(None);
        }
        self.store.find(related_type, id).await.map_err(|err| self.store_error(err))
    }

    // ========================================
    // Read path
    // ========================================

    /// Relations to render for `record`: globally exposed relations filtered by the
    /// request's `include`, or by the resource's defaults when nothing was requested
    pub fn exposed_relations_from_request(&self, record: &mut Record) -> Vec<String> {
        let exposed = self.exposed_relations();
        record.set_exposed(exposed.clone());
        exposed
    }

    pub fn exposed_relations(&self) -> Vec<String> {
        let wanted: &[String] = if self.ctx.include().is_empty() {
            self.resource.default_exposed_relations()
        } else {
            self.ctx.include()
        };
        self.resource
            .exposed_relations()
            .iter()
            .filter(|name| wanted.contains(name))
            .cloned()
            .collect()
    }

    /// Requested includes the resource does not expose, in request order
    pub fn unknown_relations_from_request(&self) -> Vec<String> {
        let exposed = self.resource.exposed_relations();
        self.ctx.include().iter().filter(|name| !exposed.contains(name)).cloned().collect()
    }

    /// Load every exposed relation of `record`
    pub async fn load_related_models(&self, record: &mut Record) -> Result<(), JsonApiError> {
        for name in self.exposed_relations_from_request(record) {
            let Some(descriptor) = self.resource.relation(&name) else {
                return Err(JsonApiError::relation_missing(self.resource.error_scope(), &name));
            };
            debug!("Loading relation {} for {}", name, record);

            if descriptor.kind.is_computed() {
                let related = self.resource.computed_relation(&name, record, self.store).await?;
                record.set_computed_relation(name, related);
                continue;
            }

            let related = self.load_stored(record, &descriptor.target, &descriptor.kind).await?;
            record.set_relation(name, related);
        }
        Ok(())
    }

    async fn load_stored(&self, record: &Record, target: &str, kind: &RelationKind) -> Result<Related, JsonApiError> {
        let pivot = self.registry.get(target).map(|resource| resource.is_pivot()).unwrap_or(false);
        let mark = |mut related: Record| {
            related.set_pivot(pivot);
            related
        };

        let query = match kind {
            RelationKind::BelongsTo { foreign_key } => {
                let Some(id) = record.get(foreign_key).and_then(value_as_text) else {
                    return Ok(Related::Null);
                };
                let found = self.store.find(target, &id).await.map_err(|err| self.store_error(err))?;
                return Ok(found.map(|related| Related::One(Box::new(mark(related)))).unwrap_or(Related::Null));
            }
            RelationKind::HasOne { foreign_key } | RelationKind::HasMany { foreign_key } => {
                let Some(id) = record.id() else { return Ok(empty(kind)) };
                Query::new().filter(foreign_key.clone(), id)
            }
            RelationKind::MorphOne { morph } | RelationKind::MorphMany { morph } => {
                let Some(id) = record.id() else { return Ok(empty(kind)) };
                Query::new()
                    .filter(format!("{}_id", morph), id)
                    .filter(format!("{}_type", morph), record.resource_type())
            }
            RelationKind::Computed { .. } => return Ok(Related::Null),
        };

        let rows = self.store.select(target, &query).await.map_err(|err| self.store_error(err))?;
        let rows: Vec<Record> = rows.into_iter().map(mark).collect();
        Ok(if kind.is_many() {
            Related::Many(rows)
        } else {
            rows.into_iter().next().map(|row| Related::One(Box::new(row))).unwrap_or(Related::Null)
        })
    }

    /// Related records of `name` on `record` as a list; `None` when not loaded or null
    pub fn models_for_relation<'r>(&self, record: &'r Record, name: &str) -> Result<Option<Vec<&'r Record>>, JsonApiError> {
        if self.resource.relation(name).is_none() {
            return Err(JsonApiError::relation_missing(self.resource.error_scope(), name));
        }
        match record.relation(name) {
            None | Some(Related::Null) => Ok(None),
            Some(related) => Ok(Some(related.records())),
        }
    }

    /// Every related record of every exposed relation, first occurrence of each
    /// (type, id) kept, rendered without relationships
    pub fn included_models(
        &self,
        records: &[Record],
        serializer: &ResourceSerializer<'_>,
    ) -> Result<Vec<Value>, JsonApiError> {
        let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
        let mut included = Vec::new();
        for record in records {
            for name in record.exposed() {
                let Some(related) = self.models_for_relation(record, name)? else {
                    continue;
                };
                for item in related {
                    let (resource_type, id) = item.key();
                    if !seen.insert((resource_type.to_string(), id.map(str::to_string))) {
                        continue;
                    }
                    included.push(serializer.serialize_flat(item));
                }
            }
        }
        Ok(included)
    }

    /// Warning entry for includes the resource does not expose
    pub fn unknown_relations_error(&self) -> Option<Value> {
        let unknown = self.unknown_relations_from_request();
        if unknown.is_empty() {
            return None;
        }
        warn!("Unknown included resources requested: {}", unknown.join(", "));
        Some(
            JsonApiError::unknown_linked_resources(self.resource.error_scope())
                .with_detail(format!("These included resources are not available: {}", unknown.join(", ")))
                .to_warning(),
        )
    }
}

fn empty(kind: &RelationKind) -> Related {
    if kind.is_many() {
        Related::Many(vec![])
    } else {
        Related::Null
    }
}
