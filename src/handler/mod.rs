//! Request fulfillment: one [`Handler`] per resource, dispatched by verb.
//!
//! `Received -> MethodChecked -> Authorized -> OperationExecuted -> ResponseAssembled`;
//! any step may end the request with a [`JsonApiError`].

pub mod payload;
pub mod relationships;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::api::document::{PaginationLinks, Response};
use crate::api::format::ResourceSerializer;
use crate::api::request::RequestContext;
use crate::cache::{Cache, CacheKeys};
use crate::config::AppConfig;
use crate::database::record::Record;
use crate::database::store::{Store, StoreError};
use crate::error::JsonApiError;
use crate::filter::{value_as_text, FilterError, FilterOrder, Query};
use crate::naming::NameMapper;
use crate::resource::{Resource, ResourceRegistry, Rules, Validator};
use crate::types::Method;

use relationships::RelationshipResolver;

/// Rendering and caching knobs shared by every handler
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub base_url: String,
    pub body_key: String,
    pub cache_ttl: Duration,
}

impl HandlerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.api.base_url.clone(),
            body_key: config.api.body_key.clone(),
            cache_ttl: config.cache.ttl(),
        }
    }
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            body_key: "data".to_string(),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Collaborators injected into every handler
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn Cache>,
    pub validator: Arc<dyn Validator>,
    pub names: Arc<dyn NameMapper>,
    pub registry: Arc<ResourceRegistry>,
    pub settings: HandlerSettings,
}

/// Entry point: route a request to the handler of its resource type
#[derive(Clone)]
pub struct JsonApi {
    services: Services,
}

impl JsonApi {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn handler(&self, resource_type: &str) -> Option<Handler> {
        let resource = self.services.registry.get(resource_type)?;
        Some(Handler::new(resource, self.services.clone()))
    }

    pub async fn fulfill(&self, resource_type: &str, ctx: RequestContext) -> Result<Response, JsonApiError> {
        let Some(handler) = self.handler(resource_type) else {
            return Err(JsonApiError::unknown_resource(resource_type));
        };
        handler.fulfill_request(&ctx).await
    }
}

pub struct Handler {
    resource: Arc<dyn Resource>,
    resource_type: String,
    services: Services,
}

impl Handler {
    pub fn new(resource: Arc<dyn Resource>, services: Services) -> Self {
        let resource_type = services.names.resource_type(resource.name());
        Self { resource, resource_type, services }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn scope(&self) -> u32 {
        self.resource.error_scope()
    }

    fn keys(&self) -> CacheKeys<'_> {
        CacheKeys::new(self.services.names.as_ref(), &self.resource_type)
    }

    fn serializer(&self) -> ResourceSerializer<'_> {
        let settings = &self.services.settings;
        ResourceSerializer::new(
            self.services.names.as_ref(),
            self.services.cache.as_ref(),
            &settings.base_url,
            settings.cache_ttl,
        )
    }

    fn resolver<'a>(&'a self, ctx: &'a RequestContext) -> RelationshipResolver<'a> {
        RelationshipResolver::new(
            self.resource.as_ref(),
            ctx,
            self.services.store.as_ref(),
            self.services.cache.as_ref(),
            self.services.names.as_ref(),
            self.services.registry.as_ref(),
        )
    }

    fn response(&self, body: Value, status: StatusCode) -> Response {
        Response::new(body, status).with_body_key(self.services.settings.body_key.clone())
    }

    pub async fn fulfill_request(&self, ctx: &RequestContext) -> Result<Response, JsonApiError> {
        let method = ctx.method();
        info!("{} {} id={:?}", method, self.resource_type, ctx.id());

        if !self.resource.supports_method(method) {
            return Err(JsonApiError::method_not_allowed(self.scope()));
        }
        if method.is_write() && !self.resource.allows_modifying_by_all_users() {
            tracing::warn!("Modification of {} refused for all users", self.resource_type);
            return Err(JsonApiError::forbidden(self.scope()));
        }

        match method {
            Method::Get => match ctx.id() {
                Some(id) => self.handle_get_one(ctx, id).await,
                None => self.handle_get_all(ctx).await,
            },
            Method::Post => self.handle_post(ctx).await,
            Method::Patch | Method::Put => self.handle_patch(ctx).await,
            Method::Delete => self.handle_delete(ctx).await,
        }
    }

    // ========================================
    // GET
    // ========================================

    async fn handle_get_one(&self, ctx: &RequestContext, id: &str) -> Result<Response, JsonApiError> {
        let keys = self.keys();
        let response_key = keys.response(id);
        if let Some(response) = self.cached_response(ctx, &response_key).await {
            return Ok(response);
        }

        let query_key = keys.query(id);
        let record = match self.services.cache.get(&query_key).await {
            Some(Value::Object(row)) => {
                debug!("Query cache hit: {}", query_key);
                Record::from_store(self.resource_type.as_str(), row)
            }
            _ => {
                let found = self
                    .services
                    .store
                    .find(&self.resource_type, id)
                    .await
                    .map_err(|err| JsonApiError::from_store(self.scope(), err))?;
                let Some(record) = found else {
                    return Err(JsonApiError::unknown_id(self.scope()));
                };
                self.services
                    .cache
                    .put(&query_key, Value::Object(record.to_row()), self.services.settings.cache_ttl)
                    .await;
                record
            }
        };

        let response = self.render_one(ctx, record, StatusCode::OK).await?;
        self.remember_response(ctx, &response_key, &response).await;
        Ok(response)
    }

    async fn handle_get_all(&self, ctx: &RequestContext) -> Result<Response, JsonApiError> {
        let response_key = self.keys().collection_response();
        if let Some(response) = self.cached_response(ctx, &response_key).await {
            return Ok(response);
        }

        let query = self.listing_query(ctx)?;
        let store = self.services.store.as_ref();
        let failed = |err: StoreError| JsonApiError::query_failed(self.scope(), err);

        let response = match (ctx.page_number(), ctx.page_size()) {
            (Some(number), Some(size)) => {
                let total = store.count(&self.resource_type, &query.without_window()).await.map_err(failed)?;
                let records = store.select(&self.resource_type, &query.page(number, size)).await.map_err(failed)?;
                let links = PaginationLinks::new(ctx, total).to_json();
                self.render_many(ctx, records).await?.with_links(links)
            }
            _ => {
                let records = if query.is_plain() {
                    self.plain_listing().await.map_err(failed)?
                } else {
                    store.select(&self.resource_type, &query).await.map_err(failed)?
                };
                self.render_many(ctx, records).await?
            }
        };

        self.remember_response(ctx, &response_key, &response).await;
        Ok(response)
    }

    /// All rows, read through the collection query key
    async fn plain_listing(&self) -> Result<Vec<Record>, StoreError> {
        let key = self.keys().collection_query();
        if let Some(Value::Array(rows)) = self.services.cache.get(&key).await {
            debug!("Query cache hit: {}", key);
            return Ok(rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(row) => Some(Record::from_store(self.resource_type.as_str(), row)),
                    _ => None,
                })
                .collect());
        }

        let records = self.services.store.all(&self.resource_type).await?;
        let rows = records.iter().map(|record| Value::Object(record.to_row())).collect();
        self.services.cache.put(&key, Value::Array(rows), self.services.settings.cache_ttl).await;
        Ok(records)
    }

    /// Equality filters and sort order from the request, columns in snake_case
    fn listing_query(&self, ctx: &RequestContext) -> Result<Query, JsonApiError> {
        let names = self.services.names.as_ref();
        let mut query = Query::new();
        for (column, value) in ctx.filter() {
            query = query.filter(names.underscore(column), value.clone());
        }

        let order = FilterOrder::parse(ctx.sort()).map_err(|err| match err {
            FilterError::UnsignedSort(token) => JsonApiError::invalid_sort(self.scope(), &token),
            other => JsonApiError::invalid_attrs(self.scope(), "Bad Request").with_detail(other.to_string()),
        })?;
        let order = order
            .into_iter()
            .map(|mut spec| {
                spec.column = names.underscore(&spec.column);
                spec
            })
            .collect();
        Ok(query.order_by(order))
    }

    /// Response cache applies to plain GETs only; its keys do not vary with query parameters
    async fn cached_response(&self, ctx: &RequestContext, key: &str) -> Option<Response> {
        if !ctx.is_plain() {
            return None;
        }
        let document = self.services.cache.get(key).await?;
        debug!("Response cache hit: {}", key);
        Some(Response::from_document(document, &self.services.settings.body_key, StatusCode::OK))
    }

    async fn remember_response(&self, ctx: &RequestContext, key: &str, response: &Response) {
        if ctx.is_plain() {
            self.services.cache.put(key, response.to_json(), self.services.settings.cache_ttl).await;
        }
    }

    // ========================================
    // POST / PATCH / PUT / DELETE
    // ========================================

    async fn handle_post(&self, ctx: &RequestContext) -> Result<Response, JsonApiError> {
        let scope = self.scope();
        let data = payload::parse_request_content(ctx.body(), &self.resource_type, true, scope)?;
        if data.get("id").is_some_and(|id| !id.is_null()) {
            return Err(JsonApiError::id_provided_not_allowed(scope));
        }
        let attributes =
            payload::normalized_attributes(&data, self.services.names.as_ref(), scope)?.unwrap_or_default();

        let mut record = Record::new(self.resource_type.as_str());
        record.fill(attributes.clone());

        // belongs-to before the first save, has/morph once the record has a key
        let resolver = self.resolver(ctx);
        resolver.update_relationships(&data, &mut record, true).await?;
        self.validate(&attributes, &self.resource.rules())?;
        self.save(&mut record).await?;
        resolver.update_relationships(&data, &mut record, true).await?;

        record.mark_changed();
        self.clear_cache(None).await;
        info!("Created {}", record);

        self.render_one(ctx, record, StatusCode::CREATED).await
    }

    async fn handle_patch(&self, ctx: &RequestContext) -> Result<Response, JsonApiError> {
        let scope = self.scope();
        let data = payload::parse_request_content(ctx.body(), &self.resource_type, false, scope)?;
        let id = data.get("id").and_then(value_as_text).unwrap_or_default();
        if let Some(url_id) = ctx.id() {
            if url_id != id {
                return Err(JsonApiError::conflict(scope, "\"id\" parameter does not match the resource in the URL"));
            }
        }

        let mut record = self.find(&id).await?;
        self.resource.verify_user_permission(ctx, &record).await?;

        if let Some(attributes) = payload::normalized_attributes(&data, self.services.names.as_ref(), scope)? {
            record.fill(attributes.clone());
            self.validate(&attributes, &self.resource.rules_on_update())?;
        }
        self.resolver(ctx).update_relationships(&data, &mut record, false).await?;

        let requested = record.attributes().clone();
        let persisted = record.is_dirty();
        self.save(&mut record).await?;
        if differs(record.attributes(), &requested) {
            record.mark_changed();
        }

        if record.changed() || persisted {
            self.clear_cache(Some(&id)).await;
        }

        if record.changed() {
            info!("Updated {} (changed beyond request)", record);
            self.render_one(ctx, record, StatusCode::OK).await
        } else {
            info!("Updated {}", record);
            Ok(Response::no_content())
        }
    }

    async fn handle_delete(&self, ctx: &RequestContext) -> Result<Response, JsonApiError> {
        let Some(id) = ctx.id() else {
            return Err(JsonApiError::no_id(self.scope()));
        };
        let record = self.find(id).await?;
        self.resource.verify_user_permission(ctx, &record).await?;

        match self.services.store.delete(&record).await {
            Ok(true) => {}
            Ok(false) => return Err(JsonApiError::unknown(self.scope())),
            Err(err) => return Err(JsonApiError::from_store(self.scope(), err)),
        }
        self.clear_cache(Some(id)).await;
        info!("Deleted {}", record);
        Ok(Response::no_content())
    }

    // ========================================
    // Helpers
    // ========================================

    async fn find(&self, id: &str) -> Result<Record, JsonApiError> {
        self.services
            .store
            .find(&self.resource_type, id)
            .await
            .map_err(|err| JsonApiError::from_store(self.scope(), err))?
            .ok_or_else(|| JsonApiError::unknown_id(self.scope()))
    }

    async fn save(&self, record: &mut Record) -> Result<(), JsonApiError> {
        match self.services.store.save(record).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(JsonApiError::unknown(self.scope())),
            Err(err) => Err(JsonApiError::from_store(self.scope(), err)),
        }
    }

    fn validate(&self, values: &Map<String, Value>, rules: &Rules) -> Result<(), JsonApiError> {
        self.services
            .validator
            .validate(values, rules)
            .map_err(|messages| JsonApiError::validation(self.scope(), messages))
    }

    async fn clear_cache(&self, id: Option<&str>) {
        let keys = self.keys().invalidation(id);
        debug!("Invalidating {:?}", keys);
        self.services.cache.forget_all(&keys).await;
    }

    async fn render_one(&self, ctx: &RequestContext, mut record: Record, status: StatusCode) -> Result<Response, JsonApiError> {
        let resolver = self.resolver(ctx);
        let serializer = self.serializer();
        resolver.load_related_models(&mut record).await?;
        let included = resolver.included_models(std::slice::from_ref(&record), &serializer)?;
        let body = serializer.serialize(&mut record).await;

        Ok(self
            .response(body, status)
            .with_included(included)
            .with_errors(resolver.unknown_relations_error().into_iter().collect()))
    }

    async fn render_many(&self, ctx: &RequestContext, mut records: Vec<Record>) -> Result<Response, JsonApiError> {
        let resolver = self.resolver(ctx);
        let serializer = self.serializer();
        for record in records.iter_mut() {
            resolver.load_related_models(record).await?;
        }
        let included = resolver.included_models(&records, &serializer)?;
        let body = serializer.serialize_all(&mut records).await;

        Ok(self
            .response(Value::Array(body), StatusCode::OK)
            .with_included(included)
            .with_errors(resolver.unknown_relations_error().into_iter().collect()))
    }
}

/// Any post-save attribute missing from, or different to, what the request asked for
fn differs(saved: &Map<String, Value>, requested: &Map<String, Value>) -> bool {
    saved.iter().any(|(key, value)| requested.get(key) != Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::testing::{test_api, test_api_with};
    use serde_json::json;

    fn post(resource: &str, body: Value) -> RequestContext {
        RequestContext::builder(Method::Post, format!("http://api.test/{}", resource))
            .body(body.to_string())
            .build()
    }

    fn patch(resource: &str, id: &str, body: Value) -> RequestContext {
        RequestContext::builder(Method::Patch, format!("http://api.test/{}/{}", resource, id))
            .id(id)
            .body(body.to_string())
            .build()
    }

    #[test]
    fn extra_store_columns_count_as_changes() {
        let requested = json!({ "name": "Foo" }).as_object().cloned().unwrap();
        let same = requested.clone();
        let stamped = json!({ "name": "Foo", "updated_at": "now" }).as_object().cloned().unwrap();
        assert!(!differs(&same, &requested));
        assert!(differs(&stamped, &requested));
    }

    #[tokio::test]
    async fn post_creates_and_renders_record() {
        let t = test_api();
        let response = t
            .api
            .fulfill("widgets", post("widgets", json!({ "data": { "type": "widgets", "attributes": { "name": "Foo" } } })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            serde_json::to_string(&response.to_json()).unwrap(),
            r#"{"data":{"id":"1","type":"widgets","attributes":{"name":"Foo"},"links":{"self":"http://api.test/widgets/1"}}}"#
        );
    }

    #[tokio::test]
    async fn method_and_modification_policies() {
        let t = test_api();
        let err = t
            .api
            .fulfill("notes", post("notes", json!({ "data": { "type": "notes" } })))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(err.code(), 16);

        let err = t
            .api
            .fulfill("gadgets", post("gadgets", json!({ "data": { "type": "gadgets" } })))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), 128 | 256);
        assert_eq!(err.title(), "This user cannot modify this resource");
    }

    #[tokio::test]
    async fn patch_status_depends_on_store_side_changes() {
        let t = test_api();
        t.api
            .fulfill("widgets", post("widgets", json!({ "data": { "type": "widgets", "attributes": { "name": "Foo" } } })))
            .await
            .unwrap();
        let body = json!({ "data": { "type": "widgets", "id": "1", "attributes": { "name": "Bar" } } });
        let response = t.api.fulfill("widgets", patch("widgets", "1", body.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let stamped = test_api_with(MemoryStore::new().with_timestamps());
        stamped
            .api
            .fulfill("widgets", post("widgets", json!({ "data": { "type": "widgets", "attributes": { "name": "Foo" } } })))
            .await
            .unwrap();
        let response = stamped.api.fulfill("widgets", patch("widgets", "1", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body()["attributes"]["name"], "Bar");
        assert!(response.body()["attributes"]["updated-at"].is_string());
    }

    #[tokio::test]
    async fn delete_without_id() {
        let t = test_api();
        let ctx = RequestContext::builder(Method::Delete, "http://api.test/widgets").build();
        let err = t.api.fulfill("widgets", ctx).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), 1024 | 4);
        assert_eq!(err.title(), "No ID provided");
    }

    #[tokio::test]
    async fn unsigned_sort_is_rejected() {
        let t = test_api();
        let ctx = RequestContext::builder(Method::Get, "http://api.test/widgets").sort(vec!["name".into()]).build();
        let err = t.api.fulfill("widgets", ctx).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), 1024 | 16);
        assert_eq!(err.title(), "Bad Request");
    }

    #[tokio::test]
    async fn unknown_resource_type() {
        let t = test_api();
        let ctx = RequestContext::builder(Method::Get, "http://api.test/spaceships").build();
        let err = t.api.fulfill("spaceships", ctx).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
