#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use jsonapi_handler::cache::{Cache, MokaCache};
use jsonapi_handler::database::{MemoryStore, Record, Related, Store};
use jsonapi_handler::filter::{value_as_text, Query};
use jsonapi_handler::naming::InflectorNames;
use jsonapi_handler::resource::{DefinedResource, Resource, ResourceDefinition, ResourceRegistry, RuleValidator};
use jsonapi_handler::{server, HandlerSettings, JsonApi, JsonApiError, Services};

pub const RESOURCES: &str = r#"
- name: owner
  error_scope: 2048
  exposed_relations: [widgets]
  relations:
    widgets: { kind: has_many, target: widgets, foreign_key: owner_id }
  rules:
    name: required|string|min:3
- name: comment
  error_scope: 4096
- name: gadget
  allows_modifying_by_all_users: false
- name: note
  methods: [GET]
- name: diary
  owner_field: author_id
"#;

pub const WIDGET: &str = r#"
name: widget
error_scope: 1024
exposed_relations: [owner, comments, same_color]
default_exposed_relations: [owner]
relations:
  owner: { kind: belongs_to, target: owners, foreign_key: owner_id }
  comments: { kind: morph_many, target: comments, morph: commentable }
  same_color: { kind: computed, target: widgets, many: true }
rules:
  name: required|string|max:40
  size: integer|min:1
"#;

/// Widgets expose `same_color`: the other widgets sharing this one's color
pub struct WidgetResource {
    inner: DefinedResource,
}

#[async_trait]
impl Resource for WidgetResource {
    fn definition(&self) -> &ResourceDefinition {
        self.inner.definition()
    }

    async fn computed_relation(&self, name: &str, record: &Record, store: &dyn Store) -> Result<Related, JsonApiError> {
        if name != "same_color" {
            return Ok(Related::Null);
        }
        let Some(color) = record.get("color").and_then(value_as_text) else {
            return Ok(Related::Many(vec![]));
        };
        let others = store
            .select("widgets", &Query::new().filter("color", color))
            .await?
            .into_iter()
            .filter(|other| other.id() != record.id())
            .collect();
        Ok(Related::Many(others))
    }
}

pub struct TestServer {
    pub base_url: String,
    pub store: Arc<MemoryStore>,
    client: reqwest::Client,
}

impl TestServer {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(MemoryStore::new()).await
    }

    /// Serve a fresh registry and cache over `store` on an ephemeral port
    pub async fn spawn_with(store: MemoryStore) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);

        let names = Arc::new(InflectorNames);
        let mut registry = ResourceRegistry::from_yaml_str(names.clone(), RESOURCES)?;
        let widget: ResourceDefinition = serde_yaml::from_str(WIDGET)?;
        registry.register(Arc::new(WidgetResource { inner: DefinedResource::new(widget) }))?;

        let store = Arc::new(store);
        let cache: Arc<dyn Cache> = Arc::new(MokaCache::new(1_000));
        let api = JsonApi::new(Services {
            store: store.clone(),
            cache,
            validator: Arc::new(RuleValidator),
            names,
            registry: Arc::new(registry),
            settings: HandlerSettings { base_url: base_url.clone(), ..HandlerSettings::default() },
        });

        let app = server::router(api);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { base_url, store, client: reqwest::Client::new() })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request; an empty response body reads as `Value::Null`
    pub async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
        self.send_as(method, path, body, None).await
    }

    pub async fn send_as(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        user: Option<&str>,
    ) -> Result<(StatusCode, Value)> {
        let mut request = self.client.request(method, self.url(path));
        if let Some(body) = body {
            request = request.header("content-type", "application/vnd.api+json").body(body.to_string());
        }
        if let Some(user) = user {
            request = request.header("x-user-id", user);
        }
        let response = request.send().await.context("request failed")?;
        let status = response.status();
        let text = response.text().await?;
        let body = if text.is_empty() { Value::Null } else { serde_json::from_str(&text).context("body is not JSON")? };
        Ok((status, body))
    }

    pub async fn get(&self, path: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::DELETE, path, None).await
    }

    /// Raw stored row, bypassing the API
    pub async fn store_row(&self, resource_type: &str, id: &str) -> Value {
        match self.store.find(resource_type, id).await {
            Ok(Some(record)) => Value::Object(record.to_row()),
            _ => Value::Null,
        }
    }

    /// Overwrite one stored attribute, bypassing the API and its cache invalidation
    pub async fn store_set(&self, resource_type: &str, id: &str, key: &str, value: Value) -> Result<()> {
        let mut record = self.store.find(resource_type, id).await?.context("no such record")?;
        record.set(key, value);
        anyhow::ensure!(self.store.save(&mut record).await?, "store refused the save");
        Ok(())
    }

    /// POST a resource with the given attributes and return its id
    pub async fn create(&self, resource_type: &str, attributes: Value) -> Result<String> {
        let (status, body) = self
            .post(
                &format!("/{}", resource_type),
                serde_json::json!({ "data": { "type": resource_type, "attributes": attributes } }),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "create {} failed: {} {}", resource_type, status, body);
        body["data"]["id"].as_str().map(str::to_string).context("created resource has no id")
    }
}
