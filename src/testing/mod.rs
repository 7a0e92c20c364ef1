//! Fixtures for unit tests: a small widget/owner/comment schema over the memory store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{Cache, MokaCache};
use crate::database::record::{Record, Related};
use crate::database::store::Store;
use crate::database::MemoryStore;
use crate::error::JsonApiError;
use crate::filter::{value_as_text, Query};
use crate::handler::{HandlerSettings, JsonApi, Services};
use crate::naming::InflectorNames;
use crate::resource::{DefinedResource, Resource, ResourceDefinition, ResourceRegistry, RuleValidator};

pub const DEFINITIONS: &str = r#"
- name: owner
  error_scope: 2048
  rules:
    name: required|string
- name: comment
  error_scope: 4096
- name: gadget
  allows_modifying_by_all_users: false
- name: note
  methods: [GET]
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

/// Widgets: `same_color` lists the other widgets sharing this one's color
pub struct WidgetResource {
    inner: DefinedResource,
}

impl WidgetResource {
    pub fn new() -> Self {
        let definition: ResourceDefinition = serde_yaml::from_str(WIDGET).unwrap();
        Self { inner: DefinedResource::new(definition) }
    }
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

pub struct TestApi {
    pub api: JsonApi,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MokaCache>,
}

pub fn test_api() -> TestApi {
    test_api_with(MemoryStore::new())
}

pub fn test_api_with(store: MemoryStore) -> TestApi {
    let names = Arc::new(InflectorNames);
    let mut registry = ResourceRegistry::from_yaml_str(names.clone(), DEFINITIONS).unwrap();
    registry.register(Arc::new(WidgetResource::new())).unwrap();

    let store = Arc::new(store);
    let cache = Arc::new(MokaCache::new(1_000));
    let api = JsonApi::new(Services {
        store: store.clone(),
        cache: cache.clone() as Arc<dyn Cache>,
        validator: Arc::new(RuleValidator),
        names,
        registry: Arc::new(registry),
        settings: HandlerSettings { base_url: "http://api.test".to_string(), ..HandlerSettings::default() },
    });
    TestApi { api, store, cache }
}
