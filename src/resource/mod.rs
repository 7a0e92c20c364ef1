//! Resource definitions and the per-resource policy trait.
//!
//! A [`Resource`] is everything the request pipeline needs to know about one kind of
//! record: which verbs it serves, who may modify it, its relations, and its validation
//! rules. [`DefinedResource`] covers the common case of a resource described entirely by
//! a [`ResourceDefinition`] (usually loaded from YAML); implement the trait directly to
//! add per-record permission checks or computed relations.

pub mod registry;
pub mod validation;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::api::request::RequestContext;
use crate::database::record::{Record, Related};
use crate::database::store::Store;
use crate::error::JsonApiError;
use crate::types::Method;

pub use registry::ResourceRegistry;
pub use validation::{RuleValidator, Validator};

/// Field name -> `|`-separated rule list, e.g. `required|string|max:40`
pub type Rules = IndexMap<String, String>;

/// How a relation is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationKind {
    /// Foreign key lives on this record
    BelongsTo { foreign_key: String },
    /// Foreign key lives on the related record
    HasOne { foreign_key: String },
    HasMany { foreign_key: String },
    /// `{morph}_id` and `{morph}_type` live on the related record
    MorphOne { morph: String },
    MorphMany { morph: String },
    /// Produced by [`Resource::computed_relation`], never persisted
    Computed {
        #[serde(default)]
        many: bool,
    },
}

impl RelationKind {
    pub fn is_many(&self) -> bool {
        match self {
            RelationKind::HasMany { .. } | RelationKind::MorphMany { .. } => true,
            RelationKind::Computed { many } => *many,
            _ => false,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, RelationKind::Computed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Wire type of the related resource, e.g. `owners`
    pub target: String,
    #[serde(flatten)]
    pub kind: RelationKind,
}

impl RelationDescriptor {
    pub fn belongs_to(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self { target: target.into(), kind: RelationKind::BelongsTo { foreign_key: foreign_key.into() } }
    }

    pub fn has_many(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self { target: target.into(), kind: RelationKind::HasMany { foreign_key: foreign_key.into() } }
    }

    pub fn has_one(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self { target: target.into(), kind: RelationKind::HasOne { foreign_key: foreign_key.into() } }
    }

    pub fn morph_many(target: impl Into<String>, morph: impl Into<String>) -> Self {
        Self { target: target.into(), kind: RelationKind::MorphMany { morph: morph.into() } }
    }

    pub fn computed(target: impl Into<String>, many: bool) -> Self {
        Self { target: target.into(), kind: RelationKind::Computed { many } }
    }
}

/// Static description of a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceDefinition {
    /// Singular name, any casing: `widget`, `blog_post`
    pub name: String,
    /// High bits OR'd into every error code this resource raises
    pub error_scope: u32,
    pub methods: Vec<Method>,
    pub allows_modifying_by_all_users: bool,
    /// Relations a client may `include`
    pub exposed_relations: Vec<String>,
    /// Relations included when the client names none
    pub default_exposed_relations: Vec<String>,
    pub relations: IndexMap<String, RelationDescriptor>,
    pub rules: Rules,
    /// Rules for PATCH/PUT; derived from `rules` when absent
    pub update_rules: Option<Rules>,
    /// Join-table records are never rendered as relationships
    pub pivot: bool,
    /// Attribute holding the owning user id; writes by anyone else are refused
    pub owner_field: Option<String>,
}

impl Default for ResourceDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            error_scope: 0,
            methods: Method::ALL.to_vec(),
            allows_modifying_by_all_users: true,
            exposed_relations: vec![],
            default_exposed_relations: vec![],
            relations: IndexMap::new(),
            rules: Rules::new(),
            update_rules: None,
            pivot: false,
            owner_field: None,
        }
    }
}

impl ResourceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

/// Per-resource policy consulted by the request pipeline
#[async_trait]
pub trait Resource: Send + Sync {
    fn definition(&self) -> &ResourceDefinition;

    fn name(&self) -> &str {
        &self.definition().name
    }

    fn error_scope(&self) -> u32 {
        self.definition().error_scope
    }

    fn supports_method(&self, method: Method) -> bool {
        self.definition().methods.contains(&method)
    }

    fn allows_modifying_by_all_users(&self) -> bool {
        self.definition().allows_modifying_by_all_users
    }

    /// Per-record check for PATCH/PUT/DELETE, run after the record is found
    async fn verify_user_permission(&self, ctx: &RequestContext, record: &Record) -> Result<(), JsonApiError> {
        let Some(field) = &self.definition().owner_field else {
            return Ok(());
        };
        let owner = record.get(field).and_then(crate::filter::value_as_text);
        match (ctx.user(), owner) {
            (Some(user), Some(owner)) if user == owner => Ok(()),
            _ => {
                tracing::warn!("User {:?} denied write on {}", ctx.user(), record);
                Err(JsonApiError::unauthorized(self.error_scope(), "This user cannot modify this record"))
            }
        }
    }

    fn rules(&self) -> Rules {
        self.definition().rules.clone()
    }

    /// Update rules: explicit `update_rules`, else `rules` with `required` dropped
    fn rules_on_update(&self) -> Rules {
        if let Some(rules) = &self.definition().update_rules {
            return rules.clone();
        }
        self.rules()
            .into_iter()
            .map(|(field, rule)| {
                let relaxed = rule.split('|').filter(|r| *r != "required").collect::<Vec<_>>().join("|");
                (field, relaxed)
            })
            .filter(|(_, rule)| !rule.is_empty())
            .collect()
    }

    fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.definition().relations.get(name)
    }

    fn exposed_relations(&self) -> &[String] {
        &self.definition().exposed_relations
    }

    fn default_exposed_relations(&self) -> &[String] {
        &self.definition().default_exposed_relations
    }

    fn is_pivot(&self) -> bool {
        self.definition().pivot
    }

    /// Value of a `Computed` relation for one record
    async fn computed_relation(
        &self,
        _name: &str,
        _record: &Record,
        _store: &dyn Store,
    ) -> Result<Related, JsonApiError> {
        Ok(Related::Null)
    }
}

/// A resource described entirely by its definition
#[derive(Debug, Clone)]
pub struct DefinedResource {
    definition: ResourceDefinition,
}

impl DefinedResource {
    pub fn new(definition: ResourceDefinition) -> Self {
        Self { definition }
    }
}

#[async_trait]
impl Resource for DefinedResource {
    fn definition(&self) -> &ResourceDefinition {
        &self.definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_definition_yaml() {
        let yaml = r#"
name: widget
error_scope: 1024
methods: [GET, POST, PATCH]
exposed_relations: [owner, comments]
default_exposed_relations: [owner]
relations:
  owner: { kind: belongs_to, target: owners, foreign_key: owner_id }
  comments: { kind: morph_many, target: comments, morph: commentable }
  score: { kind: computed, target: scores }
rules:
  name: required|string|max:40
"#;
        let def: ResourceDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.error_scope, 1024);
        assert_eq!(def.methods, vec![Method::Get, Method::Post, Method::Patch]);
        assert!(def.allows_modifying_by_all_users);
        assert_eq!(def.relations["owner"], RelationDescriptor::belongs_to("owners", "owner_id"));
        assert!(def.relations["comments"].kind.is_many());
        assert!(def.relations["score"].kind.is_computed());
    }

    #[test]
    fn update_rules_drop_required() {
        let mut def = ResourceDefinition::new("widget");
        def.rules.insert("name".into(), "required|string".into());
        def.rules.insert("size".into(), "required".into());
        let resource = DefinedResource::new(def);
        let rules = resource.rules_on_update();
        assert_eq!(rules.get("name").map(String::as_str), Some("string"));
        assert!(rules.get("size").is_none());
        assert!(resource.supports_method(Method::Put));
    }
}
