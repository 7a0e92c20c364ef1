use std::collections::HashSet;

use serde_json::{Map, Value};

/// Fields the client can never set through `fill`
const GUARDED_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

/// A loaded relation value
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    Null,
    One(Box<Record>),
    Many(Vec<Record>),
}

impl Related {
    /// Related records as a flat list; `Null` is empty
    pub fn records(&self) -> Vec<&Record> {
        match self {
            Related::Null => vec![],
            Related::One(record) => vec![record.as_ref()],
            Related::Many(records) => records.iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Related::Null => true,
            Related::One(_) => false,
            Related::Many(records) => records.is_empty(),
        }
    }
}

/// One stored row of a resource, with change tracking and the relations loaded for this request
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: Option<String>,
    resource_type: String,
    /// Attribute state as of the last load or save (None until first persisted)
    original: Option<Map<String, Value>>,
    attributes: Map<String, Value>,
    relations: Vec<(String, Related)>,
    computed: HashSet<String>,
    exposed: Vec<String>,
    changed: bool,
    pivot: bool,
}

impl Record {
    /// Create a new, never-persisted record of the given wire type
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            id: None,
            resource_type: resource_type.into(),
            original: None,
            attributes: Map::new(),
            relations: Vec::new(),
            computed: HashSet::new(),
            exposed: Vec::new(),
            changed: false,
            pivot: false,
        }
    }

    /// Rebuild a record from store data. `id` is lifted out of the attributes.
    pub fn from_store(resource_type: impl Into<String>, mut data: Map<String, Value>) -> Self {
        let id = data.shift_remove("id").and_then(|id| match id {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        });
        let mut record = Self::new(resource_type);
        record.id = id;
        record.original = Some(data.clone());
        record.attributes = data;
        record
    }

    // ========================================
    // Identity
    // ========================================

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Assigned by the store on first save
    pub fn set_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.id = Some(id.into());
        self
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Identity used to deduplicate included resources
    pub fn key(&self) -> (&str, Option<&str>) {
        (&self.resource_type, self.id())
    }

    pub fn exists(&self) -> bool {
        self.original.is_some()
    }

    // ========================================
    // Attributes
    // ========================================

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Set an attribute. Guarded fields are ignored.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        if GUARDED_FIELDS.contains(&key.as_str()) {
            tracing::warn!("Attempted to set guarded field '{}' - ignoring", key);
            return self;
        }
        self.attributes.insert(key, value.into());
        self
    }

    /// Set a guarded field (stores only)
    pub fn set_system_field(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Mass-assign client attributes, skipping guarded fields
    pub fn fill(&mut self, attributes: Map<String, Value>) -> &mut Self {
        for (key, value) in attributes {
            if GUARDED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            self.attributes.insert(key, value);
        }
        self
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn original(&self) -> Option<&Map<String, Value>> {
        self.original.as_ref()
    }

    /// Never persisted, or attributes differ from the last persisted snapshot
    pub fn is_dirty(&self) -> bool {
        match &self.original {
            None => true,
            Some(original) => original != &self.attributes,
        }
    }

    /// Attribute names whose value differs from the original snapshot
    pub fn dirty_fields(&self) -> Vec<&str> {
        match &self.original {
            None => self.attributes.keys().map(String::as_str).collect(),
            Some(original) => self
                .attributes
                .iter()
                .filter(|(key, value)| original.get(*key) != Some(*value))
                .map(|(key, _)| key.as_str())
                .collect(),
        }
    }

    /// Called by the store after a successful save
    pub fn sync_original(&mut self) -> &mut Self {
        self.original = Some(self.attributes.clone());
        self
    }

    /// Replace attributes with what the store holds after a save
    pub fn refresh_attributes(&mut self, data: Map<String, Value>) -> &mut Self {
        self.attributes = data;
        self.sync_original()
    }

    // ========================================
    // Request-scoped state
    // ========================================

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn mark_changed(&mut self) -> &mut Self {
        self.changed = true;
        self
    }

    pub fn is_pivot(&self) -> bool {
        self.pivot
    }

    pub fn set_pivot(&mut self, pivot: bool) -> &mut Self {
        self.pivot = pivot;
        self
    }

    pub fn exposed(&self) -> &[String] {
        &self.exposed
    }

    pub fn set_exposed(&mut self, exposed: Vec<String>) -> &mut Self {
        self.exposed = exposed;
        self
    }

    // ========================================
    // Relations
    // ========================================

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.iter().find(|(n, _)| n == name).map(|(_, related)| related)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &Related)> {
        self.relations.iter().map(|(name, related)| (name.as_str(), related))
    }

    pub fn has_loaded_relations(&self) -> bool {
        !self.relations.is_empty()
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) -> &mut Self {
        let name = name.into();
        match self.relations.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = related,
            None => self.relations.push((name, related)),
        }
        self
    }

    pub fn unset_relation(&mut self, name: &str) -> Option<Related> {
        let index = self.relations.iter().position(|(n, _)| n == name)?;
        Some(self.relations.remove(index).1)
    }

    /// Store a relation produced by computation rather than loaded from the store
    pub fn set_computed_relation(&mut self, name: impl Into<String>, related: Related) -> &mut Self {
        let name = name.into();
        self.computed.insert(name.clone());
        self.set_relation(name, related)
    }

    pub fn is_computed(&self, name: &str) -> bool {
        self.computed.contains(name)
    }

    /// Drop computed relations once they have been rendered
    pub fn detach_computed(&mut self) -> &mut Self {
        let computed = std::mem::take(&mut self.computed);
        self.relations.retain(|(name, _)| !computed.contains(name));
        self
    }

    // ========================================
    // Serialization
    // ========================================

    /// Attributes plus id, as a store row
    pub fn to_row(&self) -> Map<String, Value> {
        let mut row = Map::new();
        if let Some(id) = &self.id {
            row.insert("id".to_string(), Value::String(id.clone()));
        }
        for (key, value) in &self.attributes {
            row.insert(key.clone(), value.clone());
        }
        row
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Record(type: {}, id: {:?}, fields: {}, dirty: {})",
            self.resource_type,
            self.id,
            self.attributes.len(),
            self.is_dirty()
        )
    }
}
