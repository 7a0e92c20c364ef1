use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::{DefinedResource, Resource, ResourceDefinition};
use crate::config::ConfigError;
use crate::naming::NameMapper;

/// Wire type -> resource, built once at startup
#[derive(Clone)]
pub struct ResourceRegistry {
    names: Arc<dyn NameMapper>,
    resources: HashMap<String, Arc<dyn Resource>>,
}

impl ResourceRegistry {
    pub fn new(names: Arc<dyn NameMapper>) -> Self {
        Self { names, resources: HashMap::new() }
    }

    /// Register under the resource's wire type (`widget` -> `widgets`)
    pub fn register(&mut self, resource: Arc<dyn Resource>) -> Result<&mut Self, ConfigError> {
        if resource.name().trim().is_empty() {
            return Err(ConfigError::InvalidDefinition("resource name cannot be empty".to_string()));
        }
        let resource_type = self.names.resource_type(resource.name());
        if self.resources.contains_key(&resource_type) {
            return Err(ConfigError::InvalidDefinition(format!("duplicate resource type '{}'", resource_type)));
        }
        info!("Registered resource '{}'", resource_type);
        self.resources.insert(resource_type, resource);
        Ok(self)
    }

    pub fn register_definition(&mut self, definition: ResourceDefinition) -> Result<&mut Self, ConfigError> {
        self.register(Arc::new(DefinedResource::new(definition)))
    }

    pub fn from_yaml_str(names: Arc<dyn NameMapper>, yaml: &str) -> Result<Self, ConfigError> {
        let definitions: Vec<ResourceDefinition> = serde_yaml::from_str(yaml)?;
        Self::from_definitions(names, definitions)
    }

    pub fn from_file(names: Arc<dyn NameMapper>, path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let definitions: Vec<ResourceDefinition> = serde_yaml::from_reader(file)?;
        Self::from_definitions(names, definitions)
    }

    fn from_definitions(names: Arc<dyn NameMapper>, definitions: Vec<ResourceDefinition>) -> Result<Self, ConfigError> {
        let mut registry = Self::new(names);
        for definition in definitions {
            registry.register_definition(definition)?;
        }
        Ok(registry)
    }

    pub fn get(&self, resource_type: &str) -> Option<Arc<dyn Resource>> {
        self.resources.get(resource_type).cloned()
    }

    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
