//! Deterministic cache keys.
//!
//! `resource` is the dasherized singular resource name (`blog-post`); collection keys use
//! its plural.

use crate::naming::NameMapper;

pub struct CacheKeys<'a> {
    names: &'a dyn NameMapper,
    resource: String,
}

impl<'a> CacheKeys<'a> {
    /// `resource` may be given in any casing or number; it is normalized to dashed singular
    pub fn new(names: &'a dyn NameMapper, resource: &str) -> Self {
        let resource = names.singular(&names.dasherize(resource));
        Self { names, resource }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn collection_query(&self) -> String {
        format!("{}:query", self.names.plural(&self.resource))
    }

    pub fn query(&self, id: &str) -> String {
        format!("{}:query:{}", self.resource, id)
    }

    pub fn collection_response(&self) -> String {
        format!("{}:response", self.names.plural(&self.resource))
    }

    pub fn response(&self, id: &str) -> String {
        format!("{}:response:{}", self.resource, id)
    }

    pub fn array_with_relations(&self, id: &str) -> String {
        format!("{}:array:{}:relations", self.resource, id)
    }

    pub fn array_without_relations(&self, id: &str) -> String {
        format!("{}:array:{}:no_relations", self.resource, id)
    }

    /// Keys a write must invalidate: the per-id keys when an id is involved, and
    /// always both collection keys
    pub fn invalidation(&self, id: Option<&str>) -> Vec<String> {
        let mut keys = Vec::with_capacity(6);
        if let Some(id) = id {
            keys.push(self.query(id));
            keys.push(self.response(id));
            keys.push(self.array_with_relations(id));
            keys.push(self.array_without_relations(id));
        }
        keys.push(self.collection_query());
        keys.push(self.collection_response());
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::InflectorNames;

    #[test]
    fn derives_every_key_shape() {
        let names = InflectorNames;
        let keys = CacheKeys::new(&names, "widgets");
        assert_eq!(keys.collection_query(), "widgets:query");
        assert_eq!(keys.query("7"), "widget:query:7");
        assert_eq!(keys.collection_response(), "widgets:response");
        assert_eq!(keys.response("7"), "widget:response:7");
        assert_eq!(keys.array_with_relations("7"), "widget:array:7:relations");
        assert_eq!(keys.array_without_relations("7"), "widget:array:7:no_relations");
    }

    #[test]
    fn normalizes_resource_names() {
        let names = InflectorNames;
        assert_eq!(CacheKeys::new(&names, "blog_posts").resource(), "blog-post");
        assert_eq!(CacheKeys::new(&names, "BlogPost").collection_query(), "blog-posts:query");
    }

    #[test]
    fn invalidation_covers_collection_always() {
        let names = InflectorNames;
        let keys = CacheKeys::new(&names, "widget");
        assert_eq!(keys.invalidation(None), vec!["widgets:query", "widgets:response"]);
        assert_eq!(keys.invalidation(Some("1")).len(), 6);
    }
}
