//! Top-level JSON:API document assembly.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::{json, Map, Value};

use super::request::RequestContext;

pub const CONTENT_TYPE: &str = "application/vnd.api+json";

/// A successful document: primary data under `body_key`, then `links`, `included`,
/// `errors`, each only when non-empty
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: StatusCode,
    body_key: String,
    body: Value,
    links: Option<Value>,
    included: Vec<Value>,
    errors: Vec<Value>,
}

impl Response {
    pub fn new(body: Value, status: StatusCode) -> Self {
        Self {
            status,
            body_key: "data".to_string(),
            body,
            links: None,
            included: vec![],
            errors: vec![],
        }
    }

    /// Rebuild from a document produced by [`Response::to_json`]
    pub fn from_document(document: Value, body_key: &str, status: StatusCode) -> Self {
        let mut document = match document {
            Value::Object(map) => map,
            other => return Self::new(other, status).with_body_key(body_key),
        };
        let list = |value: Option<Value>| match value {
            Some(Value::Array(items)) => items,
            _ => vec![],
        };
        Self {
            status,
            body_key: body_key.to_string(),
            body: document.remove(body_key).unwrap_or(Value::Null),
            links: document.remove("links"),
            included: list(document.remove("included")),
            errors: list(document.remove("errors")),
        }
    }

    pub fn no_content() -> Self {
        Self::new(Value::Null, StatusCode::NO_CONTENT)
    }

    pub fn with_body_key(mut self, body_key: impl Into<String>) -> Self {
        self.body_key = body_key.into();
        self
    }

    pub fn with_links(mut self, links: Value) -> Self {
        self.links = Some(links);
        self
    }

    pub fn with_included(mut self, included: Vec<Value>) -> Self {
        self.included = included;
        self
    }

    /// Non-fatal error entries rendered next to the data
    pub fn with_errors(mut self, errors: Vec<Value>) -> Self {
        self.errors = errors;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn to_json(&self) -> Value {
        let mut document = Map::new();
        document.insert(self.body_key.clone(), self.body.clone());
        if let Some(links) = self.links.as_ref().filter(|links| !is_falsy(links)) {
            document.insert("links".into(), links.clone());
        }
        if !self.included.is_empty() {
            document.insert("included".into(), Value::Array(self.included.clone()));
        }
        if !self.errors.is_empty() {
            document.insert("errors".into(), Value::Array(self.errors.clone()));
        }
        Value::Object(document)
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        if self.status == StatusCode::NO_CONTENT {
            return self.status.into_response();
        }
        (self.status, [(header::CONTENT_TYPE, CONTENT_TYPE)], Json(self.to_json())).into_response()
    }
}

/// Navigation links for one page of a listing
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationLinks {
    path: String,
    query: Vec<(String, String)>,
    current_page: u64,
    last_page: u64,
}

impl PaginationLinks {
    /// `total` is the unpaged row count matching the request's filters
    pub fn new(ctx: &RequestContext, total: u64) -> Self {
        let size = ctx.page_size().unwrap_or(super::request::DEFAULT_PAGE_SIZE).max(1);
        let current_page = ctx.page_number().unwrap_or(1);
        let last_page = total.div_ceil(size).max(1);

        let mut query = vec![("page[size]".to_string(), size.to_string())];
        for (column, value) in ctx.filter() {
            query.push((format!("filter[{}]", column), value.clone()));
        }
        if !ctx.sort().is_empty() {
            query.push(("sort".to_string(), ctx.sort().join(",")));
        }

        Self { path: ctx.url().to_string(), query, current_page, last_page }
    }

    pub fn last_page(&self) -> u64 {
        self.last_page
    }

    /// Link to `page`, left URL-decoded
    pub fn url(&self, page: u64) -> String {
        let mut url = format!("{}?", self.path);
        for (key, value) in &self.query {
            url.push_str(&format!("{}={}&", key, value));
        }
        url.push_str(&format!("page[number]={}", page));
        url
    }

    pub fn to_json(&self) -> Value {
        let current = self.url(self.current_page);
        let neighbour = |page: Option<u64>| -> Value {
            match page.map(|page| self.url(page)) {
                Some(url) if !url.is_empty() && url != current => Value::String(url),
                _ => Value::Null,
            }
        };
        let prev = neighbour((self.current_page > 1).then(|| self.current_page - 1));
        let next = neighbour((self.current_page < self.last_page).then(|| self.current_page + 1));

        json!({
            "self": current,
            "first": self.url(1),
            "last": self.url(self.last_page),
            "prev": prev,
            "next": next,
        })
    }
}
