// JSON:API error taxonomy
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::api::document::CONTENT_TYPE;
use crate::database::store::StoreError;

/// Field name -> validation messages, in the order the validator reported them
pub type FieldMessages = IndexMap<String, Vec<String>>;

/// Error kind bits. A rendered code is the handler's scope OR'd with one or more of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorKind {
    UnknownId = 1,
    UnknownLinkedResources = 2,
    NoId = 4,
    InvalidAttrs = 8,
    MethodNotAllowed = 16,
    IdProvidedNotAllowed = 32,
    MissingData = 64,
    Unknown = 128,
    Unauthorized = 256,
    Reserved = 512,
}

impl ErrorKind {
    pub const fn bits(self) -> u32 {
        self as u32
    }
}

/// A failure that aborts the current request and renders as a JSON:API error document
#[derive(Debug, Clone, thiserror::Error)]
#[error("{title}")]
pub struct JsonApiError {
    kind: ErrorKind,
    status: StatusCode,
    code: u32,
    title: String,
    detail: Option<String>,
    meta: Option<Map<String, Value>>,
    messages: Option<FieldMessages>,
}

impl JsonApiError {
    pub fn new(kind: ErrorKind, scope: u32, status: StatusCode, title: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            code: scope | kind.bits(),
            title: title.into(),
            detail: None,
            meta: None,
            messages: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// OR extra kind bits into the code
    fn with_bits(mut self, kind: ErrorKind) -> Self {
        self.code |= kind.bits();
        self
    }

    // ========================================
    // Accessors
    // ========================================

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn messages(&self) -> Option<&FieldMessages> {
        self.messages.as_ref()
    }

    pub fn is_validation(&self) -> bool {
        self.messages.is_some()
    }

    // ========================================
    // Rendering
    // ========================================

    /// Render to the error document: one entry, or one entry per field message for validation failures
    pub fn to_json(&self) -> Value {
        match &self.messages {
            Some(messages) => {
                let mut errors = Vec::new();
                for (field, field_messages) in messages {
                    for message in field_messages {
                        errors.push(json!({
                            "status": self.status.as_u16().to_string(),
                            "code": self.code.to_string(),
                            "title": "Validation Fail",
                            "detail": message,
                            "meta": { "field": field },
                        }));
                    }
                }
                json!({ "errors": errors })
            }
            None => {
                let mut entry = Map::new();
                entry.insert("status".into(), json!(self.status.as_u16()));
                entry.insert("code".into(), json!(self.code));
                entry.insert("title".into(), json!(self.title));
                if let Some(detail) = &self.detail {
                    entry.insert("detail".into(), json!(detail));
                }
                if let Some(meta) = &self.meta {
                    entry.insert("meta".into(), Value::Object(meta.clone()));
                }
                json!({ "errors": [Value::Object(entry)] })
            }
        }
    }

    /// Entry for the `errors` member of an otherwise successful document
    pub fn to_warning(&self) -> Value {
        let mut entry = Map::new();
        entry.insert("code".into(), json!(self.code));
        entry.insert("title".into(), json!(self.title));
        if let Some(detail) = &self.detail {
            entry.insert("detail".into(), json!(detail));
        }
        Value::Object(entry)
    }
}

// Constructors for the failure kinds the pipeline raises
impl JsonApiError {
    pub fn method_not_allowed(scope: u32) -> Self {
        Self::new(ErrorKind::MethodNotAllowed, scope, StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }

    /// Resource-level modification policy denied a write
    pub fn forbidden(scope: u32) -> Self {
        Self::new(ErrorKind::Unknown, scope, StatusCode::FORBIDDEN, "This user cannot modify this resource")
            .with_bits(ErrorKind::Unauthorized)
    }

    /// Per-record permission check failed
    pub fn unauthorized(scope: u32, title: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, scope, StatusCode::FORBIDDEN, title)
    }

    pub fn unknown_id(scope: u32) -> Self {
        Self::new(ErrorKind::UnknownId, scope, StatusCode::NOT_FOUND, "Unknown ID")
    }

    pub fn unknown_resource(resource_type: &str) -> Self {
        Self::new(ErrorKind::UnknownId, 0, StatusCode::NOT_FOUND, "Unknown resource type")
            .with_detail(format!("No resource is registered under \"{}\"", resource_type))
    }

    /// Non-fatal: reported next to the data, never returned as `Err`
    pub fn unknown_linked_resources(scope: u32) -> Self {
        Self::new(ErrorKind::UnknownLinkedResources, scope, StatusCode::OK, "Unknown included resource requested")
    }

    pub fn no_id(scope: u32) -> Self {
        Self::new(ErrorKind::NoId, scope, StatusCode::BAD_REQUEST, "No ID provided")
    }

    pub fn invalid_attrs(scope: u32, title: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidAttrs, scope, StatusCode::BAD_REQUEST, title)
    }

    pub fn conflict(scope: u32, title: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidAttrs, scope, StatusCode::CONFLICT, title)
    }

    pub fn id_provided_not_allowed(scope: u32) -> Self {
        Self::new(
            ErrorKind::IdProvidedNotAllowed,
            scope,
            StatusCode::FORBIDDEN,
            "Client-generated IDs are not supported",
        )
    }

    pub fn missing_data(scope: u32) -> Self {
        Self::new(ErrorKind::MissingData, scope, StatusCode::BAD_REQUEST, "Request body is missing")
    }

    pub fn unknown(scope: u32) -> Self {
        Self::new(ErrorKind::Unknown, scope, StatusCode::INTERNAL_SERVER_ERROR, "An unknown error occurred")
    }

    /// Relation accessor is not declared on the resource
    pub fn relation_missing(scope: u32, relation: &str) -> Self {
        Self::new(
            ErrorKind::UnknownId,
            scope,
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Relation \"{}\" does not exist in model", relation),
        )
    }

    /// Field-level validation failure, rendered as one error entry per message
    pub fn validation(scope: u32, messages: FieldMessages) -> Self {
        let mut error = Self::new(ErrorKind::MethodNotAllowed, scope, StatusCode::BAD_REQUEST, "Bad Request");
        error.messages = Some(messages);
        error
    }

    pub fn invalid_sort(scope: u32, token: &str) -> Self {
        Self::new(ErrorKind::MethodNotAllowed, scope, StatusCode::BAD_REQUEST, "Bad Request").with_detail(format!(
            "Sort column \"{}\" must be prefixed with '+' (ascending) or '-' (descending)",
            token
        ))
    }

    /// Wrap a store failure; the client sees the store message as detail, never the raw error type
    pub fn from_store(scope: u32, err: StoreError) -> Self {
        tracing::error!("Store error: {}", err);
        Self::unknown(scope).with_detail(err.to_string())
    }

    /// Store failure while querying a listing
    pub fn query_failed(scope: u32, err: StoreError) -> Self {
        tracing::error!("Store query error: {}", err);
        Self::new(ErrorKind::UnknownId, scope, StatusCode::INTERNAL_SERVER_ERROR, "Database Request Failed")
            .with_detail(err.to_string())
    }
}

impl From<StoreError> for JsonApiError {
    fn from(err: StoreError) -> Self {
        Self::from_store(0, err)
    }
}

impl From<crate::filter::FilterError> for JsonApiError {
    fn from(err: crate::filter::FilterError) -> Self {
        Self::invalid_attrs(0, "Bad Request").with_detail(err.to_string())
    }
}

// Automatic HTTP response conversion for Axum
impl IntoResponse for JsonApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, [(header::CONTENT_TYPE, CONTENT_TYPE)], Json(self.to_json())).into_response()
    }
}
