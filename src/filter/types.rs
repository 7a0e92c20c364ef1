use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One `+col` / `-col` sort token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub sort: SortDirection,
}

/// What a store is asked for: equality filters, ordering and an optional window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: IndexMap<String, Value>,
    pub order: Vec<SortSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(column.into(), value.into());
        self
    }

    pub fn order_by(mut self, order: Vec<SortSpec>) -> Self {
        self.order = order;
        self
    }

    /// Window for a 1-based page
    pub fn page(mut self, number: u64, size: u64) -> Self {
        self.limit = Some(size);
        self.offset = Some(number.saturating_sub(1) * size);
        self
    }

    /// Same predicates without ordering or window, for counting
    pub fn without_window(&self) -> Self {
        Self { filters: self.filters.clone(), ..Self::default() }
    }

    pub fn is_plain(&self) -> bool {
        self.filters.is_empty() && self.order.is_empty() && self.limit.is_none() && self.offset.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<String>,
}

/// Text form used for equality comparison, matching `"col"::text = $n` in SQL
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
