use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{SortDirection, SortSpec};

pub struct FilterOrder;

impl FilterOrder {
    /// Parse `-name,+created-at`. Every token needs an explicit direction sign.
    pub fn parse(tokens: &[String]) -> Result<Vec<SortSpec>, FilterError> {
        let mut out = Vec::new();
        for token in tokens {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                continue;
            }
            let (sort, column) = if let Some(column) = trimmed.strip_prefix('+') {
                (SortDirection::Asc, column)
            } else if let Some(column) = trimmed.strip_prefix('-') {
                (SortDirection::Desc, column)
            } else {
                return Err(FilterError::UnsignedSort(trimmed.to_string()));
            };
            if column.is_empty() {
                return Err(FilterError::InvalidColumn(trimmed.to_string()));
            }
            out.push(SortSpec { column: column.to_string(), sort });
        }
        Ok(out)
    }

    pub fn generate(specs: &[SortSpec]) -> Result<String, FilterError> {
        if specs.is_empty() {
            return Ok(String::new());
        }
        let mut parts = Vec::with_capacity(specs.len());
        for spec in specs {
            super::filter::Filter::validate_column(&spec.column)?;
            parts.push(format!("\"{}\" {}", spec.column, spec.sort.to_sql()));
        }
        Ok(format!("ORDER BY {}", parts.join(", ")))
    }

    /// In-process ordering with the same semantics as the generated SQL (nulls last)
    pub fn compare(specs: &[SortSpec], a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
        for spec in specs {
            let ordering = match (a.get(&spec.column), b.get(&spec.column)) {
                (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
                (None | Some(Value::Null), _) => return Ordering::Greater,
                (_, None | Some(Value::Null)) => return Ordering::Less,
                (Some(left), Some(right)) => Self::compare_values(left, right),
            };
            let ordering = match spec.sort {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn compare_values(left: &Value, right: &Value) -> Ordering {
        match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
            _ => {
                let l = super::types::value_as_text(left).unwrap_or_default();
                let r = super::types::value_as_text(right).unwrap_or_default();
                l.cmp(&r)
            }
        }
    }
}
