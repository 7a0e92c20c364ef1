use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter::Filter;
use super::types::value_as_text;

/// Equality predicates, compared as text so URL strings match numeric columns
pub struct FilterWhere {
    param_values: Vec<String>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self { param_values: vec![], param_index: starting_param_index }
    }

    pub fn generate(
        filters: &IndexMap<String, Value>,
        starting_param_index: usize,
    ) -> Result<(String, Vec<String>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        filter_where.build(filters)
    }

    fn build(&mut self, filters: &IndexMap<String, Value>) -> Result<(String, Vec<String>), FilterError> {
        let mut conditions = Vec::with_capacity(filters.len());
        for (column, value) in filters {
            Filter::validate_column(column)?;
            let condition = match value_as_text(value) {
                None => format!("\"{}\" IS NULL", column),
                Some(text) => format!("\"{}\"::text = {}", column, self.param(text)),
            };
            conditions.push(condition);
        }
        Ok((conditions.join(" AND "), self.param_values.clone()))
    }

    fn param(&mut self, value: String) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }

    /// In-process evaluation of the same predicates
    pub fn matches(filters: &IndexMap<String, Value>, row: &Map<String, Value>) -> bool {
        filters.iter().all(|(column, expected)| {
            let actual = row.get(column).and_then(value_as_text);
            actual == value_as_text(expected)
        })
    }
}
