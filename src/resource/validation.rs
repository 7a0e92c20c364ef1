use serde_json::{Map, Value};

use super::Rules;
use crate::error::FieldMessages;

pub trait Validator: Send + Sync {
    /// Check `values` against `rules`; on failure, messages per field in rule order
    fn validate(&self, values: &Map<String, Value>, rules: &Rules) -> Result<(), FieldMessages>;
}

/// Laravel-style string rules: `required`, `nullable`, `string`, `integer`, `numeric`,
/// `boolean`, `min:n`, `max:n`, `in:a,b,c`. Unknown rules are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidator;

impl RuleValidator {
    fn label(field: &str) -> String {
        field.replace(['_', '-'], " ")
    }

    /// Size used by min/max: character count for strings, value for numbers, length for arrays
    fn size(value: &Value) -> Option<f64> {
        match value {
            Value::String(s) => Some(s.chars().count() as f64),
            Value::Number(n) => n.as_f64(),
            Value::Array(items) => Some(items.len() as f64),
            _ => None,
        }
    }

    fn size_unit(value: &Value) -> &'static str {
        match value {
            Value::String(_) => " characters",
            Value::Array(_) => " items",
            _ => "",
        }
    }

    fn check(field: &str, value: &Value, rule: &str) -> Option<String> {
        let label = Self::label(field);
        let (name, arg) = match rule.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (rule, None),
        };

        match (name, arg) {
            ("string", _) if !value.is_string() => Some(format!("The {} must be a string.", label)),
            ("integer", _) if !(value.is_i64() || value.is_u64()) => {
                Some(format!("The {} must be an integer.", label))
            }
            ("numeric", _) if !value.is_number() => Some(format!("The {} must be a number.", label)),
            ("boolean", _) if !value.is_boolean() => {
                Some(format!("The {} field must be true or false.", label))
            }
            ("min", Some(arg)) => {
                let limit: f64 = arg.parse().ok()?;
                match Self::size(value) {
                    Some(size) if size < limit => Some(format!(
                        "The {} must be at least {}{}.",
                        label,
                        arg,
                        Self::size_unit(value)
                    )),
                    _ => None,
                }
            }
            ("max", Some(arg)) => {
                let limit: f64 = arg.parse().ok()?;
                match Self::size(value) {
                    Some(size) if size > limit => Some(format!(
                        "The {} may not be greater than {}{}.",
                        label,
                        arg,
                        Self::size_unit(value)
                    )),
                    _ => None,
                }
            }
            ("in", Some(arg)) => {
                let text = crate::filter::value_as_text(value).unwrap_or_default();
                if arg.split(',').any(|allowed| allowed.trim() == text) {
                    None
                } else {
                    Some(format!("The selected {} is invalid.", label))
                }
            }
            ("required" | "nullable" | "string" | "integer" | "numeric" | "boolean", _) => None,
            (other, _) => {
                tracing::debug!("Ignoring unknown validation rule '{}' on {}", other, field);
                None
            }
        }
    }
}

impl Validator for RuleValidator {
    fn validate(&self, values: &Map<String, Value>, rules: &Rules) -> Result<(), FieldMessages> {
        let mut messages = FieldMessages::new();

        for (field, rule_list) in rules {
            let rule_names: Vec<&str> = rule_list.split('|').map(str::trim).filter(|r| !r.is_empty()).collect();
            let value = values.get(field);
            let is_blank = match value {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(Value::Array(items)) => items.is_empty(),
                _ => false,
            };

            if is_blank {
                if rule_names.contains(&"required") {
                    messages
                        .entry(field.clone())
                        .or_default()
                        .push(format!("The {} field is required.", Self::label(field)));
                }
                continue;
            }

            let Some(value) = value else { continue };
            for rule in &rule_names {
                if let Some(message) = Self::check(field, value, rule) {
                    messages.entry(field.clone()).or_default().push(message);
                }
            }
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages)
        }
    }
}
