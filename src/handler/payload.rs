//! Request document parsing for POST/PATCH/PUT.

use serde_json::{Map, Value};

use crate::error::JsonApiError;
use crate::naming::NameMapper;

/// The `data` member of a write request, checked against the handler's wire type
pub fn parse_request_content(
    body: Option<&str>,
    expected_type: &str,
    new_record: bool,
    scope: u32,
) -> Result<Map<String, Value>, JsonApiError> {
    let Some(body) = body.filter(|body| !body.trim().is_empty()) else {
        return Err(JsonApiError::missing_data(scope));
    };

    let malformed =
        || JsonApiError::invalid_attrs(scope, "Payload either contains misformed JSON or missing \"data\" parameter.");
    let document: Value = serde_json::from_str(body).map_err(|_| malformed())?;
    let data = match document.get("data") {
        Some(Value::Object(data)) if !data.is_empty() => data.clone(),
        _ => return Err(malformed()),
    };

    let Some(resource_type) = data.get("type") else {
        return Err(JsonApiError::invalid_attrs(scope, "\"type\" parameter not set in request."));
    };
    if resource_type.as_str() != Some(expected_type) {
        return Err(JsonApiError::conflict(
            scope,
            format!("\"type\" parameter is not valid. Expecting {}", expected_type),
        ));
    }
    if !new_record && data.get("id").map_or(true, Value::is_null) {
        return Err(JsonApiError::invalid_attrs(scope, "\"id\" parameter not set in request."));
    }
    Ok(data)
}

/// `attributes` member with keys in snake_case; absent means empty
pub fn normalized_attributes(
    data: &Map<String, Value>,
    names: &dyn NameMapper,
    scope: u32,
) -> Result<Option<Map<String, Value>>, JsonApiError> {
    match data.get("attributes") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(attributes)) => Ok(Some(
            attributes
                .iter()
                .map(|(key, value)| (names.underscore(key), value.clone()))
                .collect(),
        )),
        Some(_) => Err(JsonApiError::invalid_attrs(scope, "\"attributes\" parameter must be an object")),
    }
}
