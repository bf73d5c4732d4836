//! JSON body rewriting for post-response hooks.

use super::TransformError;
use crate::config::{JsonOperation, JsonTransform};
use crate::context::interpolate;
use crate::hook::{PostResponse, RequestInfo, ResponseData};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::warn;

/// Post-response hook applying JSON operations to the parsed body.
pub struct JsonTransformer {
    /// Operations to apply in order
    operations: Vec<JsonOperation>,
}

impl JsonTransformer {
    /// Create a new JSON transformer from configuration.
    pub fn new(config: &JsonTransform) -> Self {
        Self {
            operations: config.operations.clone(),
        }
    }

    /// Apply all operations to a JSON value.
    pub fn apply_operations(
        &self,
        mut json: JsonValue,
        request: &RequestInfo,
    ) -> Result<JsonValue, TransformError> {
        for operation in &self.operations {
            json = apply_operation(json, operation, request)?;
        }
        Ok(json)
    }
}

/// Apply a single operation to a JSON value.
fn apply_operation(
    mut json: JsonValue,
    operation: &JsonOperation,
    request: &RequestInfo,
) -> Result<JsonValue, TransformError> {
    match operation {
        JsonOperation::Set { path, value } => {
            set_json_value(&mut json, path, interpolate_json_value(value, request))?;
        }
        JsonOperation::Delete(paths) => {
            for path in paths {
                delete_json_value(&mut json, path)?;
            }
        }
        JsonOperation::Rename { from, to } | JsonOperation::Move { from, to } => {
            if let Some(value) = get_json_value(&json, from).cloned() {
                delete_json_value(&mut json, from)?;
                set_json_value(&mut json, to, value)?;
            }
        }
        JsonOperation::Wrap { path, key } => {
            if let Some(value) = get_json_value(&json, path).cloned() {
                let wrapped = serde_json::json!({ key: value });
                set_json_value(&mut json, path, wrapped)?;
            }
        }
        JsonOperation::Merge { path, with } => {
            if let Some(JsonValue::Object(target_map)) = get_json_value_mut(&mut json, path) {
                if let JsonValue::Object(merge_map) = with {
                    for (k, v) in merge_map {
                        target_map.insert(k.clone(), interpolate_json_value(v, request));
                    }
                }
            }
        }
        JsonOperation::Copy { from, to } => {
            if let Some(value) = get_json_value(&json, from).cloned() {
                set_json_value(&mut json, to, value)?;
            }
        }
    }
    Ok(json)
}

/// Interpolate variables in JSON string values.
fn interpolate_json_value(value: &JsonValue, request: &RequestInfo) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(interpolate(request, s)),
        JsonValue::Array(arr) => JsonValue::Array(
            arr.iter()
                .map(|v| interpolate_json_value(v, request))
                .collect(),
        ),
        JsonValue::Object(obj) => {
            let mut new_obj = serde_json::Map::new();
            for (k, v) in obj {
                new_obj.insert(k.clone(), interpolate_json_value(v, request));
            }
            JsonValue::Object(new_obj)
        }
        other => other.clone(),
    }
}

/// Parse a JSON path into segments.
/// Supports: $.field, $.field.subfield, $.array[0], $.field[0].subfield
fn parse_path(path: &str) -> Vec<PathSegment> {
    let path = path.trim_start_matches('$').trim_start_matches('.');
    let mut segments = Vec::new();

    for part in path.split('.').filter(|part| !part.is_empty()) {
        let (key, indexes) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        }
        for index in indexes.split(['[', ']']).filter(|idx| !idx.is_empty()) {
            if let Ok(idx) = index.parse::<usize>() {
                segments.push(PathSegment::Index(idx));
            }
        }
    }

    segments
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    fn step<'a>(&self, json: &'a JsonValue) -> Option<&'a JsonValue> {
        match self {
            Self::Key(key) => json.get(key),
            Self::Index(idx) => json.get(*idx),
        }
    }

    fn step_mut<'a>(&self, json: &'a mut JsonValue) -> Option<&'a mut JsonValue> {
        match self {
            Self::Key(key) => json.get_mut(key),
            Self::Index(idx) => json.get_mut(*idx),
        }
    }

    /// Empty container suited to hold this segment.
    fn container(&self) -> JsonValue {
        match self {
            Self::Key(_) => JsonValue::Object(serde_json::Map::new()),
            Self::Index(_) => JsonValue::Array(vec![]),
        }
    }
}

/// Get a reference to a JSON value at a path.
fn get_json_value<'a>(json: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    parse_path(path)
        .iter()
        .try_fold(json, |current, segment| segment.step(current))
}

/// Get a mutable reference to a JSON value at a path.
fn get_json_value_mut<'a>(json: &'a mut JsonValue, path: &str) -> Option<&'a mut JsonValue> {
    parse_path(path)
        .iter()
        .try_fold(json, |current, segment| segment.step_mut(current))
}

/// Set a JSON value at a path, creating intermediate containers as needed.
fn set_json_value(
    json: &mut JsonValue,
    path: &str,
    value: JsonValue,
) -> Result<(), TransformError> {
    let segments = parse_path(path);
    let Some((last, parents)) = segments.split_last() else {
        *json = value;
        return Ok(());
    };

    let mut current = json;
    for (i, segment) in parents.iter().enumerate() {
        if let (PathSegment::Key(key), JsonValue::Object(map)) = (segment, &mut *current) {
            let next = parents.get(i + 1).unwrap_or(last);
            map.entry(key.clone()).or_insert_with(|| next.container());
        }
        current = segment.step_mut(current).ok_or_else(|| {
            TransformError::JsonPath(format!("Path segment {:?} not found in '{}'", segment, path))
        })?;
    }

    match (last, current) {
        (PathSegment::Key(key), JsonValue::Object(map)) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        // An index may replace an element or append one, never open a gap
        (PathSegment::Index(idx), JsonValue::Array(arr)) => {
            if *idx < arr.len() {
                arr[*idx] = value;
            } else if *idx == arr.len() {
                arr.push(value);
            } else {
                return Err(TransformError::JsonPath(format!(
                    "Index {} out of bounds for array of length {} in '{}'",
                    idx,
                    arr.len(),
                    path
                )));
            }
            Ok(())
        }
        (PathSegment::Key(key), _) => Err(TransformError::JsonPath(format!(
            "Cannot set key '{}' on non-object",
            key
        ))),
        (PathSegment::Index(idx), _) => Err(TransformError::JsonPath(format!(
            "Cannot set index {} on non-array",
            idx
        ))),
    }
}

/// Delete a JSON value at a path. Missing paths are ignored.
fn delete_json_value(json: &mut JsonValue, path: &str) -> Result<(), TransformError> {
    let segments = parse_path(path);
    let Some((last, parents)) = segments.split_last() else {
        return Ok(());
    };

    let Some(parent) = parents
        .iter()
        .try_fold(json, |current, segment| segment.step_mut(current))
    else {
        return Ok(());
    };

    match (last, parent) {
        (PathSegment::Key(key), JsonValue::Object(map)) => {
            map.shift_remove(key);
        }
        (PathSegment::Index(idx), JsonValue::Array(arr)) if *idx < arr.len() => {
            arr.remove(*idx);
        }
        _ => {}
    }

    Ok(())
}

#[async_trait]
impl PostResponse for JsonTransformer {
    async fn post_response(
        &self,
        data: ResponseData,
        request: RequestInfo,
    ) -> anyhow::Result<ResponseData> {
        if !(data.is_object() || data.is_array()) {
            warn!(
                url = %request.url,
                error = %TransformError::NotJson,
                "Skipping JSON operations"
            );
            return Ok(data);
        }

        Ok(self.apply_operations(data, &request)?)
    }
}
