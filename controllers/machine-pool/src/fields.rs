//! Typed access to dynamic provider object payloads.
//!
//! Provider kinds are only known at runtime, so their objects arrive as
//! unstructured JSON. Reconcilers read them exclusively through these
//! accessors, which distinguish a structurally absent field (`Ok(None)`)
//! from a present but malformed one (`Err`).

use kube::api::DynamicObject;
use serde_json::Value;
use thiserror::Error;

/// Errors from reading typed fields out of dynamic objects.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    /// Field is present but not of the expected type
    #[error("field {path} is not a {expected}")]
    WrongType {
        /// Dotted path of the offending field
        path: String,
        /// Type the caller asked for
        expected: &'static str,
    },
}

fn wrong_type(path: &[&str], expected: &'static str) -> FieldError {
    FieldError::WrongType {
        path: path.join("."),
        expected,
    }
}

/// Walks `path` through the object payload. Absent or null segments yield
/// `Ok(None)`; descending into a non-object value is an error.
fn value_at<'a>(object: &'a DynamicObject, path: &[&str]) -> Result<Option<&'a Value>, FieldError> {
    let mut current = &object.data;
    for (depth, segment) in path.iter().enumerate() {
        match current {
            Value::Null => return Ok(None),
            Value::Object(map) => match map.get(*segment) {
                Some(next) => current = next,
                None => return Ok(None),
            },
            _ => return Err(wrong_type(&path[..depth], "object")),
        }
    }
    Ok(Some(current))
}

/// Reads a string field.
pub(crate) fn read_string(object: &DynamicObject, path: &[&str]) -> Result<Option<String>, FieldError> {
    match value_at(object, path)? {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(wrong_type(path, "string")),
    }
}

/// Reads a list of strings, rejecting lists with non-string elements.
pub(crate) fn read_string_list(
    object: &DynamicObject,
    path: &[&str],
) -> Result<Option<Vec<String>>, FieldError> {
    let items = match value_at(object, path)? {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => return Ok(None),
        Some(_) => return Err(wrong_type(path, "list of strings")),
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => out.push(s.clone()),
            _ => return Err(wrong_type(path, "list of strings")),
        }
    }
    Ok(Some(out))
}

/// Reads an integer field.
pub(crate) fn read_int(object: &DynamicObject, path: &[&str]) -> Result<Option<i64>, FieldError> {
    match value_at(object, path)? {
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| wrong_type(path, "integer")),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(wrong_type(path, "integer")),
    }
}

/// Reads a boolean field.
pub(crate) fn read_bool(object: &DynamicObject, path: &[&str]) -> Result<Option<bool>, FieldError> {
    match value_at(object, path)? {
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(wrong_type(path, "boolean")),
    }
}

/// Whether the object reports `status.ready == true`. An absent field reads
/// as not ready.
pub(crate) fn is_ready(object: &DynamicObject) -> Result<bool, FieldError> {
    Ok(read_bool(object, &["status", "ready"])?.unwrap_or(false))
}

/// The object's `status.failureReason` and `status.failureMessage`, when set.
pub(crate) fn failure_of(
    object: &DynamicObject,
) -> Result<(Option<String>, Option<String>), FieldError> {
    let reason = read_string(object, &["status", "failureReason"])?;
    let message = read_string(object, &["status", "failureMessage"])?;
    Ok((reason, message))
}
