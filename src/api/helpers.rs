use crate::directory;
use crate::error::{AppError, AppResult};
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde_json::json;

/// Unwrap a JSON body, reporting unparseable input as a client error.
pub fn body_params(body: Result<Json<serde_json::Value>, JsonRejection>) -> AppResult<serde_json::Value> {
    match body {
        Ok(Json(v)) if v.is_object() => Ok(v),
        Ok(_) => Err(AppError::bad_params("request body must be a JSON object")),
        Err(e) => Err(AppError::bad_params_with(
            "invalid JSON body",
            json!({ "reason": e.body_text() }),
        )),
    }
}

/// Present, non-blank string field.
pub fn require_str(params: &serde_json::Value, key: &str) -> AppResult<String> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(AppError::bad_params(format!("{key} must not be empty"))),
        None => Err(AppError::bad_params(format!("missing {key}"))),
    }
}

/// Non-blank string field; absent, null and blank all read as `None`.
pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Like [`optional_str`], but a value of another JSON type is rejected.
pub fn typed_str(params: &serde_json::Value, key: &str) -> AppResult<Option<String>> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(_)) => Ok(optional_str(params, key)),
        Some(_) => Err(AppError::bad_params(format!("{key} must be a string"))),
    }
}

pub fn require_valid_id(raw: &str, message: &str) -> AppResult<()> {
    if directory::is_valid_id(raw) {
        Ok(())
    } else {
        Err(AppError::bad_params_with(message, json!({ "id": raw })))
    }
}
