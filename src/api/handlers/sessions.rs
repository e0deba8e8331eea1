use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rusqlite::OptionalExtension;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::api::helpers::{body_params, require_str};
use crate::api::types::AppState;
use crate::db::now_rfc3339;
use crate::error::{AppError, AppResult};

fn session_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let is_active: i64 = row.get(2)?;
    let created_at: String = row.get(3)?;
    Ok(json!({
        "id": id,
        "name": name,
        "isActive": is_active != 0,
        "createdAt": created_at,
    }))
}

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Response> {
    let params = body_params(body)?;
    let name = require_str(&params, "name")?;
    let is_active = match params.get("isActive") {
        None | Some(serde_json::Value::Null) => false,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| AppError::bad_params("isActive must be a boolean"))?,
    };

    let session_id = Uuid::new_v4().to_string();
    let created_at = now_rfc3339();

    let conn = st.db.lock().await;
    let tx = conn.unchecked_transaction()?;
    // At most one active session.
    if is_active {
        tx.execute("UPDATE sessions SET is_active = 0 WHERE is_active = 1", [])?;
    }
    tx.execute(
        "INSERT INTO sessions(id, name, is_active, created_at) VALUES(?, ?, ?, ?)",
        (&session_id, &name, is_active as i64, &created_at),
    )?;
    tx.commit()?;
    info!(session_id = %session_id, is_active, "session created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": session_id,
            "name": name,
            "isActive": is_active,
            "createdAt": created_at,
        })),
    )
        .into_response())
}

pub(crate) async fn list(State(st): State<Arc<AppState>>) -> AppResult<Response> {
    let conn = st.db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT id, name, is_active, created_at FROM sessions ORDER BY created_at, rowid",
    )?;
    let sessions = stmt
        .query_map([], session_json)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((StatusCode::OK, Json(json!({ "sessions": sessions }))).into_response())
}

pub(crate) async fn active(State(st): State<Arc<AppState>>) -> AppResult<Response> {
    let conn = st.db.lock().await;
    let session = conn
        .query_row(
            "SELECT id, name, is_active, created_at FROM sessions
             WHERE is_active = 1
             ORDER BY rowid DESC
             LIMIT 1",
            [],
            session_json,
        )
        .optional()?;

    match session {
        Some(s) => Ok((StatusCode::OK, Json(s)).into_response()),
        None => Err(AppError::not_found("No active session")),
    }
}
