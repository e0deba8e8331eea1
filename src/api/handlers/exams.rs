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

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Response> {
    let params = body_params(body)?;
    let name = require_str(&params, "name")?;

    let conn = st.db.lock().await;
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM exams WHERE name = ?", [&name], |r| r.get(0))
        .optional()?;
    if exists.is_some() {
        return Err(AppError::Conflict(format!("exam already exists: {name}")));
    }

    let exam_id = Uuid::new_v4().to_string();
    let created_at = now_rfc3339();
    conn.execute(
        "INSERT INTO exams(id, name, created_at) VALUES(?, ?, ?)",
        (&exam_id, &name, &created_at),
    )?;
    info!(exam_id = %exam_id, name = %name, "exam created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": exam_id, "name": name, "createdAt": created_at })),
    )
        .into_response())
}

pub(crate) async fn list(State(st): State<Arc<AppState>>) -> AppResult<Response> {
    let conn = st.db.lock().await;
    let mut stmt = conn.prepare("SELECT id, name, created_at FROM exams ORDER BY name")?;
    let exams = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let created_at: String = row.get(2)?;
            Ok(json!({ "id": id, "name": name, "createdAt": created_at }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((StatusCode::OK, Json(json!({ "exams": exams }))).into_response())
}
