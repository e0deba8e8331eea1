use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::api::helpers::{body_params, require_str, require_valid_id};
use crate::api::types::AppState;
use crate::db::now_rfc3339;
use crate::directory::{self, ROLE_TEACHER};
use crate::error::{AppError, AppResult};

// ---------------------------------------------------------------------------
// POST /subject/:sessionId
// ---------------------------------------------------------------------------

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Response> {
    let params = body_params(body)?;
    let name = require_str(&params, "name")?;
    let teacher_username = require_str(&params, "teacherUsername")?;
    let classname = require_str(&params, "classname")?;
    let trade_section_id = require_str(&params, "tradeSectionId")?;

    let conn = st.db.lock().await;

    let Some(teacher) = directory::user_by_username_and_role(&conn, &teacher_username, ROLE_TEACHER)?
    else {
        return Err(AppError::not_found("Teacher not found"));
    };
    if !directory::is_tech_group(&classname) {
        return Err(AppError::bad_params(
            "Invalid classname. Must be tech_1, tech_2, or tech_3",
        ));
    }
    require_valid_id(&trade_section_id, "Invalid trade section ID")?;
    require_valid_id(&session_id, "Invalid session ID")?;

    let subject_id = Uuid::new_v4().to_string();
    let created_at = now_rfc3339();
    conn.execute(
        "INSERT INTO subjects(id, name, teacher_id, classname, trade_section_id, session_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &subject_id,
            &name,
            &teacher.id,
            &classname,
            &trade_section_id,
            &session_id,
            &created_at,
        ),
    )?;
    info!(subject_id = %subject_id, teacher = %teacher.username, "subject created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": subject_id,
            "name": name,
            "teacher": teacher.id,
            "classname": classname,
            "tradeSection": trade_section_id,
            "session": session_id,
            "createdAt": created_at,
        })),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// GET /subject/:tradeSectionId/:sessionId
// ---------------------------------------------------------------------------

pub(crate) async fn by_trade_section(
    State(st): State<Arc<AppState>>,
    Path((trade_section_id, session_id)): Path<(String, String)>,
) -> AppResult<Response> {
    require_valid_id(&trade_section_id, "Invalid trade section ID")?;
    require_valid_id(&session_id, "Invalid session ID")?;

    let conn = st.db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.classname, s.trade_section_id, s.session_id, s.created_at,
                u.id, u.fullname, u.username
         FROM subjects s
         LEFT JOIN users u ON u.id = s.teacher_id
         WHERE s.trade_section_id = ? AND s.session_id = ?
         ORDER BY s.rowid",
    )?;
    let subjects = stmt
        .query_map([&trade_section_id, &session_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let classname: String = row.get(2)?;
            let trade_section: String = row.get(3)?;
            let session: String = row.get(4)?;
            let created_at: String = row.get(5)?;
            let teacher_id: Option<String> = row.get(6)?;
            let teacher = match teacher_id {
                Some(teacher_id) => {
                    let fullname: String = row.get(7)?;
                    let username: String = row.get(8)?;
                    json!({ "id": teacher_id, "fullname": fullname, "username": username })
                }
                None => serde_json::Value::Null,
            };
            Ok(json!({
                "id": id,
                "name": name,
                "teacher": teacher,
                "classname": classname,
                "tradeSection": trade_section,
                "session": session,
                "createdAt": created_at,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((StatusCode::OK, Json(json!(subjects))).into_response())
}
