//! Sections are trade groupings inside an academic session. Responses use
//! the `{status, message, data}` envelope the section screens expect.

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

use crate::api::helpers::{body_params, optional_str, require_valid_id};
use crate::api::types::AppState;
use crate::db::now_rfc3339;
use crate::directory::{self, ROLE_HOD, ROLE_STUDENT, ROLE_TEACHER};
use crate::error::{AppError, AppResult};

fn envelope(status: StatusCode, message: impl Into<String>, data: serde_json::Value) -> Response {
    (
        status,
        Json(json!({
            "status": "success",
            "message": message.into(),
            "data": data,
        })),
    )
        .into_response()
}

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Response> {
    let params = body_params(body)?;
    let (Some(name), Some(session_id)) =
        (optional_str(&params, "name"), optional_str(&params, "session"))
    else {
        return Err(AppError::bad_params(
            "Section name and session are required.",
        ));
    };
    let hod_id = optional_str(&params, "hod");
    let description = optional_str(&params, "description");

    let conn = st.db.lock().await;

    if let Some(hod) = &hod_id {
        let user = if directory::is_valid_id(hod) {
            directory::user_by_id(&conn, hod)?
        } else {
            None
        };
        if !user.map(|u| u.role == ROLE_HOD).unwrap_or(false) {
            return Err(AppError::bad_params(
                "Provided HOD is invalid or not a head_of_department.",
            ));
        }
    }
    require_valid_id(&session_id, "Invalid session ID.")?;

    let section_id = Uuid::new_v4().to_string();
    let created_at = now_rfc3339();
    conn.execute(
        "INSERT INTO sections(id, name, hod_id, description, session_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &section_id,
            &name,
            &hod_id,
            &description,
            &session_id,
            &created_at,
        ),
    )?;
    info!(section_id = %section_id, session_id = %session_id, "section created");

    Ok(envelope(
        StatusCode::CREATED,
        "Section created successfully.",
        json!({
            "id": section_id,
            "name": name,
            "hod": hod_id,
            "description": description,
            "session": session_id,
            "createdAt": created_at,
        }),
    ))
}

pub(crate) async fn by_session(
    State(st): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> AppResult<Response> {
    require_valid_id(&session_id, "Invalid session ID.")?;

    let conn = st.db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.description, s.session_id, s.created_at,
                u.id, u.fullname, u.email
         FROM sections s
         LEFT JOIN users u ON u.id = s.hod_id
         WHERE s.session_id = ?
         ORDER BY s.name",
    )?;
    let sections = stmt
        .query_map([&session_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let description: Option<String> = row.get(2)?;
            let session: String = row.get(3)?;
            let created_at: String = row.get(4)?;
            let hod_id: Option<String> = row.get(5)?;
            let hod = match hod_id {
                Some(hod_id) => {
                    let fullname: String = row.get(6)?;
                    let email: Option<String> = row.get(7)?;
                    json!({ "id": hod_id, "fullname": fullname, "email": email })
                }
                None => serde_json::Value::Null,
            };
            Ok(json!({
                "id": id,
                "name": name,
                "hod": hod,
                "description": description,
                "session": session,
                "createdAt": created_at,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(envelope(
        StatusCode::OK,
        "Sections retrieved successfully.",
        json!(sections),
    ))
}

fn member_json(row: &rusqlite::Row<'_>, with_tech: bool) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let fullname: String = row.get(1)?;
    let email: Option<String> = row.get(2)?;
    let phone: Option<String> = row.get(3)?;
    let photo_url: Option<String> = row.get(4)?;
    let mut v = json!({
        "id": id,
        "fullname": fullname,
        "email": email,
        "phone": phone,
        "photoUrl": photo_url,
    });
    if with_tech {
        let tech: Option<String> = row.get(5)?;
        v["tech"] = json!(tech);
    }
    Ok(v)
}

pub(crate) async fn teachers(
    State(st): State<Arc<AppState>>,
    Path((section_id, session_id)): Path<(String, String)>,
) -> AppResult<Response> {
    if !directory::is_valid_id(&section_id) || !directory::is_valid_id(&session_id) {
        return Err(AppError::bad_params("Invalid section or session ID format."));
    }

    let conn = st.db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT id, fullname, email, phone, photo_url
         FROM users
         WHERE role = ? AND trade_section_id = ? AND session_id = ?
         ORDER BY fullname",
    )?;
    let teachers = stmt
        .query_map([ROLE_TEACHER, section_id.as_str(), session_id.as_str()], |row| {
            member_json(row, false)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if teachers.is_empty() {
        return Err(AppError::not_found(
            "No teachers found for the given section and session.",
        ));
    }

    Ok(envelope(
        StatusCode::OK,
        "Teachers retrieved successfully.",
        json!(teachers),
    ))
}

/// `selector` is either a session id or a tech group (`tech_1`..`tech_3`).
pub(crate) async fn students(
    State(st): State<Arc<AppState>>,
    Path((section_id, selector)): Path<(String, String)>,
) -> AppResult<Response> {
    if directory::is_tech_group(&selector) {
        let conn = st.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, fullname, email, phone, photo_url
             FROM users
             WHERE role = ? AND trade_section_id = ? AND tech = ?
             ORDER BY fullname",
        )?;
        let students = stmt
            .query_map([ROLE_STUDENT, section_id.as_str(), selector.as_str()], |row| {
                member_json(row, false)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        return Ok(envelope(
            StatusCode::OK,
            format!("Students in {selector} retrieved successfully."),
            json!(students),
        ));
    }

    if !directory::is_valid_id(&selector) {
        return Err(AppError::bad_params(
            "Invalid tech. Use tech_1, tech_2, or tech_3.",
        ));
    }

    let conn = st.db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT id, fullname, email, phone, photo_url, tech
         FROM users
         WHERE role = ? AND trade_section_id = ? AND session_id = ?
         ORDER BY fullname",
    )?;
    let students = stmt
        .query_map([ROLE_STUDENT, section_id.as_str(), selector.as_str()], |row| {
            member_json(row, true)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(envelope(
        StatusCode::OK,
        "Students retrieved successfully.",
        json!(students),
    ))
}
