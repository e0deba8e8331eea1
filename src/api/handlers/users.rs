use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rusqlite::{Connection, ErrorCode};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::api::helpers::{body_params, optional_str, require_str, require_valid_id, typed_str};
use crate::api::types::AppState;
use crate::db::now_rfc3339;
use crate::directory::{self, User, ROLES, ROLE_HOD, USER_COLUMNS};
use crate::error::{AppError, AppResult};

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

/// Validate one registration payload into a fresh user.
fn new_user(params: &serde_json::Value) -> AppResult<User> {
    let username = require_str(params, "username")?;
    let fullname = require_str(params, "fullname")?;
    let role = require_str(params, "role")?;
    if !ROLES.contains(&role.as_str()) {
        return Err(AppError::bad_params_with(
            format!("role must be one of: {}", ROLES.join(", ")),
            json!({ "role": role }),
        ));
    }

    let tech = optional_str(params, "tech");
    check_tech(tech.as_deref())?;
    let trade_section = optional_str(params, "tradeSection");
    if let Some(id) = &trade_section {
        require_valid_id(id, "Invalid trade section ID")?;
    }
    let session = optional_str(params, "session");
    if let Some(id) = &session {
        require_valid_id(id, "Invalid session ID")?;
    }

    Ok(User {
        id: Uuid::new_v4().to_string(),
        username,
        fullname,
        student_name: optional_str(params, "studentName"),
        email: optional_str(params, "email"),
        phone: optional_str(params, "phone"),
        photo_url: optional_str(params, "photoUrl"),
        role,
        trade_section,
        session,
        tech,
        created_at: now_rfc3339(),
    })
}

fn check_tech(tech: Option<&str>) -> AppResult<()> {
    match tech {
        Some(t) if !directory::is_tech_group(t) => Err(AppError::bad_params(
            "Invalid tech. Use tech_1, tech_2, or tech_3.",
        )),
        _ => Ok(()),
    }
}

fn insert_user(conn: &Connection, user: &User) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO users(
           id, username, fullname, student_name, email, phone, photo_url,
           role, trade_section_id, session_id, tech, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            user.id,
            user.username,
            user.fullname,
            user.student_name,
            user.email,
            user.phone,
            user.photo_url,
            user.role,
            user.trade_section,
            user.session,
            user.tech,
            user.created_at,
        ],
    )
}

pub(crate) async fn register(
    State(st): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Response> {
    let params = body_params(body)?;
    let user = new_user(&params)?;

    let conn = st.db.lock().await;
    match insert_user(&conn, &user) {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict("username already taken".to_string()));
        }
        Err(e) => return Err(e.into()),
    }

    info!(user_id = %user.id, role = %user.role, "user registered");
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

// ---------------------------------------------------------------------------
// POST /register/bulk
// ---------------------------------------------------------------------------

/// Every payload is validated before the first insert. Taken usernames are
/// reported per user; the rest are created in one transaction.
pub(crate) async fn register_bulk(
    State(st): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Response> {
    let params = body_params(body)?;
    let Some(items) = params.get("users").and_then(|v| v.as_array()) else {
        return Err(AppError::bad_params("Invalid or missing users array"));
    };
    if items.is_empty() {
        return Err(AppError::bad_params("users must not be empty"));
    }

    let mut users = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        if !item.is_object() {
            return Err(AppError::bad_params(format!("users[{i}] must be an object")));
        }
        let user = new_user(item).map_err(|e| match e {
            AppError::BadParams { message, details } => AppError::BadParams {
                message: format!("users[{i}]: {message}"),
                details,
            },
            other => other,
        })?;
        users.push(user);
    }

    let conn = st.db.lock().await;
    let tx = conn.unchecked_transaction()?;
    let mut results = Vec::with_capacity(users.len());
    let mut created = Vec::new();
    for user in users {
        match insert_user(&tx, &user) {
            Ok(_) => {
                results.push(json!({
                    "username": user.username,
                    "success": true,
                    "id": user.id,
                }));
                created.push(user);
            }
            Err(e) if is_unique_violation(&e) => {
                results.push(json!({
                    "username": user.username,
                    "success": false,
                    "message": "username already taken",
                }));
            }
            Err(e) => return Err(e.into()),
        }
    }
    tx.commit()?;

    let failed = results.len() - created.len();
    info!(created = created.len(), failed, "users registered in bulk");

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Bulk registration complete",
            "created": created.len(),
            "failed": failed,
            "results": results,
            "users": created,
        })),
    )
        .into_response())
}

pub(crate) async fn profile(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    require_valid_id(&id, "Invalid user ID")?;

    let conn = st.db.lock().await;
    match directory::user_by_id(&conn, &id)? {
        Some(user) => Ok((StatusCode::OK, Json(user)).into_response()),
        None => Err(AppError::not_found("User not found")),
    }
}

// ---------------------------------------------------------------------------
// PUT /profile/:id
// ---------------------------------------------------------------------------

/// Partial profile edit. Username and role are fixed at registration; absent
/// or null fields keep their stored value.
pub(crate) async fn update_profile(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Response> {
    require_valid_id(&id, "Invalid user ID")?;
    let params = body_params(body)?;

    let fullname = match params.get("fullname") {
        None | Some(serde_json::Value::Null) => None,
        Some(_) => Some(require_str(&params, "fullname")?),
    };
    let student_name = typed_str(&params, "studentName")?;
    let email = typed_str(&params, "email")?;
    let phone = typed_str(&params, "phone")?;
    let photo_url = typed_str(&params, "photoUrl")?;
    let tech = typed_str(&params, "tech")?;
    check_tech(tech.as_deref())?;
    let trade_section = typed_str(&params, "tradeSection")?;
    if let Some(v) = &trade_section {
        require_valid_id(v, "Invalid trade section ID")?;
    }
    let session = typed_str(&params, "session")?;
    if let Some(v) = &session {
        require_valid_id(v, "Invalid session ID")?;
    }

    let conn = st.db.lock().await;
    let Some(mut user) = directory::user_by_id(&conn, &id)? else {
        return Err(AppError::not_found("User not found"));
    };

    let mut changed = Vec::new();
    if let Some(v) = fullname {
        user.fullname = v;
        changed.push("fullname");
    }
    for (field, value, slot) in [
        ("studentName", student_name, &mut user.student_name),
        ("email", email, &mut user.email),
        ("phone", phone, &mut user.phone),
        ("photoUrl", photo_url, &mut user.photo_url),
        ("tech", tech, &mut user.tech),
        ("tradeSection", trade_section, &mut user.trade_section),
        ("session", session, &mut user.session),
    ] {
        if value.is_some() {
            *slot = value;
            changed.push(field);
        }
    }
    if changed.is_empty() {
        return Err(AppError::bad_params("no updatable fields in request"));
    }

    conn.execute(
        "UPDATE users
         SET fullname = ?, student_name = ?, email = ?, phone = ?, photo_url = ?,
             tech = ?, trade_section_id = ?, session_id = ?
         WHERE id = ?",
        rusqlite::params![
            user.fullname,
            user.student_name,
            user.email,
            user.phone,
            user.photo_url,
            user.tech,
            user.trade_section,
            user.session,
            user.id,
        ],
    )?;
    info!(user_id = %user.id, fields = ?changed, "profile updated");

    Ok((StatusCode::OK, Json(user)).into_response())
}

pub(crate) async fn by_role_and_session(
    State(st): State<Arc<AppState>>,
    Path((role, session_id)): Path<(String, String)>,
) -> AppResult<Response> {
    if !ROLES.contains(&role.as_str()) {
        return Err(AppError::bad_params_with(
            "unknown role",
            json!({ "role": role }),
        ));
    }
    require_valid_id(&session_id, "Invalid session ID")?;

    let conn = st.db.lock().await;
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE role = ? AND session_id = ? ORDER BY fullname"
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map([&role, &session_id], directory::user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((StatusCode::OK, Json(json!({ "users": users }))).into_response())
}

pub(crate) async fn heads_of_department(State(st): State<Arc<AppState>>) -> AppResult<Response> {
    let conn = st.db.lock().await;
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE role = ? ORDER BY fullname");
    let mut stmt = conn.prepare(&sql)?;
    let hods = stmt
        .query_map([ROLE_HOD], directory::user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((StatusCode::OK, Json(json!({ "hods": hods }))).into_response())
}

pub(crate) async fn backfill_session(
    State(st): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Response> {
    let params = body_params(body)?;
    let session_id = require_str(&params, "sessionId")
        .map_err(|_| AppError::bad_params("sessionId is required"))?;
    require_valid_id(&session_id, "Invalid session ID")?;

    let conn = st.db.lock().await;
    let updated = conn.execute(
        "UPDATE users SET session_id = ? WHERE session_id IS NULL",
        [&session_id],
    )?;
    info!(session_id = %session_id, updated, "user sessions backfilled");

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Session added to users without session",
            "updated": updated,
        })),
    )
        .into_response())
}
