use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::api::helpers::{body_params, require_str, require_valid_id};
use crate::api::types::AppState;
use crate::directory;
use crate::error::{AppError, AppResult};
use crate::marks::service::{self, SaveOutcome, ScoreChange, UpsertPath};
use crate::marks::MarkUpdate;

fn parse_updates(params: &serde_json::Value) -> AppResult<Vec<MarkUpdate>> {
    let Some(items) = params.get("updates").and_then(|v| v.as_array()) else {
        return Err(AppError::bad_params("Invalid or missing updates array"));
    };

    let mut updates = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        if !item.is_object() {
            return Err(AppError::bad_params_with(
                format!("updates[{i}] must be an object"),
                json!({ "index": i }),
            ));
        }
        let update: MarkUpdate = serde_json::from_value(item.clone()).map_err(|e| {
            AppError::bad_params_with(
                format!("updates[{i}] is malformed"),
                json!({ "index": i, "reason": e.to_string() }),
            )
        })?;
        updates.push(update);
    }
    Ok(updates)
}

fn parse_changes(updates: &[MarkUpdate]) -> AppResult<Vec<ScoreChange>> {
    updates
        .iter()
        .enumerate()
        .map(|(i, u)| {
            ScoreChange::from_update(u).map_err(|field| {
                AppError::bad_params_with(
                    format!("updates[{i}] is missing {field}"),
                    json!({ "index": i, "field": field }),
                )
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// POST /marks/:sessionId
// ---------------------------------------------------------------------------

pub(crate) async fn save_or_update(
    State(st): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Response> {
    require_valid_id(&session_id, "Invalid session ID")?;
    let params = body_params(body)?;
    let updates = parse_updates(&params)?;
    let exam_id = require_str(&params, "examId")?;
    let subject_id = require_str(&params, "subjectId")?;

    let conn = st.db.lock().await;
    let outcome = service::save_or_update(&conn, &exam_id, &subject_id, &session_id, &updates)?;

    Ok(match outcome {
        SaveOutcome::Created(record) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Marks saved successfully",
                "savedMarks": record,
            })),
        )
            .into_response(),
        SaveOutcome::Updated(record) => (
            StatusCode::OK,
            Json(json!({
                "message": "Marks updated successfully",
                "updatedMarks": record,
            })),
        )
            .into_response(),
    })
}

// ---------------------------------------------------------------------------
// PUT /marks/bulk
// ---------------------------------------------------------------------------

pub(crate) async fn bulk_upsert(
    State(st): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Response> {
    let params = body_params(body)?;
    let exam_id = require_str(&params, "examId")?;
    let subject_id = require_str(&params, "subjectId")?;
    let updates = parse_updates(&params)?;
    if updates.is_empty() {
        return Err(AppError::bad_params("updates must not be empty"));
    }
    // Every update is checked before the first write.
    let changes = parse_changes(&updates)?;

    let conn = st.db.lock().await;
    let outcomes = service::bulk_upsert(&conn, &exam_id, &subject_id, &changes)?;

    let results: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|o| {
            json!({
                "studentId": o.student_id,
                "success": true,
                "path": match o.path {
                    UpsertPath::Updated => "updated",
                    UpsertPath::Appended => "appended",
                },
            })
        })
        .collect();
    let documents: Vec<_> = outcomes.into_iter().map(|o| o.record).collect();

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Marks updated successfully",
            "results": results,
            "updatedDocuments": documents,
        })),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// PUT /marks/:studentId
// ---------------------------------------------------------------------------

pub(crate) async fn update_single(
    State(st): State<Arc<AppState>>,
    Path(student_id): Path<String>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Response> {
    let params = body_params(body)?;
    let exam_id = require_str(&params, "examId")?;
    let subject_id = require_str(&params, "subjectId")?;

    let mut update: MarkUpdate = serde_json::from_value(params.clone()).map_err(|e| {
        AppError::bad_params_with("malformed mark update", json!({ "reason": e.to_string() }))
    })?;
    update.student_id = Some(student_id);
    let change = ScoreChange::from_update(&update)
        .map_err(|field| AppError::bad_params(format!("missing {field}")))?;

    let conn = st.db.lock().await;
    let record = service::update_single(&conn, &exam_id, &subject_id, &change)?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Marks updated successfully",
            "updatedDocument": record,
        })),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// POST /marks/backfill-session
// ---------------------------------------------------------------------------

pub(crate) async fn backfill_session(
    State(st): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Response> {
    let params = body_params(body)?;
    let session_id = require_str(&params, "sessionId")
        .map_err(|_| AppError::bad_params("sessionId is required"))?;
    require_valid_id(&session_id, "Invalid session ID")?;

    let conn = st.db.lock().await;
    let updated = service::backfill_sessions(&conn, &session_id)?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "SessionId added to all marks",
            "updated": updated,
        })),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// GET /marks/:examName/:sessionId and GET /marks/:examId/:subjectId
// ---------------------------------------------------------------------------

/// Both lookups share one path shape. A leading segment that is a valid id
/// selects the score sheet; anything else is an exam name.
pub(crate) async fn by_pair(
    State(st): State<Arc<AppState>>,
    Path((first, second)): Path<(String, String)>,
) -> AppResult<Response> {
    if directory::is_valid_id(&first) {
        require_valid_id(&second, "Invalid id format")?;

        let conn = st.db.lock().await;
        let scores = service::score_sheet(&conn, &first, &second)?;
        return Ok((
            StatusCode::OK,
            Json(json!({
                "examId": first,
                "subjectId": second,
                "scores": scores,
            })),
        )
            .into_response());
    }

    require_valid_id(&second, "Invalid session ID")?;
    let conn = st.db.lock().await;
    let (exam_id, records) = service::by_exam_and_session(&conn, &first, &second)?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "examId": exam_id,
            "scores": records,
        })),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// GET /marks/student/:studentId[/:sessionId]
// ---------------------------------------------------------------------------

pub(crate) async fn by_student_in_session(
    State(st): State<Arc<AppState>>,
    Path((student_id, session_id)): Path<(String, String)>,
) -> AppResult<Response> {
    require_valid_id(&student_id, "Invalid student ID")?;
    require_valid_id(&session_id, "Invalid session ID")?;

    let conn = st.db.lock().await;
    let scores = service::by_student(&conn, &student_id, Some(&session_id))?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "studentId": student_id,
            "sessionId": session_id,
            "scores": scores,
        })),
    )
        .into_response())
}

pub(crate) async fn by_student(
    State(st): State<Arc<AppState>>,
    Path(student_id): Path<String>,
) -> AppResult<Response> {
    require_valid_id(&student_id, "Invalid student ID")?;

    let conn = st.db.lock().await;
    let scores = service::by_student(&conn, &student_id, None)?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "studentId": student_id,
            "scores": scores,
        })),
    )
        .into_response())
}
