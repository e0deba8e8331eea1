use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use schoold::error::AppError;
use schoold::marks::service::{self, ScoreChange};
use schoold::marks::store;
use schoold::{api, db};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;
use uuid::Uuid;

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn make_router(workspace: &PathBuf) -> axum::Router {
    let conn = db::open_db(workspace).expect("open db");
    api::build_router(Arc::new(api::AppState::new(workspace.clone(), conn)))
}

async fn call(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };
    let resp = router.clone().oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is not valid JSON")
    };
    (status, value)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn result_paths(body: &serde_json::Value) -> Vec<(String, String)> {
    body["results"]
        .as_array()
        .expect("results array")
        .iter()
        .map(|r| {
            assert_eq!(r["success"], true);
            (
                r["studentId"].as_str().unwrap_or_default().to_string(),
                r["path"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

fn count_entries(record: &serde_json::Value, student_id: &str, subject_id: &str) -> usize {
    record["marks"]
        .as_array()
        .expect("marks array")
        .iter()
        .filter(|m| m["studentId"] == student_id && m["subjectId"] == subject_id)
        .count()
}

#[tokio::test]
async fn bulk_appends_then_updates_without_duplicating() {
    let workspace = temp_dir("schoold-bulk-idempotent");
    let router = make_router(&workspace);
    let (exam_id, subject_id) = (new_id(), new_id());

    let payload = json!({
        "examId": exam_id,
        "subjectId": subject_id,
        "updates": [
            { "studentId": "S1", "testscore": 12, "examscore": 40, "marksObtained": 52, "comment": "good" }
        ]
    });

    let (status, first) = call(&router, "PUT", "/marks/bulk", Some(payload.clone())).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["message"], "Marks updated successfully");
    assert_eq!(
        result_paths(&first),
        vec![("S1".to_string(), "appended".to_string())]
    );

    let (status, second) = call(&router, "PUT", "/marks/bulk", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        result_paths(&second),
        vec![("S1".to_string(), "updated".to_string())]
    );

    let doc = &second["updatedDocuments"][0];
    assert_eq!(doc["id"], first["updatedDocuments"][0]["id"]);
    assert_eq!(count_entries(doc, "S1", &subject_id), 1);

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn bulk_update_replaces_scores_of_existing_entry() {
    let workspace = temp_dir("schoold-bulk-update");
    let router = make_router(&workspace);
    let (exam_id, subject_id, session_id) = (new_id(), new_id(), new_id());

    let (status, _) = call(
        &router,
        "POST",
        &format!("/marks/{session_id}"),
        Some(json!({
            "examId": exam_id,
            "subjectId": subject_id,
            "updates": [
                { "studentId": "S1", "testscore": 10, "examscore": 20, "marksObtained": 30, "comment": "ok" },
                { "studentId": "S2", "testscore": 1, "examscore": 2, "marksObtained": 3, "comment": "hm" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &router,
        "PUT",
        "/marks/bulk",
        Some(json!({
            "examId": exam_id,
            "subjectId": subject_id,
            "updates": [
                { "studentId": "S2", "testscore": 9, "examscore": 9, "marksObtained": 18 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        result_paths(&body),
        vec![("S2".to_string(), "updated".to_string())]
    );

    let doc = &body["updatedDocuments"][0];
    assert_eq!(doc["session"], session_id.as_str());
    let marks = doc["marks"].as_array().expect("marks");
    assert_eq!(marks.len(), 2);
    let s2 = marks
        .iter()
        .find(|m| m["studentId"] == "S2")
        .expect("S2 entry");
    assert_eq!(s2["testscore"], 9.0);
    assert_eq!(s2["marksObtained"], 18.0);
    assert_eq!(s2["comment"], "hm", "comment kept when not sent");

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn bulk_appends_to_first_record_of_the_exam() {
    let workspace = temp_dir("schoold-bulk-append");
    let router = make_router(&workspace);
    let (exam_id, math, session_id) = (new_id(), new_id(), new_id());
    let physics = new_id();

    let (status, created) = call(
        &router,
        "POST",
        &format!("/marks/{session_id}"),
        Some(json!({
            "examId": exam_id,
            "subjectId": math,
            "updates": [
                { "studentId": "S1", "testscore": 10, "examscore": 20, "marksObtained": 30 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &router,
        "PUT",
        "/marks/bulk",
        Some(json!({
            "examId": exam_id,
            "subjectId": physics,
            "updates": [
                { "studentId": "S1", "testscore": 4, "examscore": 5, "marksObtained": 9, "comment": "new" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        result_paths(&body),
        vec![("S1".to_string(), "appended".to_string())]
    );

    let doc = &body["updatedDocuments"][0];
    assert_eq!(doc["id"], created["savedMarks"]["id"]);
    let marks = doc["marks"].as_array().expect("marks");
    assert_eq!(marks.len(), 2);
    assert_eq!(marks[1]["subjectId"], physics.as_str());
    assert_eq!(marks[1]["studentId"], "S1");

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn bulk_fallback_record_has_no_session_until_backfilled() {
    let workspace = temp_dir("schoold-bulk-backfill");
    let router = make_router(&workspace);
    let (exam_id, subject_id, session_id) = (new_id(), new_id(), new_id());

    let (status, body) = call(
        &router,
        "PUT",
        "/marks/bulk",
        Some(json!({
            "examId": exam_id,
            "subjectId": subject_id,
            "updates": [
                { "studentId": "S1", "testscore": 1, "examscore": 1, "marksObtained": 2 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["updatedDocuments"][0]["session"].is_null());

    let (status, body) = call(
        &router,
        "POST",
        "/marks/backfill-session",
        Some(json!({ "sessionId": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "SessionId added to all marks");
    assert_eq!(body["updated"], 1);

    let (status, body) = call(
        &router,
        "POST",
        "/marks/backfill-session",
        Some(json!({ "sessionId": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No marks found without session");

    let (status, _) = call(
        &router,
        "POST",
        "/marks/backfill-session",
        Some(json!({ "sessionId": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn bulk_validates_every_update_before_writing() {
    let workspace = temp_dir("schoold-bulk-invalid");
    let router = make_router(&workspace);
    let (exam_id, subject_id) = (new_id(), new_id());

    let (status, body) = call(
        &router,
        "PUT",
        "/marks/bulk",
        Some(json!({
            "examId": exam_id,
            "subjectId": subject_id,
            "updates": [
                { "studentId": "S1", "testscore": 1, "examscore": 1, "marksObtained": 2 },
                { "testscore": 1, "examscore": 1, "marksObtained": 2 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "updates[1] is missing studentId");
    assert_eq!(body.as_object().map(|o| o.len()), Some(1));

    let (status, body) = call(
        &router,
        "GET",
        &format!("/marks/{exam_id}/{subject_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scores"], json!([]), "first update must not be written");

    for payload in [
        json!({ "examId": exam_id, "subjectId": subject_id, "updates": [] }),
        json!({ "examId": exam_id, "subjectId": subject_id }),
        json!({ "subjectId": subject_id, "updates": [
            { "studentId": "S1", "testscore": 1, "examscore": 1, "marksObtained": 2 }
        ] }),
    ] {
        let (status, _) = call(&router, "PUT", "/marks/bulk", Some(payload.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload}");
    }

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn single_update_touches_matching_entry_only() {
    let workspace = temp_dir("schoold-single-update");
    let router = make_router(&workspace);
    let (exam_id, subject_id, session_id) = (new_id(), new_id(), new_id());

    let (status, _) = call(
        &router,
        "POST",
        &format!("/marks/{session_id}"),
        Some(json!({
            "examId": exam_id,
            "subjectId": subject_id,
            "updates": [
                { "studentId": "S1", "testscore": 10, "examscore": 20, "marksObtained": 30, "comment": "ok" },
                { "studentId": "S2", "testscore": 1, "examscore": 2, "marksObtained": 3, "comment": "hm" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &router,
        "PUT",
        "/marks/S1",
        Some(json!({
            "examId": exam_id,
            "subjectId": subject_id,
            "testscore": 11,
            "examscore": 22,
            "marksObtained": 33,
            "comment": "better"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let marks = body["updatedDocument"]["marks"].as_array().expect("marks");
    assert_eq!(marks[0]["marksObtained"], 33.0);
    assert_eq!(marks[0]["comment"], "better");
    assert_eq!(marks[1]["marksObtained"], 3.0);

    let (status, body) = call(
        &router,
        "PUT",
        "/marks/S404",
        Some(json!({
            "examId": exam_id,
            "subjectId": subject_id,
            "testscore": 1,
            "examscore": 1,
            "marksObtained": 2
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No matching records found");

    let _ = std::fs::remove_dir_all(workspace);
}

fn change(student_id: &str) -> ScoreChange {
    ScoreChange {
        student_id: student_id.to_string(),
        testscore: 1.0,
        examscore: 2.0,
        marks_obtained: 3.0,
        comment: None,
    }
}

fn reject_student(conn: &rusqlite::Connection, student_id: &str) {
    conn.execute_batch(&format!(
        "CREATE TRIGGER reject_entry BEFORE INSERT ON mark_entries
         WHEN NEW.student_id = '{student_id}'
         BEGIN SELECT RAISE(ABORT, 'entry rejected'); END;"
    ))
    .expect("create trigger");
}

#[test]
fn bulk_failure_keeps_earlier_updates_and_stops() {
    let workspace = temp_dir("schoold-bulk-partial");
    let conn = db::open_db(&workspace).expect("open db");
    reject_student(&conn, "bad");

    let res = service::bulk_upsert(&conn, "E", "S", &[change("a"), change("bad"), change("c")]);
    assert!(matches!(res, Err(AppError::Storage(_))), "{res:?}");

    let record = store::find_by_exam(&conn, "E")
        .expect("query")
        .expect("first update committed");
    let students: Vec<&str> = record.marks.iter().map(|m| m.student_id.as_str()).collect();
    assert_eq!(students, vec!["a"]);

    drop(conn);
    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn bulk_storage_failure_is_a_bare_500() {
    let workspace = temp_dir("schoold-bulk-500");
    let router = make_router(&workspace);
    let (exam_id, subject_id) = (new_id(), new_id());
    {
        let side = rusqlite::Connection::open(workspace.join(db::DB_FILE_NAME)).expect("open");
        reject_student(&side, "bad");
    }

    let row = |s: &str| json!({ "studentId": s, "testscore": 1, "examscore": 1, "marksObtained": 2 });
    let (status, body) = call(
        &router,
        "PUT",
        "/marks/bulk",
        Some(json!({
            "examId": exam_id,
            "subjectId": subject_id,
            "updates": [row("a"), row("bad"), row("c")]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "message": "Internal Server Error" }));

    let (status, body) = call(
        &router,
        "GET",
        &format!("/marks/{exam_id}/{subject_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let students: Vec<&str> = body["scores"]
        .as_array()
        .expect("scores")
        .iter()
        .filter_map(|r| r["studentId"].as_str())
        .collect();
    assert_eq!(students, vec!["a"]);

    let _ = std::fs::remove_dir_all(workspace);
}
