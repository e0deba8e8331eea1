use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use super::handlers::{self, exams, marks, sections, sessions, subjects, users};
use super::types::AppState;

/// Build the application router. Middleware (CORS, tracing) is attached by
/// `main.rs` so tests can drive the bare router.
///
/// Paths sharing a position use the same parameter name; handlers extract
/// parameters positionally.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::core::health))
        // marks
        .route("/marks/bulk", put(marks::bulk_upsert))
        .route("/marks/backfill-session", post(marks::backfill_session))
        .route("/marks/student/:student_id", get(marks::by_student))
        .route(
            "/marks/student/:student_id/:session_id",
            get(marks::by_student_in_session),
        )
        .route(
            "/marks/:key",
            post(marks::save_or_update).put(marks::update_single),
        )
        .route("/marks/:key/:other", get(marks::by_pair))
        // directory
        .route("/users", post(users::register))
        .route("/users/backfill-session", post(users::backfill_session))
        .route("/users/:role/:session_id", get(users::by_role_and_session))
        .route("/hods", get(users::heads_of_department))
        .route("/register", post(users::register))
        .route("/register/bulk", post(users::register_bulk))
        .route(
            "/profile/:id",
            get(users::profile).put(users::update_profile),
        )
        .route("/exams", post(exams::create).get(exams::list))
        .route("/sessions", post(sessions::create).get(sessions::list))
        .route("/sessions/active", get(sessions::active))
        // sections and subjects
        .route("/section", post(sections::create))
        .route("/section/:id", get(sections::by_session))
        .route(
            "/section/:id/teachers/:session_id",
            get(sections::teachers),
        )
        .route("/section/:id/students/:selector", get(sections::students))
        .route("/subject/:id", post(subjects::create))
        .route("/subject/:id/:session_id", get(subjects::by_trade_section))
        .with_state(state)
}
