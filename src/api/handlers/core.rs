use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api::types::AppState;

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "service": st.build.service,
            "version": st.build.version,
            "workspacePath": st.workspace.to_string_lossy(),
        })),
    )
}
