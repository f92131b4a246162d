//! Completion polling endpoint.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use viva_core::{InterviewStatus, InterviewStore as _};

use crate::AppState;

/// `GET /interviews/{id}/summary`
///
/// 200 with the stored summary once the interview is `COMPLETE`; 400 naming
/// the current status while it is still running; 404 for unknown ids.  A
/// `COMPLETE` interview without a summary is a broken invariant and reports
/// 404 after logging loudly.
pub(crate) async fn summary(
    State(state): State<AppState>,
    Path(interview_id): Path<Uuid>,
) -> Response {
    let interview = match state.ports.store.interview(interview_id).await {
        Ok(interview) => interview,
        Err(_) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "interview not found"})),
            )
                .into_response();
        }
    };

    if interview.status != InterviewStatus::Complete {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("interview is {}, not COMPLETE", interview.status)
            })),
        )
            .into_response();
    }

    match interview.completion_summary() {
        Some(summary) => (StatusCode::OK, Json(summary)).into_response(),
        None => {
            error!(%interview_id, "COMPLETE interview has no completion summary");
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "completion summary missing"})),
            )
                .into_response()
        }
    }
}
