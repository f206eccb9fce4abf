// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Worker-to-gateway completion callbacks.
//!
//! These refresh the advisory status cache. They are best-effort on the
//! worker side and self-healing on ours: status queries recompute from the
//! sample store, so a lost callback costs nothing but cache freshness.

use axum::{extract::State, Json};
use tracing::info;

use crate::{
    error::ApiError,
    models::{CallbackPayload, JobKind, MessageResponse},
    state::AppState,
};

use super::parse_subject_id;

/// Voice vectorization finished for a subject.
#[utoipa::path(
    post,
    path = "/internal/voice_done",
    tag = "Internal",
    request_body = CallbackPayload,
    responses(
        (status = 200, description = "Acknowledged", body = MessageResponse),
        (status = 400, description = "Malformed subject id")
    )
)]
pub async fn voice_done(
    State(state): State<AppState>,
    Json(payload): Json<CallbackPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    mark_done(&state, &payload.subject_id, JobKind::Voice)
}

/// Face vectorization finished for a subject.
#[utoipa::path(
    post,
    path = "/internal/face_done",
    tag = "Internal",
    request_body = CallbackPayload,
    responses(
        (status = 200, description = "Acknowledged", body = MessageResponse),
        (status = 400, description = "Malformed subject id")
    )
)]
pub async fn face_done(
    State(state): State<AppState>,
    Json(payload): Json<CallbackPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    mark_done(&state, &payload.subject_id, JobKind::Face)
}

fn mark_done(
    state: &AppState,
    subject_id: &str,
    kind: JobKind,
) -> Result<Json<MessageResponse>, ApiError> {
    let subject_id = parse_subject_id(subject_id)?;
    state.db.mark_modality_done(&subject_id, kind)?;
    info!(subject_id = %subject_id, modality = %kind, "enrollment modality completed");
    Ok(Json(MessageResponse::new("ok")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn callback_refreshes_status_cache() {
        let (state, _rx, _dir) = test_state();
        let subject = crate::storage::Subject::new();
        state.db.create_subject(&subject).unwrap();

        voice_done(
            State(state.clone()),
            Json(CallbackPayload {
                subject_id: subject.subject_id.clone(),
            }),
        )
        .await
        .unwrap();

        let cache = state
            .db
            .get_status_cache(&subject.subject_id)
            .unwrap()
            .unwrap();
        assert!(cache.voice_done);
        assert!(!cache.face_done);
    }

    #[tokio::test]
    async fn malformed_subject_id_is_rejected() {
        let (state, _rx, _dir) = test_state();

        let err = face_done(
            State(state),
            Json(CallbackPayload {
                subject_id: "nope".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
