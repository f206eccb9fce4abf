// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subject lifecycle endpoints: initialization, preferences, completion,
//! and status aggregation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::ApiError,
    models::{CompleteResponse, MessageResponse, PrefsRequest, SubjectCreatedResponse},
    state::AppState,
    status::{derive_status, StatusResponse},
    storage::Subject,
};

use super::parse_subject_id;

/// Initialize a new subject.
///
/// Creates the subject record and its media storage namespace together:
/// a subject never exists without storage, and a failed record insert
/// removes the namespace again.
#[utoipa::path(
    post,
    path = "/v1/subjects",
    tag = "Subjects",
    responses(
        (status = 201, description = "Subject created", body = SubjectCreatedResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn init_subject(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SubjectCreatedResponse>), ApiError> {
    let subject = Subject::new();

    state
        .content
        .create_subject_namespace(&subject.subject_id)?;
    if let Err(e) = state.db.create_subject(&subject) {
        let _ = state.content.remove_subject_namespace(&subject.subject_id);
        return Err(e.into());
    }

    Ok((
        StatusCode::CREATED,
        Json(SubjectCreatedResponse {
            subject_id: subject.subject_id,
        }),
    ))
}

/// Upsert display preferences. Idempotent.
#[utoipa::path(
    put,
    path = "/v1/subjects/{subject_id}/prefs",
    tag = "Subjects",
    params(("subject_id" = String, Path, description = "Subject identifier")),
    request_body = PrefsRequest,
    responses(
        (status = 200, description = "Preferences saved", body = MessageResponse),
        (status = 400, description = "Malformed subject id"),
        (status = 404, description = "Unknown subject")
    )
)]
pub async fn set_prefs(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    Json(prefs): Json<PrefsRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let subject_id = parse_subject_id(&subject_id)?;
    state.db.set_prefs(&subject_id, &prefs)?;
    Ok(Json(MessageResponse::new("saved")))
}

/// Complete enrollment: set the active flag and hand back a reference to
/// the externally generated greeting audio.
#[utoipa::path(
    post,
    path = "/v1/subjects/{subject_id}/complete",
    tag = "Subjects",
    params(("subject_id" = String, Path, description = "Subject identifier")),
    responses(
        (status = 200, description = "Enrollment completed", body = CompleteResponse),
        (status = 400, description = "Malformed subject id"),
        (status = 404, description = "Unknown subject"),
        (status = 409, description = "Subject already active")
    )
)]
pub async fn complete_enrollment(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let subject_id = parse_subject_id(&subject_id)?;
    let subject = state.db.activate_subject(&subject_id)?;

    let audio_url = format!(
        "{}/greet_{}.mp3",
        state.config.greeting_base_url.trim_end_matches('/'),
        subject.subject_id
    );
    Ok(Json(CompleteResponse { audio_url }))
}

/// Aggregate enrollment status, recomputed from stored samples and the
/// active flag on every query.
#[utoipa::path(
    get,
    path = "/v1/subjects/{subject_id}/status",
    tag = "Subjects",
    params(("subject_id" = String, Path, description = "Subject identifier")),
    responses(
        (status = 200, description = "Current enrollment status", body = StatusResponse),
        (status = 400, description = "Malformed subject id"),
        (status = 404, description = "Unknown subject")
    )
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let subject_id = parse_subject_id(&subject_id)?;
    let subject = state
        .db
        .get_subject(&subject_id)?
        .ok_or_else(|| ApiError::not_found(format!("subject {subject_id}")))?;

    let has_voice = state.db.has_voice_sample(&subject_id)?;
    let has_face = state.db.has_face_sample(&subject_id)?;
    Ok(Json(derive_status(subject.active, has_voice, has_face)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use crate::status::EnrollmentState;

    #[tokio::test]
    async fn init_subject_creates_record_and_namespace() {
        let (state, _rx, dir) = test_state();

        let (status, Json(created)) = init_subject(State(state.clone())).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let subject = state.db.get_subject(&created.subject_id).unwrap().unwrap();
        assert!(!subject.active);
        assert!(dir.path().join("media").join(&created.subject_id).exists());
    }

    #[tokio::test]
    async fn malformed_subject_id_is_rejected_before_storage() {
        let (state, _rx, _dir) = test_state();

        let err = get_status(State(state), Path("not-a-uuid".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_for_unknown_subject_is_not_found() {
        let (state, _rx, _dir) = test_state();

        let err = get_status(
            State(state),
            Path("00000000-0000-0000-0000-000000000001".into()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn prefs_upsert_is_idempotent() {
        let (state, _rx, _dir) = test_state();
        let (_, Json(created)) = init_subject(State(state.clone())).await.unwrap();

        let prefs = PrefsRequest {
            name: Some("Ada".into()),
            greeting: Some("Welcome back".into()),
            reminder_type: None,
        };
        for _ in 0..2 {
            set_prefs(
                State(state.clone()),
                Path(created.subject_id.clone()),
                Json(prefs.clone()),
            )
            .await
            .unwrap();
        }

        let subject = state.db.get_subject(&created.subject_id).unwrap().unwrap();
        assert_eq!(subject.name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn complete_twice_returns_conflict() {
        let (state, _rx, _dir) = test_state();
        let (_, Json(created)) = init_subject(State(state.clone())).await.unwrap();

        let Json(completed) = complete_enrollment(
            State(state.clone()),
            Path(created.subject_id.clone()),
        )
        .await
        .unwrap();
        assert!(completed
            .audio_url
            .ends_with(&format!("greet_{}.mp3", created.subject_id)));

        let err = complete_enrollment(State(state), Path(created.subject_id))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn completion_forces_complete_status() {
        let (state, _rx, _dir) = test_state();
        let (_, Json(created)) = init_subject(State(state.clone())).await.unwrap();

        let Json(before) = get_status(State(state.clone()), Path(created.subject_id.clone()))
            .await
            .unwrap();
        assert_eq!(before.status, EnrollmentState::Pending);
        assert_eq!(before.percent, 0);

        complete_enrollment(State(state.clone()), Path(created.subject_id.clone()))
            .await
            .unwrap();

        let Json(after) = get_status(State(state), Path(created.subject_id))
            .await
            .unwrap();
        assert_eq!(after.status, EnrollmentState::Complete);
        assert_eq!(after.percent, 100);
    }
}
