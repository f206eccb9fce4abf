// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ApiError,
    models::{
        CallbackPayload, CompleteResponse, FaceFetchRequest, MessageResponse, PrefsRequest,
        QueuedResponse, SubjectCreatedResponse, VoiceFetchRequest,
    },
    state::AppState,
    status::{EnrollmentState, StatusResponse},
};

pub mod enroll;
pub mod health;
pub mod internal;
pub mod subjects;

/// Largest accepted upload body (three JPEG frames or one WAV recording).
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/subjects", post(subjects::init_subject))
        .route("/subjects/{subject_id}/voice", post(enroll::submit_voice))
        .route(
            "/subjects/{subject_id}/voice/fetch",
            post(enroll::submit_voice_fetch),
        )
        .route("/subjects/{subject_id}/face", post(enroll::submit_face))
        .route(
            "/subjects/{subject_id}/face/fetch",
            post(enroll::submit_face_fetch),
        )
        .route("/subjects/{subject_id}/prefs", put(subjects::set_prefs))
        .route(
            "/subjects/{subject_id}/complete",
            post(subjects::complete_enrollment),
        )
        .route("/subjects/{subject_id}/status", get(subjects::get_status))
        .with_state(state.clone());

    let internal_routes = Router::new()
        .route("/voice_done", post(internal::voice_done))
        .route("/face_done", post(internal::face_done))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .nest("/internal", internal_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Validate a subject identifier before any storage access.
pub(crate) fn parse_subject_id(raw: &str) -> Result<String, ApiError> {
    uuid::Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| ApiError::bad_request("malformed subject id"))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        subjects::init_subject,
        subjects::set_prefs,
        subjects::complete_enrollment,
        subjects::get_status,
        enroll::submit_voice,
        enroll::submit_voice_fetch,
        enroll::submit_face,
        enroll::submit_face_fetch,
        internal::voice_done,
        internal::face_done,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            SubjectCreatedResponse,
            PrefsRequest,
            CompleteResponse,
            QueuedResponse,
            VoiceFetchRequest,
            FaceFetchRequest,
            CallbackPayload,
            MessageResponse,
            StatusResponse,
            EnrollmentState,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Subjects", description = "Subject lifecycle and status"),
        (name = "Enrollment", description = "Voice and face sample submission"),
        (name = "Internal", description = "Worker completion callbacks"),
        (name = "Health", description = "Service health probes")
    )
)]
struct ApiDoc;
