// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sample submission endpoints.
//!
//! Each modality accepts either a direct multipart upload (the gateway
//! encrypts and stores the media itself) or a reference to an externally
//! hosted, already-encrypted blob (the gateway verifies reachability, the
//! worker fetches it). Both paths end the same way: an atomic keyed insert
//! of the sample row, then a fire-and-forget job dispatch. Completion is
//! asynchronous; the response only acknowledges queueing.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::{
    error::ApiError,
    models::{BlobRef, FaceFetchRequest, QueuedResponse, VoiceFetchRequest},
    state::AppState,
    storage::{FaceSampleRecord, VoiceSampleRecord},
};

use super::parse_subject_id;

/// Accepted content types for direct voice uploads.
const VOICE_UPLOAD_TYPES: &[&str] = &["audio/wav", "audio/x-wav"];

/// Accepted content types for direct face uploads.
const FACE_UPLOAD_TYPES: &[&str] = &["image/jpeg"];

/// Accepted content types for referenced remote blobs. Encrypted blobs are
/// commonly served as octet streams.
const VOICE_REMOTE_TYPES: &[&str] = &["audio/wav", "audio/x-wav", "application/octet-stream"];
const FACE_REMOTE_TYPES: &[&str] = &["image/jpeg", "application/octet-stream"];

/// Submit a voice sample as a direct multipart upload (field `file`).
#[utoipa::path(
    post,
    path = "/v1/subjects/{subject_id}/voice",
    tag = "Enrollment",
    params(("subject_id" = String, Path, description = "Subject identifier")),
    responses(
        (status = 202, description = "Sample stored, vectorization queued", body = QueuedResponse),
        (status = 400, description = "Malformed id, missing file, or wrong content type"),
        (status = 404, description = "Unknown subject"),
        (status = 409, description = "Voice sample already enrolled")
    )
)]
pub async fn submit_voice(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    let subject_id = parse_subject_id(&subject_id)?;
    ensure_subject_exists(&state, &subject_id)?;
    if state.db.has_voice_sample(&subject_id)? {
        return Err(ApiError::conflict("voice sample already enrolled"));
    }

    let mut fields = collect_upload_fields(&mut multipart, VOICE_UPLOAD_TYPES).await?;
    let bytes = fields
        .remove("file")
        .ok_or_else(|| ApiError::bad_request("missing multipart field: file"))?;

    // Unique file name per upload: a concurrent duplicate submission can
    // never touch the winning sample's media.
    let file_name = format!("voice-{}.wav.enc", uuid::Uuid::new_v4());
    let (blob_ref, key) = encrypt_and_store(&state, &subject_id, &file_name, &bytes)?;
    let record = VoiceSampleRecord::new(&subject_id, blob_ref);
    if let Err(e) = state.db.insert_voice_sample(&record) {
        let _ = state.content.remove(&key);
        return Err(e.into());
    }

    state
        .dispatcher
        .enqueue_voice(&subject_id, record.file_ref.clone())?;
    Ok((StatusCode::ACCEPTED, Json(QueuedResponse::queued())))
}

/// Submit a voice sample by reference to an externally hosted encrypted blob.
#[utoipa::path(
    post,
    path = "/v1/subjects/{subject_id}/voice/fetch",
    tag = "Enrollment",
    params(("subject_id" = String, Path, description = "Subject identifier")),
    request_body = VoiceFetchRequest,
    responses(
        (status = 202, description = "Reference recorded, vectorization queued", body = QueuedResponse),
        (status = 400, description = "Malformed id or blob URL"),
        (status = 404, description = "Unknown subject"),
        (status = 409, description = "Voice sample already enrolled"),
        (status = 422, description = "Blob unreachable or of unexpected type")
    )
)]
pub async fn submit_voice_fetch(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    Json(request): Json<VoiceFetchRequest>,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    let subject_id = parse_subject_id(&subject_id)?;
    ensure_subject_exists(&state, &subject_id)?;
    if state.db.has_voice_sample(&subject_id)? {
        return Err(ApiError::conflict("voice sample already enrolled"));
    }

    let url = validate_blob_url(&request.url)?;
    probe_remote_blob(&state, &url, VOICE_REMOTE_TYPES).await?;

    let record = VoiceSampleRecord::new(
        &subject_id,
        BlobRef::Http {
            url: url.to_string(),
        },
    );
    state.db.insert_voice_sample(&record)?;

    state
        .dispatcher
        .enqueue_voice(&subject_id, record.file_ref.clone())?;
    Ok((StatusCode::ACCEPTED, Json(QueuedResponse::queued())))
}

/// Submit a face sample as a direct multipart upload: exactly three JPEG
/// fields `front`, `left`, `right`.
#[utoipa::path(
    post,
    path = "/v1/subjects/{subject_id}/face",
    tag = "Enrollment",
    params(("subject_id" = String, Path, description = "Subject identifier")),
    responses(
        (status = 202, description = "Samples stored, vectorization queued", body = QueuedResponse),
        (status = 400, description = "Malformed id, missing image, or wrong content type"),
        (status = 404, description = "Unknown subject"),
        (status = 409, description = "Face sample already enrolled")
    )
)]
pub async fn submit_face(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    let subject_id = parse_subject_id(&subject_id)?;
    ensure_subject_exists(&state, &subject_id)?;
    if state.db.has_face_sample(&subject_id)? {
        return Err(ApiError::conflict("face sample already enrolled"));
    }

    let mut fields = collect_upload_fields(&mut multipart, FACE_UPLOAD_TYPES).await?;

    let mut refs = Vec::with_capacity(3);
    let mut keys = Vec::with_capacity(3);
    for name in ["front", "left", "right"] {
        let bytes = fields
            .remove(name)
            .ok_or_else(|| ApiError::bad_request(format!("missing face image field: {name}")))?;
        let file_name = format!("{name}-{}.jpg.enc", uuid::Uuid::new_v4());
        let (blob_ref, key) = encrypt_and_store(&state, &subject_id, &file_name, &bytes)?;
        refs.push(blob_ref);
        keys.push(key);
    }

    let record = FaceSampleRecord::new(
        &subject_id,
        refs[0].clone(),
        refs[1].clone(),
        refs[2].clone(),
    );
    if let Err(e) = state.db.insert_face_sample(&record) {
        for key in &keys {
            let _ = state.content.remove(key);
        }
        return Err(e.into());
    }

    state.dispatcher.enqueue_face(
        &subject_id,
        [refs[0].clone(), refs[1].clone(), refs[2].clone()],
    )?;
    Ok((StatusCode::ACCEPTED, Json(QueuedResponse::queued())))
}

/// Submit a face sample by reference: exactly three encrypted image URLs.
#[utoipa::path(
    post,
    path = "/v1/subjects/{subject_id}/face/fetch",
    tag = "Enrollment",
    params(("subject_id" = String, Path, description = "Subject identifier")),
    request_body = FaceFetchRequest,
    responses(
        (status = 202, description = "References recorded, vectorization queued", body = QueuedResponse),
        (status = 400, description = "Malformed id or blob URL"),
        (status = 404, description = "Unknown subject"),
        (status = 409, description = "Face sample already enrolled"),
        (status = 422, description = "A blob is unreachable or of unexpected type")
    )
)]
pub async fn submit_face_fetch(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    Json(request): Json<FaceFetchRequest>,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    let subject_id = parse_subject_id(&subject_id)?;
    ensure_subject_exists(&state, &subject_id)?;
    if state.db.has_face_sample(&subject_id)? {
        return Err(ApiError::conflict("face sample already enrolled"));
    }

    let mut refs = Vec::with_capacity(3);
    for raw in [&request.front_url, &request.left_url, &request.right_url] {
        let url = validate_blob_url(raw)?;
        probe_remote_blob(&state, &url, FACE_REMOTE_TYPES).await?;
        refs.push(BlobRef::Http {
            url: url.to_string(),
        });
    }

    let record = FaceSampleRecord::new(
        &subject_id,
        refs[0].clone(),
        refs[1].clone(),
        refs[2].clone(),
    );
    state.db.insert_face_sample(&record)?;

    state.dispatcher.enqueue_face(
        &subject_id,
        [refs[0].clone(), refs[1].clone(), refs[2].clone()],
    )?;
    Ok((StatusCode::ACCEPTED, Json(QueuedResponse::queued())))
}

// =============================================================================
// Helpers
// =============================================================================

fn ensure_subject_exists(state: &AppState, subject_id: &str) -> Result<(), ApiError> {
    match state.db.get_subject(subject_id)? {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found(format!("subject {subject_id}"))),
    }
}

/// Drain the multipart stream into name → bytes, validating each field's
/// content type against the allowlist.
async fn collect_upload_fields(
    multipart: &mut Multipart,
    allowed: &[&str],
) -> Result<HashMap<String, Bytes>, ApiError> {
    let mut fields = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !allowed.contains(&content_type.as_str()) {
            return Err(ApiError::bad_request(format!(
                "field {name} has content type {content_type:?}, expected one of {allowed:?}"
            )));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        fields.insert(name, bytes);
    }
    Ok(fields)
}

/// Encrypt an uploaded blob and place it in the content store.
fn encrypt_and_store(
    state: &AppState,
    subject_id: &str,
    file_name: &str,
    plaintext: &[u8],
) -> Result<(BlobRef, String), ApiError> {
    let encrypted = state
        .crypto
        .encrypt(plaintext)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let key = state.content.write(subject_id, file_name, &encrypted)?;
    Ok((BlobRef::Store { key: key.clone() }, key))
}

fn validate_blob_url(raw: &str) -> Result<Url, ApiError> {
    let url = Url::parse(raw).map_err(|e| ApiError::bad_request(format!("invalid blob URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::bad_request(format!(
            "unsupported blob URL scheme: {}",
            url.scheme()
        )));
    }
    Ok(url)
}

/// Verify a referenced blob is reachable and of an acceptable type before
/// committing any row. A failure here leaves no sample behind.
async fn probe_remote_blob(
    state: &AppState,
    url: &Url,
    allowed: &[&str],
) -> Result<(), ApiError> {
    let response = state
        .http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| ApiError::bad_upload(format!("blob unreachable: {e}")))?
        .error_for_status()
        .map_err(|e| ApiError::bad_upload(format!("blob fetch rejected: {e}")))?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    if !allowed.contains(&content_type.as_str()) {
        return Err(ApiError::bad_upload(format!(
            "blob has content type {content_type:?}, expected one of {allowed:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;

    #[tokio::test]
    async fn fetch_submission_with_unreachable_blob_leaves_no_row() {
        let (state, mut rx, _dir) = test_state();
        let subject = crate::storage::Subject::new();
        state.db.create_subject(&subject).unwrap();

        let err = submit_voice_fetch(
            State(state.clone()),
            Path(subject.subject_id.clone()),
            Json(VoiceFetchRequest {
                // Closed port: connection refused.
                url: "http://127.0.0.1:9/voice.wav.enc".into(),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!state.db.has_voice_sample(&subject.subject_id).unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fetch_submission_rejects_non_http_schemes() {
        let (state, _rx, _dir) = test_state();
        let subject = crate::storage::Subject::new();
        state.db.create_subject(&subject).unwrap();

        let err = submit_voice_fetch(
            State(state),
            Path(subject.subject_id),
            Json(VoiceFetchRequest {
                url: "file:///etc/passwd".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn fetch_submission_for_unknown_subject_is_not_found() {
        let (state, _rx, _dir) = test_state();

        let err = submit_voice_fetch(
            State(state),
            Path("00000000-0000-0000-0000-000000000001".into()),
            Json(VoiceFetchRequest {
                url: "http://127.0.0.1:9/voice.wav.enc".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn blob_url_validation() {
        assert!(validate_blob_url("https://blobs.example/a.enc").is_ok());
        assert!(validate_blob_url("not a url").is_err());
        assert!(validate_blob_url("ftp://blobs.example/a.enc").is_err());
    }
}
