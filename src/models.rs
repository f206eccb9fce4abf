// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response data structures used by the REST API, plus the two
//! small types shared across gateway, queue, and worker: [`BlobRef`] (where
//! an encrypted media blob lives) and [`JobKind`] (which enrollment track a
//! job belongs to). All types derive `Serialize`, `Deserialize`, and
//! `ToSchema` for automatic JSON handling and OpenAPI documentation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Shared Pipeline Types
// =============================================================================

/// Reference to an encrypted media blob.
///
/// `Store` keys point into the local content store (direct uploads, already
/// encrypted by the gateway); `Http` URLs point at externally hosted
/// encrypted blobs that the worker fetches itself.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlobRef {
    Http { url: String },
    Store { key: String },
}

/// Enrollment modality a job vectorizes. The two tracks are independent
/// pipelines with no completion-order guarantee between them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Voice,
    Face,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Voice => write!(f, "voice"),
            JobKind::Face => write!(f, "face"),
        }
    }
}

// =============================================================================
// Subject Models
// =============================================================================

/// Response after initializing a subject.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubjectCreatedResponse {
    /// Generated stable subject identifier (UUID).
    pub subject_id: String,
}

/// Display preferences attached to a subject. Upserts are idempotent.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrefsRequest {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Preferred greeting phrase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
    /// Preferred reminder delivery channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_type: Option<String>,
}

/// Response after completing enrollment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompleteResponse {
    /// Reference to the externally generated greeting audio artifact.
    pub audio_url: String,
}

// =============================================================================
// Submission Models
// =============================================================================

/// Acknowledgment that a sample was accepted and a job enqueued.
/// Vectorization completes asynchronously; poll the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueuedResponse {
    pub message: String,
}

impl QueuedResponse {
    pub fn queued() -> Self {
        Self {
            message: "queued".to_string(),
        }
    }
}

/// Submit a voice sample by reference to an externally hosted encrypted blob.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VoiceFetchRequest {
    /// HTTP(S) URL of the encrypted voice recording.
    pub url: String,
}

/// Submit a face sample by reference: exactly three encrypted images.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FaceFetchRequest {
    /// HTTP(S) URL of the encrypted front-facing image.
    pub front_url: String,
    /// HTTP(S) URL of the encrypted left-profile image.
    pub left_url: String,
    /// HTTP(S) URL of the encrypted right-profile image.
    pub right_url: String,
}

// =============================================================================
// Internal Callback Models
// =============================================================================

/// Worker-to-gateway completion notification payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CallbackPayload {
    pub subject_id: String,
}

/// Generic acknowledgment body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_ref_serializes_tagged() {
        let store = BlobRef::Store {
            key: "abc/voice.wav.enc".into(),
        };
        assert_eq!(
            serde_json::to_string(&store).unwrap(),
            r#"{"type":"store","key":"abc/voice.wav.enc"}"#
        );

        let http: BlobRef =
            serde_json::from_str(r#"{"type":"http","url":"https://blobs/x.enc"}"#).unwrap();
        assert_eq!(
            http,
            BlobRef::Http {
                url: "https://blobs/x.enc".into()
            }
        );
    }

    #[test]
    fn job_kind_display_matches_wire_names() {
        assert_eq!(JobKind::Voice.to_string(), "voice");
        assert_eq!(JobKind::Face.to_string(), "face");
    }
}
