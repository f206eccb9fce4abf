// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Enrollment status derivation.
//!
//! Status is a pure function of stored state, recomputed on every query:
//! each present sample contributes 50 percent, and an active subject is
//! `complete` at 100 regardless of the raw sum. The denormalized status
//! cache is advisory and never consulted here.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Aggregate enrollment state of a subject.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentState {
    Pending,
    Processing,
    Complete,
}

/// Status query response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: EnrollmentState,
    pub percent: u8,
}

/// Derive `{state, percent}` from sample presence and the active flag.
pub fn derive_status(active: bool, has_voice: bool, has_face: bool) -> StatusResponse {
    if active {
        return StatusResponse {
            status: EnrollmentState::Complete,
            percent: 100,
        };
    }

    let percent = 50 * u8::from(has_voice) + 50 * u8::from(has_face);
    StatusResponse {
        status: if percent > 0 {
            EnrollmentState::Processing
        } else {
            EnrollmentState::Pending
        },
        percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_fifty_per_modality() {
        assert_eq!(derive_status(false, false, false).percent, 0);
        assert_eq!(derive_status(false, true, false).percent, 50);
        assert_eq!(derive_status(false, false, true).percent, 50);
        assert_eq!(derive_status(false, true, true).percent, 100);
    }

    #[test]
    fn state_transitions_with_samples() {
        assert_eq!(
            derive_status(false, false, false).status,
            EnrollmentState::Pending
        );
        assert_eq!(
            derive_status(false, true, false).status,
            EnrollmentState::Processing
        );
        // Both samples present but not yet confirmed stays processing.
        assert_eq!(
            derive_status(false, true, true).status,
            EnrollmentState::Processing
        );
    }

    #[test]
    fn active_forces_complete_at_100() {
        for (voice, face) in [(false, false), (true, false), (false, true), (true, true)] {
            let status = derive_status(true, voice, face);
            assert_eq!(status.status, EnrollmentState::Complete);
            assert_eq!(status.percent, 100);
        }
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&derive_status(false, true, false)).unwrap();
        assert_eq!(json, r#"{"status":"processing","percent":50}"#);
    }
}
