// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Enroll - Biometric Enrollment Service
//!
//! This crate provides the asynchronous voice/face enrollment pipeline:
//! encrypted media ingest, durable job dispatch to a vectorization worker
//! pool, embedding persistence, and derived enrollment status.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `crypto` - Media encryption at rest (XChaCha20-Poly1305)
//! - `storage` - Record database (redb) and encrypted media content store
//! - `worker` - Job dispatch, redelivery policy, and the worker pool
//! - `status` - Enrollment status derivation

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod state;
pub mod status;
pub mod storage;
pub mod worker;
