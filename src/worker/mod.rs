// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Biometric Worker Pool
//!
//! Workers pull jobs from the dispatch channel and drive each through
//! fetch → decrypt → vectorize → persist → notify. Decrypted media only
//! ever exists inside a per-job temporary directory that is removed on
//! every exit path. No database row is written before the persist step,
//! and no database transaction is held while vectorization runs.
//!
//! Failure handling: transient fetch errors go back through the queue's
//! redelivery policy; decryption and vectorizer failures are fatal for the
//! job and dead-letter immediately. Completion callbacks are best-effort:
//! a lost callback is self-healing because status is recomputed from the
//! store, not from notifications.

pub mod dispatcher;
pub mod vectorizer;

use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::crypto::{CryptoError, EncryptionService};
use crate::models::{BlobRef, CallbackPayload, JobKind};
use crate::storage::{
    ContentStore, DeadLetterLog, DeadLetterReason, EnrollDatabase, JobRecord, StorageError,
};

use self::dispatcher::{fail_job, RetryPolicy};
use self::vectorizer::{encode_vector, mean_combine, Vectorize, VectorizeError};

/// Error from one job attempt.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("blob fetch failed: {0}")]
    TransientFetch(String),

    #[error(transparent)]
    Decryption(#[from] CryptoError),

    #[error(transparent)]
    Vectorization(#[from] VectorizeError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed job: {0}")]
    Malformed(String),
}

impl JobError {
    /// Fatal errors skip redelivery and dead-letter immediately:
    /// bad ciphertext will not become good data on redelivery, and a
    /// refusing vectorizer must never degrade to a placeholder vector.
    pub fn fatal_reason(&self) -> Option<DeadLetterReason> {
        match self {
            JobError::Decryption(CryptoError::DecryptionFailed) => {
                Some(DeadLetterReason::DecryptionFailed)
            }
            JobError::Vectorization(VectorizeError::Io(_)) => None,
            JobError::Vectorization(_) => Some(DeadLetterReason::VectorizationUnavailable),
            _ => None,
        }
    }
}

/// Shared dependencies of the worker pool.
pub struct WorkerContext<V: Vectorize> {
    pub db: Arc<EnrollDatabase>,
    pub content: Arc<ContentStore>,
    pub crypto: Arc<EncryptionService>,
    pub vectorizer: V,
    pub http: Client,
    pub deadletter: DeadLetterLog,
    pub policy: RetryPolicy,
    /// Gateway base URL for completion callbacks.
    pub api_base: String,
}

/// Pool of independent workers, each processing one job at a time.
pub struct WorkerPool<V: Vectorize> {
    ctx: Arc<WorkerContext<V>>,
    rx: mpsc::UnboundedReceiver<String>,
    concurrency: usize,
}

impl<V: Vectorize> WorkerPool<V> {
    pub fn new(
        ctx: Arc<WorkerContext<V>>,
        rx: mpsc::UnboundedReceiver<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            ctx,
            rx,
            concurrency: concurrency.max(1),
        }
    }

    /// Run the pool until the cancellation token is triggered or the
    /// dispatch channel closes.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(concurrency = self.concurrency, "biometric worker pool starting");
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("biometric worker pool shutting down");
                    return;
                }
                next = self.rx.recv() => {
                    let Some(job_id) = next else {
                        info!("dispatch channel closed, worker pool stopping");
                        return;
                    };
                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        return;
                    };
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        run_job(ctx, job_id).await;
                        drop(permit);
                    });
                }
            }
        }
    }
}

/// Claim and process one job, then record the outcome.
pub(crate) async fn run_job<V: Vectorize>(ctx: Arc<WorkerContext<V>>, job_id: String) {
    let deadline = Utc::now() + chrono::Duration::seconds(ctx.policy.deadline.as_secs() as i64);
    let job = match ctx.db.claim_job(&job_id, deadline) {
        Ok(Some(job)) => job,
        Ok(None) => {
            // Duplicate wakeup or already-terminal job.
            debug!(job_id = %job_id, "job not claimable, skipping");
            return;
        }
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "failed to claim job");
            return;
        }
    };

    match process_job(&ctx, &job).await {
        Ok(()) => {
            if let Err(e) = ctx.db.delete_job(&job.job_id) {
                warn!(job_id = %job.job_id, error = %e, "failed to remove completed job");
            }
            info!(
                job_id = %job.job_id,
                kind = %job.kind,
                subject_id = %job.subject_id,
                "job completed"
            );
            notify_gateway(&ctx, &job).await;
        }
        Err(e) => {
            if let Err(store_err) = fail_job(
                &ctx.db,
                &ctx.deadletter,
                &ctx.policy,
                &job,
                &e.to_string(),
                e.fatal_reason(),
            ) {
                error!(job_id = %job.job_id, error = %store_err, "failed to record job failure");
            }
        }
    }
}

/// One attempt: fetch → decrypt → vectorize → persist.
async fn process_job<V: Vectorize>(
    ctx: &WorkerContext<V>,
    job: &JobRecord,
) -> Result<(), JobError> {
    // Decrypted artifacts live only in this directory; dropping it removes
    // them on success and on every error return alike.
    let workspace = tempfile::tempdir()?;

    match job.kind {
        JobKind::Voice => {
            let [blob_ref] = job.blob_refs.as_slice() else {
                return Err(JobError::Malformed(format!(
                    "voice job carries {} blob refs",
                    job.blob_refs.len()
                )));
            };
            let encrypted = fetch_blob(ctx, blob_ref).await?;
            let plaintext = ctx.crypto.decrypt(&encrypted)?;
            let wav_path = workspace.path().join("voice.wav");
            tokio::fs::write(&wav_path, &plaintext).await?;

            let vector = ctx.vectorizer.embed_voice(&wav_path).await?;
            ctx.db
                .append_voice_print(&job.subject_id, &encode_vector(&vector))?;
        }
        JobKind::Face => {
            let [front, left, right] = job.blob_refs.as_slice() else {
                return Err(JobError::Malformed(format!(
                    "face job carries {} blob refs",
                    job.blob_refs.len()
                )));
            };

            let mut vectors = Vec::with_capacity(3);
            for (blob_ref, name) in [
                (front, "front.jpg"),
                (left, "left.jpg"),
                (right, "right.jpg"),
            ] {
                let encrypted = fetch_blob(ctx, blob_ref).await?;
                let plaintext = ctx.crypto.decrypt(&encrypted)?;
                let image_path = workspace.path().join(name);
                tokio::fs::write(&image_path, &plaintext).await?;
                vectors.push(ctx.vectorizer.embed_image(&image_path).await?);
            }

            let mean = mean_combine(&vectors)?;
            ctx.db
                .append_face_print(&job.subject_id, &encode_vector(&mean))?;
        }
    }
    Ok(())
}

/// Retrieve an encrypted blob. Remote fetches and content-store reads both
/// surface as transient failures for the redelivery policy.
async fn fetch_blob<V: Vectorize>(
    ctx: &WorkerContext<V>,
    blob_ref: &BlobRef,
) -> Result<Vec<u8>, JobError> {
    match blob_ref {
        BlobRef::Http { url } => {
            let response = ctx
                .http
                .get(url.as_str())
                .send()
                .await
                .map_err(|e| JobError::TransientFetch(e.to_string()))?
                .error_for_status()
                .map_err(|e| JobError::TransientFetch(e.to_string()))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| JobError::TransientFetch(e.to_string()))?;
            Ok(bytes.to_vec())
        }
        BlobRef::Store { key } => ctx
            .content
            .read(key)
            .map_err(|e| JobError::TransientFetch(e.to_string())),
    }
}

/// Best-effort completion callback to the gateway. The print is already
/// durable; a failed callback is logged and nothing else.
async fn notify_gateway<V: Vectorize>(ctx: &WorkerContext<V>, job: &JobRecord) {
    let url = format!(
        "{}/internal/{}_done",
        ctx.api_base.trim_end_matches('/'),
        job.kind
    );
    let payload = CallbackPayload {
        subject_id: job.subject_id.clone(),
    };

    match ctx.http.post(url.as_str()).json(&payload).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(url = %url, subject_id = %job.subject_id, "completion callback delivered");
        }
        Ok(response) => {
            warn!(url = %url, status = %response.status(), "completion callback rejected");
        }
        Err(e) => {
            warn!(url = %url, error = %e, "completion callback failed");
        }
    }
}
