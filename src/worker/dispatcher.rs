// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Job Dispatch & Redelivery
//!
//! The queue is a durable job table plus an in-process wake channel.
//! `enqueue` persists the record and sends a wakeup; it never blocks the
//! request path on worker availability. Delivery is at-least-once:
//!
//! 1. A periodic sweep re-wakes `queued` jobs whose wakeup was lost (e.g.
//!    the process restarted between persist and pickup).
//! 2. `in_flight` jobs past their deadline count as lost attempts.
//! 3. `failed` jobs are redelivered after an exponential backoff, up to
//!    `max_attempts`, then dead-lettered with an operator-visible record.
//!
//! No ordering is guaranteed across subjects, nor between the voice and
//! face job of one subject.
//!
//! ## Shutdown
//!
//! The sweeper uses `tokio_util::sync::CancellationToken` for graceful
//! shutdown, the same pattern as the worker pool.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::{BlobRef, JobKind};
use crate::storage::{
    DeadLetterEntry, DeadLetterLog, DeadLetterReason, EnrollDatabase, JobRecord, JobStatus,
    StorageResult,
};

/// Upper bound on the redelivery backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(15 * 60);

/// Redelivery policy for dispatched jobs.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delivery attempts before a job is dead-lettered.
    pub max_attempts: u32,
    /// Base delay of the exponential backoff.
    pub retry_base: Duration,
    /// How long an in-flight attempt may run before it counts as lost.
    pub deadline: Duration,
}

impl RetryPolicy {
    /// Backoff before redelivering after the given number of attempts:
    /// `retry_base * 2^(attempts-1)`, capped.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let factor = 1u32 << attempts.saturating_sub(1).min(16);
        (self.retry_base * factor).min(MAX_BACKOFF)
    }
}

/// Handle used by the gateway to dispatch jobs. Cheap to clone.
#[derive(Clone)]
pub struct JobDispatcher {
    db: Arc<EnrollDatabase>,
    tx: mpsc::UnboundedSender<String>,
}

impl JobDispatcher {
    /// Create a dispatcher and the wake receiver the worker pool consumes.
    pub fn new(db: Arc<EnrollDatabase>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { db, tx }, rx)
    }

    /// Sender clone for components that re-wake jobs (the sweeper).
    pub fn wake_sender(&self) -> mpsc::UnboundedSender<String> {
        self.tx.clone()
    }

    /// Dispatch a voice vectorization job. Returns the job id.
    pub fn enqueue_voice(&self, subject_id: &str, blob_ref: BlobRef) -> StorageResult<String> {
        self.enqueue(JobKind::Voice, subject_id, vec![blob_ref])
    }

    /// Dispatch a face vectorization job covering all three images.
    pub fn enqueue_face(&self, subject_id: &str, blob_refs: [BlobRef; 3]) -> StorageResult<String> {
        self.enqueue(JobKind::Face, subject_id, blob_refs.into())
    }

    fn enqueue(
        &self,
        kind: JobKind,
        subject_id: &str,
        blob_refs: Vec<BlobRef>,
    ) -> StorageResult<String> {
        let job = JobRecord::new(kind, subject_id, blob_refs);
        self.db.put_job(&job)?;

        // A dropped receiver is not an error: the durable record is
        // redelivered by the sweep.
        let _ = self.tx.send(job.job_id.clone());

        debug!(job_id = %job.job_id, kind = %kind, subject_id, "job enqueued");
        Ok(job.job_id)
    }
}

/// Record a failed attempt: backoff-and-retry for transient errors,
/// dead-letter for fatal ones or once delivery attempts are exhausted.
pub(crate) fn fail_job(
    db: &EnrollDatabase,
    deadletter: &DeadLetterLog,
    policy: &RetryPolicy,
    job: &JobRecord,
    error_msg: &str,
    fatal: Option<DeadLetterReason>,
) -> StorageResult<()> {
    let mut job = job.clone();
    job.last_error = Some(error_msg.to_string());
    job.deadline_at = None;
    job.updated_at = Utc::now();

    let reason = fatal.or_else(|| {
        (job.attempts >= policy.max_attempts).then_some(DeadLetterReason::AttemptsExhausted)
    });

    match reason {
        Some(reason) => {
            job.status = JobStatus::Dead;
            job.next_attempt_at = None;
            db.put_job(&job)?;
            deadletter.append(&DeadLetterEntry::new(
                &job.job_id,
                job.kind,
                &job.subject_id,
                reason,
                job.attempts,
                error_msg,
            ))?;
            error!(
                job_id = %job.job_id,
                kind = %job.kind,
                subject_id = %job.subject_id,
                attempts = job.attempts,
                error = error_msg,
                "job dead-lettered"
            );
        }
        None => {
            let delay = policy.backoff(job.attempts);
            job.status = JobStatus::Failed;
            job.next_attempt_at = Some(job.updated_at + chrono::Duration::seconds(delay.as_secs() as i64));
            db.put_job(&job)?;
            warn!(
                job_id = %job.job_id,
                attempts = job.attempts,
                retry_in_secs = delay.as_secs(),
                error = error_msg,
                "job attempt failed, will redeliver"
            );
        }
    }
    Ok(())
}

/// Background sweep that enforces the redelivery policy.
pub struct JobSweeper {
    db: Arc<EnrollDatabase>,
    deadletter: DeadLetterLog,
    tx: mpsc::UnboundedSender<String>,
    policy: RetryPolicy,
    sweep_interval: Duration,
}

impl JobSweeper {
    pub fn new(
        db: Arc<EnrollDatabase>,
        deadletter: DeadLetterLog,
        tx: mpsc::UnboundedSender<String>,
        policy: RetryPolicy,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            db,
            deadletter,
            tx,
            policy,
            sweep_interval,
        }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "job redelivery sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("job redelivery sweeper shutting down");
                return;
            }

            if let Err(e) = self.sweep_step() {
                warn!(error = %e, "job sweep failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("job redelivery sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep over the job table.
    pub fn sweep_step(&self) -> StorageResult<()> {
        let now = Utc::now();
        let grace = chrono::Duration::seconds(self.sweep_interval.as_secs().max(1) as i64);

        for job in self.db.list_jobs()? {
            match job.status {
                JobStatus::Queued => {
                    // Re-wake jobs whose wakeup predates the last sweep; a
                    // duplicate wakeup loses at claim time.
                    if job.updated_at + grace < now {
                        let _ = self.tx.send(job.job_id.clone());
                        debug!(job_id = %job.job_id, "re-waking queued job");
                    }
                }
                JobStatus::InFlight => {
                    if job.deadline_at.is_some_and(|deadline| deadline < now) {
                        fail_job(
                            &self.db,
                            &self.deadletter,
                            &self.policy,
                            &job,
                            "in-flight deadline exceeded",
                            None,
                        )?;
                    }
                }
                JobStatus::Failed => {
                    if job.next_attempt_at.is_some_and(|due| due <= now) {
                        let mut requeued = job.clone();
                        requeued.status = JobStatus::Queued;
                        requeued.next_attempt_at = None;
                        requeued.updated_at = now;
                        self.db.put_job(&requeued)?;
                        let _ = self.tx.send(requeued.job_id.clone());
                        info!(
                            job_id = %requeued.job_id,
                            attempts = requeued.attempts,
                            "redelivering failed job"
                        );
                    }
                }
                JobStatus::Dead => {}
            }
        }
        Ok(())
    }
}
