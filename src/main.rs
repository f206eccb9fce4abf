// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relational_enroll_server::{
    api::router,
    config::{AppConfig, LogFormat},
    crypto::EncryptionService,
    state::AppState,
    storage::{ContentStore, DeadLetterLog, EnrollDatabase, StoragePaths},
    worker::{
        dispatcher::{JobDispatcher, JobSweeper, RetryPolicy},
        vectorizer::RemoteVectorizer,
        WorkerContext, WorkerPool,
    },
};

#[tokio::main]
async fn main() {
    // Configuration errors (including missing key material) abort startup;
    // nothing is generated or defaulted silently.
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    if config.key_is_ephemeral {
        warn!(
            "running with an ephemeral master key: media encrypted by this \
             process cannot be decrypted after a restart"
        );
    }

    // Storage
    let paths = StoragePaths::new(&config.data_dir);
    let db = Arc::new(
        EnrollDatabase::open(&paths.database_file()).expect("failed to open record database"),
    );
    let content = Arc::new(ContentStore::new(paths.clone()));
    content
        .initialize()
        .expect("failed to initialize content store");
    let crypto = Arc::new(EncryptionService::new(config.master_key.clone()));
    let deadletter = DeadLetterLog::new(paths);

    // Shared HTTP client: blob fetches, embedder calls, callbacks.
    let http = reqwest::Client::builder()
        .timeout(config.fetch_timeout)
        .build()
        .expect("failed to build HTTP client");

    let policy = RetryPolicy {
        max_attempts: config.job_max_attempts,
        retry_base: config.job_retry_base,
        deadline: config.job_deadline,
    };

    let (dispatcher, job_rx) = JobDispatcher::new(db.clone());
    let shutdown = CancellationToken::new();

    // Worker pool with the remote vectorization capability.
    let worker_ctx = Arc::new(WorkerContext {
        db: db.clone(),
        content: content.clone(),
        crypto: crypto.clone(),
        vectorizer: RemoteVectorizer::new(http.clone(), config.embedder_url.clone()),
        http: http.clone(),
        deadletter: deadletter.clone(),
        policy,
        api_base: config.api_base_url.clone(),
    });
    tokio::spawn(
        WorkerPool::new(worker_ctx, job_rx, config.worker_concurrency).run(shutdown.clone()),
    );

    // Redelivery sweep: re-wakes lost jobs, retires stale in-flight ones.
    let sweeper = JobSweeper::new(
        db.clone(),
        deadletter,
        dispatcher.wake_sender(),
        policy,
        config.sweep_interval,
    );
    tokio::spawn(sweeper.run(shutdown.clone()));

    // Gateway
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("failed to parse bind address");
    let state = AppState::new(Arc::new(config), db, content, crypto, dispatcher, http);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind server address");
    info!(%addr, "enrollment server listening (docs at /docs)");

    let shutdown_on_signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown_on_signal.cancel();
        })
        .await
        .expect("HTTP server failed");
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
