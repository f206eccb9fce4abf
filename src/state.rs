// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::config::AppConfig;
use crate::crypto::EncryptionService;
use crate::storage::{ContentStore, EnrollDatabase};
use crate::worker::dispatcher::JobDispatcher;

/// Shared gateway state. Cheap to clone; all heavy members are behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<EnrollDatabase>,
    pub content: Arc<ContentStore>,
    pub crypto: Arc<EncryptionService>,
    pub dispatcher: JobDispatcher,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<EnrollDatabase>,
        content: Arc<ContentStore>,
        crypto: Arc<EncryptionService>,
        dispatcher: JobDispatcher,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            db,
            content,
            crypto,
            dispatcher,
            http,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use url::Url;
    use zeroize::Zeroizing;

    use crate::config::LogFormat;
    use crate::storage::StoragePaths;

    use super::*;

    /// Full application state against a temp directory, plus the dispatch
    /// receiver so tests can observe (or drive) enqueued jobs.
    pub(crate) fn test_state() -> (
        AppState,
        mpsc::UnboundedReceiver<String>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let paths = StoragePaths::new(dir.path());

        let config = AppConfig {
            data_dir: dir.path().to_path_buf(),
            host: "127.0.0.1".into(),
            port: 0,
            master_key: Zeroizing::new([7u8; 32]),
            key_is_ephemeral: true,
            // Nothing listens on port 9; tests that need the embedder inject
            // a scripted vectorizer instead.
            embedder_url: Url::parse("http://127.0.0.1:9").unwrap(),
            api_base_url: "http://127.0.0.1:9".into(),
            greeting_base_url: "http://127.0.0.1:9/greetings".into(),
            fetch_timeout: Duration::from_secs(2),
            worker_concurrency: 1,
            job_max_attempts: 3,
            job_retry_base: Duration::from_secs(1),
            job_deadline: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(5),
            log_format: LogFormat::Pretty,
        };

        let db = Arc::new(EnrollDatabase::open(&paths.database_file()).unwrap());
        let content = Arc::new(ContentStore::new(paths));
        content.initialize().unwrap();
        let crypto = Arc::new(EncryptionService::new(config.master_key.clone()));
        let (dispatcher, rx) = JobDispatcher::new(db.clone());
        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .unwrap();

        let state = AppState::new(Arc::new(config), db, content, crypto, dispatcher, http);
        (state, rx, dir)
    }
}
