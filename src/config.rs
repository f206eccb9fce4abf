// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup into an explicit
//! [`AppConfig`] passed to constructors. A missing or malformed value fails
//! startup with a [`ConfigError`]; nothing is generated silently.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ENROLL_DATA_DIR` | Root directory for media, database, dead letters | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `ENROLL_MASTER_KEY` | Base64-encoded 256-bit media encryption key | Required |
//! | `ENROLL_EPHEMERAL_KEY` | `1` permits a generated per-process key (dev only) | unset |
//! | `EMBEDDER_URL` | Base URL of the vectorization endpoint | Required |
//! | `API_BASE_URL` | Base URL workers post completion callbacks to | `http://127.0.0.1:8080` |
//! | `GREETING_BASE_URL` | Base URL of external greeting audio artifacts | `http://127.0.0.1:8080/greetings` |
//! | `FETCH_TIMEOUT_SECS` | Remote blob fetch timeout | `30` |
//! | `WORKER_CONCURRENCY` | Max concurrently processed jobs | `4` |
//! | `JOB_MAX_ATTEMPTS` | Delivery attempts before dead-lettering | `5` |
//! | `JOB_RETRY_BASE_SECS` | Exponential backoff base between redeliveries | `5` |
//! | `JOB_DEADLINE_SECS` | In-flight deadline before a job counts as lost | `300` |
//! | `SWEEP_INTERVAL_SECS` | Redelivery sweep period | `10` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use base64ct::{Base64, Encoding};
use chacha20poly1305::aead::OsRng;
use rand_core::RngCore;
use url::Url;
use zeroize::Zeroizing;

/// Environment variable name for the data directory root.
pub const DATA_DIR_ENV: &str = "ENROLL_DATA_DIR";

/// Environment variable name for the base64 master key.
pub const MASTER_KEY_ENV: &str = "ENROLL_MASTER_KEY";

/// Environment variable name for the ephemeral-key escape hatch.
pub const EPHEMERAL_KEY_ENV: &str = "ENROLL_EPHEMERAL_KEY";

/// Environment variable name for the vectorization endpoint.
pub const EMBEDDER_URL_ENV: &str = "EMBEDDER_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "{MASTER_KEY_ENV} is not set; refusing to start without key material \
         (set {EPHEMERAL_KEY_ENV}=1 to run with a non-persistent key in development)"
    )]
    MissingKey,

    #[error("{MASTER_KEY_ENV} must be base64 for exactly 32 bytes")]
    InvalidKey,

    #[error("{EMBEDDER_URL_ENV} is not set; vectorization capability is required at startup")]
    MissingEmbedder,

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Application configuration, resolved once at startup.
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// 256-bit AEAD key for media at rest.
    pub master_key: Zeroizing<[u8; 32]>,
    /// True when the key was generated for this process only. Data encrypted
    /// under an ephemeral key is unrecoverable after restart.
    pub key_is_ephemeral: bool,
    pub embedder_url: Url,
    pub api_base_url: String,
    pub greeting_base_url: String,
    pub fetch_timeout: Duration,
    pub worker_concurrency: usize,
    pub job_max_attempts: u32,
    pub job_retry_base: Duration,
    pub job_deadline: Duration,
    pub sweep_interval: Duration,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let configured = env::var(MASTER_KEY_ENV).ok();
        let allow_ephemeral = env::var(EPHEMERAL_KEY_ENV).map(|v| v == "1").unwrap_or(false);
        let (master_key, key_is_ephemeral) =
            resolve_master_key(configured.as_deref(), allow_ephemeral)?;

        let embedder_raw = env::var(EMBEDDER_URL_ENV).map_err(|_| ConfigError::MissingEmbedder)?;
        let embedder_url = Url::parse(&embedder_raw).map_err(|e| ConfigError::InvalidValue {
            name: EMBEDDER_URL_ENV,
            reason: e.to_string(),
        })?;

        Ok(Self {
            data_dir: PathBuf::from(env_or(DATA_DIR_ENV, "/data")),
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", 8080)?,
            master_key,
            key_is_ephemeral,
            embedder_url,
            api_base_url: env_or("API_BASE_URL", "http://127.0.0.1:8080"),
            greeting_base_url: env_or("GREETING_BASE_URL", "http://127.0.0.1:8080/greetings"),
            fetch_timeout: Duration::from_secs(parse_env("FETCH_TIMEOUT_SECS", 30)?),
            worker_concurrency: parse_env("WORKER_CONCURRENCY", 4)?,
            job_max_attempts: parse_env("JOB_MAX_ATTEMPTS", 5)?,
            job_retry_base: Duration::from_secs(parse_env("JOB_RETRY_BASE_SECS", 5)?),
            job_deadline: Duration::from_secs(parse_env("JOB_DEADLINE_SECS", 300)?),
            sweep_interval: Duration::from_secs(parse_env("SWEEP_INTERVAL_SECS", 10)?),
            log_format: if env_or("LOG_FORMAT", "pretty") == "json" {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
        })
    }
}

/// Resolve the master key: configured base64 value, or a generated one when
/// the ephemeral escape hatch is explicitly enabled.
fn resolve_master_key(
    configured: Option<&str>,
    allow_ephemeral: bool,
) -> Result<(Zeroizing<[u8; 32]>, bool), ConfigError> {
    match configured {
        Some(encoded) => {
            let decoded = Base64::decode_vec(encoded.trim()).map_err(|_| ConfigError::InvalidKey)?;
            if decoded.len() != 32 {
                return Err(ConfigError::InvalidKey);
            }
            let mut key = Zeroizing::new([0u8; 32]);
            key.copy_from_slice(&decoded);
            Ok((key, false))
        }
        None if allow_ephemeral => {
            let mut key = Zeroizing::new([0u8; 32]);
            OsRng.fill_bytes(&mut *key);
            Ok((key, true))
        }
        None => Err(ConfigError::MissingKey),
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
