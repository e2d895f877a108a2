use std::path::PathBuf;

use anyhow::{bail, Context, Result};

const DEFAULT_CREDENTIALS_SOURCE: &str = "fixtures/users.json";
const DEFAULT_SNAPSHOT_PATH: &str = ".session/storage.json";
const DEFAULT_STORAGE_KEY: &str = "user";

/// Where the session snapshot is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotBackend {
    Memory,
    File(PathBuf),
    Redis(String),
}

/// Where the credential lookup document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsSource {
    File(PathBuf),
    Url(String),
}

impl CredentialsSource {
    fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            CredentialsSource::Url(raw.to_string())
        } else {
            CredentialsSource::File(PathBuf::from(raw))
        }
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if a selected backend is missing its settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials_source: CredentialsSource,
    pub snapshot_backend: SnapshotBackend,
    /// Storage key holding the serialized session.
    pub storage_key: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let snapshot_backend = match var("SNAPSHOT_BACKEND", "file").to_ascii_lowercase().as_str() {
            "memory" => SnapshotBackend::Memory,
            "file" => SnapshotBackend::File(PathBuf::from(var("SNAPSHOT_PATH", DEFAULT_SNAPSHOT_PATH))),
            "redis" => SnapshotBackend::Redis(require(&lookup, "REDIS_URL")?),
            other => bail!("SNAPSHOT_BACKEND must be one of memory, file, redis (got '{other}')"),
        };

        let storage_key = var("SESSION_STORAGE_KEY", DEFAULT_STORAGE_KEY);
        if storage_key.trim().is_empty() {
            bail!("SESSION_STORAGE_KEY must not be empty");
        }

        Ok(Config {
            credentials_source: CredentialsSource::parse(&var(
                "CREDENTIALS_SOURCE",
                DEFAULT_CREDENTIALS_SOURCE,
            )),
            snapshot_backend,
            storage_key,
            port: var("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: var("RUST_LOG", "info"),
        })
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
