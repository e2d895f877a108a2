//! Credential lookup: the static resource logins are checked against.
//!
//! The resource is a JSON document of user records. It is read whole on every
//! login attempt; nothing is cached.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::CredentialsSource;
use crate::models::credential::{CredentialDocument, CredentialRecord};

pub mod http;

pub use http::HttpCredentialSource;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Lookup returned status {status}")]
    Status { status: u16 },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch_records(&self) -> Result<Vec<CredentialRecord>, LookupError>;
}

/// Parses either accepted document shape into records.
pub fn parse_document(bytes: &[u8]) -> Result<Vec<CredentialRecord>, LookupError> {
    let document: CredentialDocument = serde_json::from_slice(bytes)?;
    Ok(document.into_records())
}

/// Reads the lookup document from a local file.
#[derive(Debug, Clone)]
pub struct FileCredentialSource {
    path: PathBuf,
}

impl FileCredentialSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CredentialSource for FileCredentialSource {
    async fn fetch_records(&self) -> Result<Vec<CredentialRecord>, LookupError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| LookupError::Io {
                path: self.path.clone(),
                source,
            })?;
        let records = parse_document(&bytes)?;
        debug!("Read {} credential record(s) from {}", records.len(), self.path.display());
        Ok(records)
    }
}

/// Fixed in-memory records.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialSource {
    records: Vec<CredentialRecord>,
}

impl StaticCredentialSource {
    pub fn new(records: Vec<CredentialRecord>) -> Self {
        Self { records }
    }

    /// Builds the source from a JSON document.
    pub fn from_json(document: &str) -> Result<Self, LookupError> {
        Ok(Self::new(parse_document(document.as_bytes())?))
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn fetch_records(&self) -> Result<Vec<CredentialRecord>, LookupError> {
        Ok(self.records.clone())
    }
}

pub fn create_source(source: &CredentialsSource) -> Arc<dyn CredentialSource> {
    match source {
        CredentialsSource::File(path) => {
            info!("Credential lookup: file {}", path.display());
            Arc::new(FileCredentialSource::new(path.clone()))
        }
        CredentialsSource::Url(url) => {
            info!("Credential lookup: {url}");
            Arc::new(HttpCredentialSource::new(url.clone()))
        }
    }
}

/// Linear scan; the first exact match wins. Duplicate emails are not
/// rejected, later records with the same pair are unreachable.
pub fn find_match<'a>(
    records: &'a [CredentialRecord],
    email: &str,
    password: &str,
) -> Option<&'a CredentialRecord> {
    records.iter().find(|record| record.matches(email, password))
}
