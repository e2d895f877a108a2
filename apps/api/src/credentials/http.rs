use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{parse_document, CredentialSource, LookupError};
use crate::models::credential::CredentialRecord;

/// Fetches the lookup document over HTTP(S). Single attempt, no timeout,
/// no retry: a failed fetch fails the login.
#[derive(Clone)]
pub struct HttpCredentialSource {
    client: Client,
    url: String,
}

impl HttpCredentialSource {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn fetch_records(&self) -> Result<Vec<CredentialRecord>, LookupError> {
        let response = self
            .client
            .get(&self.url)
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Credential lookup {} returned {}", self.url, status);
            return Err(LookupError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        let records = parse_document(&bytes)?;
        debug!("Fetched {} credential record(s) from {}", records.len(), self.url);
        Ok(records)
    }
}
