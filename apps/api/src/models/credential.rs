use serde::Deserialize;
use serde_json::{Map, Value};

/// One record of the credential lookup document.
///
/// Only `email` and `password` take part in matching; everything else is
/// profile data copied into the session on a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialRecord {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl CredentialRecord {
    /// Exact, case-sensitive match on both fields. Records missing either
    /// field never match.
    pub fn matches(&self, email: &str, password: &str) -> bool {
        self.email.as_deref() == Some(email) && self.password.as_deref() == Some(password)
    }
}

/// Accepted shapes of the lookup document: a bare array or `{ "users": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CredentialDocument {
    List(Vec<CredentialRecord>),
    Wrapped { users: Vec<CredentialRecord> },
}

impl CredentialDocument {
    pub fn into_records(self) -> Vec<CredentialRecord> {
        match self {
            CredentialDocument::List(records) => records,
            CredentialDocument::Wrapped { users } => users,
        }
    }
}
