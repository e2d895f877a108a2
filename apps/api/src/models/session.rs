use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::credential::CredentialRecord;

/// Name of the credential field in lookup records and signup payloads.
pub const CREDENTIAL_FIELD: &str = "password";

/// Fields a signup payload may not set; the account defaults win.
const RESERVED_FIELDS: &[&str] = &[
    "id",
    "name",
    "email",
    CREDENTIAL_FIELD,
    "level",
    "experience",
    "streak",
    "totalPoints",
    "achievements",
    "createdAt",
];

/// Fields a patch may never touch.
const IMMUTABLE_FIELDS: &[&str] = &["id", CREDENTIAL_FIELD];

pub const INITIAL_LEVEL: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The signed-in identity plus its gamified career profile.
///
/// Serialized as a flat camelCase object. This is both the persisted snapshot
/// and the shape handed to readers, so it has no credential field; any
/// `password` key arriving through `extra` is dropped on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default = "initial_level")]
    pub level: u32,
    #[serde(default)]
    pub experience: u64,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub total_points: u64,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Profile fields without a dedicated slot (job title, goals, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Signup payload: identity fields plus any extra profile fields.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    /// Accepted for parity with the signup form, never stored.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

/// Top-level fields to shallow-merge into the active session.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SessionPatch(pub Map<String, Value>);

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }
}

fn initial_level() -> u32 {
    INITIAL_LEVEL
}

/// Identifiers are opaque strings; fixture data sometimes carries numbers.
fn opaque_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// Time-ordered identifier for newly created sessions.
pub fn generate_session_id() -> String {
    Uuid::now_v7().to_string()
}

impl Session {
    /// Builds the session for a matched lookup record, credential stripped.
    /// Records without an `id` get a generated one.
    pub fn from_record(record: &CredentialRecord) -> Result<Self, serde_json::Error> {
        let mut fields = record.profile.clone();
        if let Some(email) = &record.email {
            fields.insert("email".to_string(), Value::String(email.clone()));
        }
        fields
            .entry("id")
            .or_insert_with(|| Value::String(generate_session_id()));
        Self::from_fields(fields)
    }

    /// Fresh account: new identifier, level 1, zeroed counters, no achievements.
    pub fn register(account: NewAccount) -> Self {
        let NewAccount {
            name,
            email,
            password: _,
            mut profile,
        } = account;
        profile.retain(|key, _| !RESERVED_FIELDS.contains(&key.as_str()));

        Session {
            id: generate_session_id(),
            name,
            email,
            level: INITIAL_LEVEL,
            experience: 0,
            streak: 0,
            total_points: 0,
            achievements: Vec::new(),
            created_at: Utc::now(),
            extra: profile,
        }
    }

    /// Restores a persisted snapshot.
    pub fn from_snapshot(snapshot: &str) -> Result<Self, serde_json::Error> {
        let mut session: Session = serde_json::from_str(snapshot)?;
        session.extra.remove(CREDENTIAL_FIELD);
        Ok(session)
    }

    pub fn to_snapshot(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Shallow merge: each top-level patch field replaces the session's field
    /// wholesale. `id` and the credential are skipped. Fails only when a
    /// known field receives a value of the wrong type.
    pub fn merged(&self, patch: &SessionPatch) -> Result<Self, serde_json::Error> {
        let mut fields = match serde_json::to_value(self)? {
            Value::Object(fields) => fields,
            _ => return Err(serde::ser::Error::custom("session must serialize to an object")),
        };
        for (key, value) in &patch.0 {
            if IMMUTABLE_FIELDS.contains(&key.as_str()) {
                continue;
            }
            fields.insert(key.clone(), value.clone());
        }
        Self::from_fields(fields)
    }

    fn from_fields(mut fields: Map<String, Value>) -> Result<Self, serde_json::Error> {
        fields.remove(CREDENTIAL_FIELD);
        serde_json::from_value(Value::Object(fields))
    }
}
