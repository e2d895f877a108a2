//! Session Manager: creates, restores, patches, and tears down the active session.
//!
//! Collaborators are injected: the snapshot store, the credential lookup, the
//! navigator, and the notifier. State changes are published on a
//! `tokio::sync::watch` channel so readers do not need a render loop.
//!
//! There is no reentrancy guard. Two overlapping operations both persist and
//! the later write wins.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::credentials::{find_match, CredentialSource, LookupError};
use crate::models::session::{NewAccount, Session, SessionPatch};
use crate::session::effects::{
    Navigator, Notifier, HOME_PATH, LANDING_PATH, MSG_INVALID_CREDENTIALS, MSG_LOGIN_FAILED,
    MSG_LOGIN_OK, MSG_LOGOUT_OK, MSG_SIGNUP_FAILED, MSG_SIGNUP_OK,
};
use crate::session::state::SessionState;
use crate::storage::{SnapshotStore, StorageError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Credential lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("Matched credential record is not a valid profile: {0}")]
    InvalidRecord(#[source] serde_json::Error),

    #[error("No active session")]
    NotAuthenticated,

    #[error("Patch does not produce a valid session: {0}")]
    InvalidPatch(#[source] serde_json::Error),

    #[error("Could not serialize session: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct SessionManager {
    store: Arc<dyn SnapshotStore>,
    credentials: Arc<dyn CredentialSource>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    storage_key: String,
    state: watch::Sender<SessionState>,
}

impl SessionManager {
    /// Starts in `Initializing`; call [`SessionManager::initialize`] before serving reads.
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        credentials: Arc<dyn CredentialSource>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
        storage_key: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Initializing);
        Self {
            store,
            credentials,
            navigator,
            notifier,
            storage_key: storage_key.into(),
            state,
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.state.borrow().session().cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Restores the persisted snapshot, if any. Unreadable or malformed
    /// snapshots are logged and treated as "no session". Always leaves
    /// `Initializing`.
    pub async fn initialize(&self) -> Option<Session> {
        let restored = match self.store.get(&self.storage_key).await {
            Ok(Some(snapshot)) => match Session::from_snapshot(&snapshot) {
                Ok(session) => {
                    info!("Restored session for user {}", session.id);
                    Some(session)
                }
                Err(e) => {
                    warn!("Ignoring malformed session snapshot: {e}");
                    None
                }
            },
            Ok(None) => {
                debug!("No persisted session under key '{}'", self.storage_key);
                None
            }
            Err(e) => {
                warn!("Could not read persisted session: {e}");
                None
            }
        };

        self.publish(restored.clone().into());
        restored
    }

    /// Checks the credentials against the lookup resource. Unknown email and
    /// wrong password are reported the same way.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, SessionError> {
        match self.try_login(email, password).await {
            Ok(session) => {
                info!("User {} logged in", session.id);
                self.notifier.success(MSG_LOGIN_OK);
                self.navigator.navigate(HOME_PATH);
                Ok(session)
            }
            Err(SessionError::InvalidCredentials) => {
                info!("Login rejected: no matching credentials");
                self.notifier.error(MSG_INVALID_CREDENTIALS);
                Err(SessionError::InvalidCredentials)
            }
            Err(e) => {
                warn!("Login failed: {e}");
                self.notifier.error(MSG_LOGIN_FAILED);
                Err(e)
            }
        }
    }

    async fn try_login(&self, email: &str, password: &str) -> Result<Session, SessionError> {
        let records = self.credentials.fetch_records().await?;
        let record =
            find_match(&records, email, password).ok_or(SessionError::InvalidCredentials)?;
        let session = Session::from_record(record).map_err(SessionError::InvalidRecord)?;
        self.commit(session).await
    }

    /// Creates a fresh account locally. No duplicate-email check and no
    /// lookup round-trip; only a storage failure can fail it.
    pub async fn register(&self, account: NewAccount) -> Result<Session, SessionError> {
        let session = Session::register(account);
        match self.commit(session).await {
            Ok(session) => {
                info!("Registered user {}", session.id);
                self.notifier.success(MSG_SIGNUP_OK);
                self.navigator.navigate(HOME_PATH);
                Ok(session)
            }
            Err(e) => {
                warn!("Signup failed: {e}");
                self.notifier.error(MSG_SIGNUP_FAILED);
                Err(e)
            }
        }
    }

    /// Always succeeds. A failure to remove the snapshot is only logged.
    pub async fn logout(&self) {
        if let Err(e) = self.store.remove(&self.storage_key).await {
            warn!("Could not remove persisted session: {e}");
        }
        self.publish(SessionState::Anonymous);
        self.notifier.success(MSG_LOGOUT_OK);
        self.navigator.navigate(LANDING_PATH);
    }

    /// Shallow-merges `patch` into the active session and persists the result.
    pub async fn update(&self, patch: &SessionPatch) -> Result<Session, SessionError> {
        let current = self.current().ok_or(SessionError::NotAuthenticated)?;
        let merged = current.merged(patch).map_err(SessionError::InvalidPatch)?;
        debug!("Updating session {} ({} field(s))", merged.id, patch.0.len());
        self.commit(merged).await
    }

    /// Persist first, then publish: a failed write leaves the state untouched.
    async fn commit(&self, session: Session) -> Result<Session, SessionError> {
        let snapshot = session.to_snapshot().map_err(SessionError::Serialize)?;
        self.store.set(&self.storage_key, &snapshot).await?;
        self.publish(SessionState::Authenticated(session.clone()));
        Ok(session)
    }

    fn publish(&self, next: SessionState) {
        let next_label = next.label();
        let previous = self.state.send_replace(next);
        if previous.label() != next_label {
            info!("Session state: {} -> {}", previous.label(), next_label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::credentials::StaticCredentialSource;
    use crate::models::credential::CredentialRecord;
    use crate::session::effects::{Notice, Recorder};
    use crate::storage::{FileStore, MemoryStore};

    const KEY: &str = "user";

    struct Harness {
        manager: SessionManager,
        store: Arc<MemoryStore>,
        recorder: Arc<Recorder>,
    }

    fn harness_with(store: Arc<MemoryStore>, credentials: Arc<dyn CredentialSource>) -> Harness {
        let recorder = Arc::new(Recorder::default());
        let manager = SessionManager::new(
            store.clone(),
            credentials,
            recorder.clone(),
            recorder.clone(),
            KEY,
        );
        Harness {
            manager,
            store,
            recorder,
        }
    }

    fn scenario_source() -> Arc<dyn CredentialSource> {
        Arc::new(
            StaticCredentialSource::from_json(
                r#"[{"email":"a@x.com","password":"pw1","name":"A"}]"#,
            )
            .unwrap(),
        )
    }

    async fn ready_harness() -> Harness {
        let h = harness_with(Arc::new(MemoryStore::default()), scenario_source());
        h.manager.initialize().await;
        h
    }

    fn account(name: &str, email: &str) -> NewAccount {
        serde_json::from_value(json!({"name": name, "email": email, "password": "secret"})).unwrap()
    }

    async fn persisted(store: &MemoryStore) -> Option<Value> {
        store
            .get(KEY)
            .await
            .unwrap()
            .map(|s| serde_json::from_str(&s).unwrap())
    }

    struct FailingSource;

    #[async_trait]
    impl CredentialSource for FailingSource {
        async fn fetch_records(&self) -> Result<Vec<CredentialRecord>, LookupError> {
            Err(LookupError::Status { status: 503 })
        }
    }

    struct ReadOnlyStore;

    #[async_trait]
    impl SnapshotStore for ReadOnlyStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }

        async fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    #[tokio::test]
    async fn test_starts_initializing_then_anonymous() {
        let h = harness_with(Arc::new(MemoryStore::default()), scenario_source());
        assert!(h.manager.is_loading());
        assert_eq!(h.manager.state(), SessionState::Initializing);

        assert!(h.manager.initialize().await.is_none());
        assert!(!h.manager.is_loading());
        assert_eq!(h.manager.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_login_scenario_success() {
        let h = ready_harness().await;

        let session = h.manager.login("a@x.com", "pw1").await.unwrap();
        assert_eq!(session.name, "A");
        assert_eq!(h.manager.current(), Some(session));
        assert_eq!(
            h.recorder.last_notice(),
            Some(Notice::Success(MSG_LOGIN_OK.to_string()))
        );
        assert_eq!(h.recorder.paths(), vec![HOME_PATH.to_string()]);
    }

    #[tokio::test]
    async fn test_login_snapshot_has_no_credential() {
        let h = ready_harness().await;
        h.manager.login("a@x.com", "pw1").await.unwrap();

        let snapshot = persisted(&h.store).await.unwrap();
        assert_eq!(snapshot["email"], "a@x.com");
        assert!(snapshot.get("password").is_none());
        assert!(!h.store.get(KEY).await.unwrap().unwrap().contains("pw1"));
    }

    #[tokio::test]
    async fn test_login_wrong_password_stays_anonymous() {
        let h = ready_harness().await;

        let err = h.manager.login("a@x.com", "wrong").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidCredentials));
        assert_eq!(h.manager.state(), SessionState::Anonymous);
        assert!(persisted(&h.store).await.is_none());
        assert_eq!(
            h.recorder.last_notice(),
            Some(Notice::Error(MSG_INVALID_CREDENTIALS.to_string()))
        );
        assert!(h.recorder.paths().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_email_reports_same_failure() {
        let h = ready_harness().await;
        let err = h.manager.login("nobody@x.com", "pw1").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidCredentials));
        assert_eq!(
            h.recorder.last_notice(),
            Some(Notice::Error(MSG_INVALID_CREDENTIALS.to_string()))
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_has_distinct_message() {
        let h = harness_with(Arc::new(MemoryStore::default()), Arc::new(FailingSource));
        h.manager.initialize().await;

        let err = h.manager.login("a@x.com", "pw1").await.unwrap_err();
        assert!(matches!(err, SessionError::Lookup(_)));
        assert_eq!(h.manager.state(), SessionState::Anonymous);
        assert_eq!(
            h.recorder.last_notice(),
            Some(Notice::Error(MSG_LOGIN_FAILED.to_string()))
        );
    }

    #[tokio::test]
    async fn test_login_record_without_name() {
        let source = StaticCredentialSource::from_json(r#"[{"email":"a@x.com","password":"pw1"}]"#)
            .unwrap();
        let h = harness_with(Arc::new(MemoryStore::default()), Arc::new(source));
        h.manager.initialize().await;

        let session = h.manager.login("a@x.com", "pw1").await.unwrap();
        assert_eq!(session.email, "a@x.com");
        assert_eq!(session.name, "");
        assert_eq!(
            h.recorder.last_notice(),
            Some(Notice::Success(MSG_LOGIN_OK.to_string()))
        );
    }

    #[tokio::test]
    async fn test_login_record_with_bad_field_is_not_a_lookup_failure() {
        let source = StaticCredentialSource::from_json(
            r#"[{"email":"a@x.com","password":"pw1","name":"A","level":"7"}]"#,
        )
        .unwrap();
        let h = harness_with(Arc::new(MemoryStore::default()), Arc::new(source));
        h.manager.initialize().await;

        let err = h.manager.login("a@x.com", "pw1").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidRecord(_)));
        assert_eq!(h.manager.state(), SessionState::Anonymous);
        assert!(persisted(&h.store).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_storage_file_does_not_block_login() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{"user": "{trunc"#).unwrap();

        let store = Arc::new(FileStore::new(path.clone()));
        let recorder = Arc::new(Recorder::default());
        let manager = SessionManager::new(
            store.clone(),
            scenario_source(),
            recorder.clone(),
            recorder.clone(),
            KEY,
        );
        assert!(manager.initialize().await.is_none());

        let session = manager.login("a@x.com", "pw1").await.unwrap();
        assert_eq!(manager.current(), Some(session));

        manager.logout().await;
        assert_eq!(store.get(KEY).await.unwrap(), None);
        let again = manager.login("a@x.com", "pw1").await.unwrap();

        let restarted = SessionManager::new(
            Arc::new(FileStore::new(path)),
            scenario_source(),
            recorder.clone(),
            recorder,
            KEY,
        );
        assert_eq!(restarted.initialize().await, Some(again));
    }

    #[tokio::test]
    async fn test_register_defaults() {
        let h = ready_harness().await;

        let session = h.manager.register(account("New", "new@x.com")).await.unwrap();
        assert_eq!(session.level, 1);
        assert_eq!(session.experience, 0);
        assert_eq!(session.streak, 0);
        assert_eq!(session.total_points, 0);
        assert!(session.achievements.is_empty());
        assert_eq!(h.manager.current(), Some(session));
        assert_eq!(
            h.recorder.last_notice(),
            Some(Notice::Success(MSG_SIGNUP_OK.to_string()))
        );
        assert_eq!(h.recorder.paths(), vec![HOME_PATH.to_string()]);

        let snapshot = persisted(&h.store).await.unwrap();
        assert!(snapshot.get("password").is_none());
    }

    #[tokio::test]
    async fn test_register_allows_duplicate_email() {
        let h = ready_harness().await;
        let first = h.manager.register(account("A", "a@x.com")).await.unwrap();
        let second = h.manager.register(account("A again", "a@x.com")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(h.manager.current(), Some(second));
    }

    #[tokio::test]
    async fn test_register_survives_restart() {
        let store = Arc::new(MemoryStore::default());
        let h = harness_with(store.clone(), scenario_source());
        h.manager.initialize().await;
        let created = h.manager.register(account("New", "new@x.com")).await.unwrap();

        let restarted = harness_with(store, scenario_source());
        let restored = restarted.manager.initialize().await;
        assert_eq!(restored, Some(created.clone()));
        assert_eq!(restarted.manager.current(), Some(created));
    }

    #[tokio::test]
    async fn test_logout_from_authenticated() {
        let h = ready_harness().await;
        h.manager.login("a@x.com", "pw1").await.unwrap();

        h.manager.logout().await;
        assert_eq!(h.manager.state(), SessionState::Anonymous);
        assert!(persisted(&h.store).await.is_none());
        assert_eq!(
            h.recorder.last_notice(),
            Some(Notice::Success(MSG_LOGOUT_OK.to_string()))
        );
        assert_eq!(
            h.recorder.paths(),
            vec![HOME_PATH.to_string(), LANDING_PATH.to_string()]
        );
    }

    #[tokio::test]
    async fn test_logout_from_any_state() {
        let h = harness_with(Arc::new(MemoryStore::default()), scenario_source());
        h.manager.logout().await;
        assert_eq!(h.manager.state(), SessionState::Anonymous);

        h.manager.logout().await;
        assert_eq!(h.manager.state(), SessionState::Anonymous);
        assert!(persisted(&h.store).await.is_none());
    }

    #[tokio::test]
    async fn test_logout_succeeds_even_if_storage_fails() {
        let recorder = Arc::new(Recorder::default());
        let manager = SessionManager::new(
            Arc::new(ReadOnlyStore),
            scenario_source(),
            recorder.clone(),
            recorder.clone(),
            KEY,
        );
        manager.logout().await;
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert_eq!(
            recorder.last_notice(),
            Some(Notice::Success(MSG_LOGOUT_OK.to_string()))
        );
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_untouched() {
        let recorder = Arc::new(Recorder::default());
        let manager = SessionManager::new(
            Arc::new(ReadOnlyStore),
            scenario_source(),
            recorder.clone(),
            recorder.clone(),
            KEY,
        );
        manager.initialize().await;

        let err = manager.register(account("New", "new@x.com")).await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(_)));
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert_eq!(
            recorder.last_notice(),
            Some(Notice::Error(MSG_SIGNUP_FAILED.to_string()))
        );
        assert!(recorder.paths().is_empty());
    }

    #[tokio::test]
    async fn test_patch_total_points_only() {
        let h = ready_harness().await;
        let before = h.manager.login("a@x.com", "pw1").await.unwrap();

        let after = h
            .manager
            .update(&SessionPatch::new().set("totalPoints", 750))
            .await
            .unwrap();
        assert_eq!(after.total_points, 750);
        assert_eq!(
            Session {
                total_points: before.total_points,
                ..after.clone()
            },
            before
        );
        assert_eq!(h.manager.current(), Some(after));
        assert_eq!(persisted(&h.store).await.unwrap()["totalPoints"], 750);
    }

    #[tokio::test]
    async fn test_patch_requires_session() {
        let h = ready_harness().await;
        let err = h
            .manager
            .update(&SessionPatch::new().set("streak", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotAuthenticated));
        assert!(persisted(&h.store).await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_patch_keeps_previous_session() {
        let h = ready_harness().await;
        let before = h.manager.login("a@x.com", "pw1").await.unwrap();

        let err = h
            .manager
            .update(&SessionPatch::new().set("streak", "many"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidPatch(_)));
        assert_eq!(h.manager.current(), Some(before));
    }

    #[tokio::test]
    async fn test_patch_cannot_change_id() {
        let h = ready_harness().await;
        let before = h.manager.login("a@x.com", "pw1").await.unwrap();
        let after = h
            .manager
            .update(&SessionPatch::new().set("id", "hijacked").set("name", "Renamed"))
            .await
            .unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.name, "Renamed");
    }

    #[tokio::test]
    async fn test_malformed_snapshot_is_swallowed() {
        let store = Arc::new(MemoryStore::default());
        store.set(KEY, "{\"id\":").await.unwrap();

        let h = harness_with(store, scenario_source());
        assert!(h.manager.initialize().await.is_none());
        assert_eq!(h.manager.state(), SessionState::Anonymous);
        assert!(h.recorder.notices().is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let h = ready_harness().await;
        let mut rx = h.manager.subscribe();
        assert!(!rx.has_changed().unwrap());

        h.manager.login("a@x.com", "pw1").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().session().is_some());

        h.manager.logout().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionState::Anonymous);
    }
}
