//! Session resolution state machine.
//!
//! `SessionManager` drives the full lifecycle: look up a stored candidate
//! through the [`SessionStore`], validate it by asking the provider for an
//! authenticated client, and - when the candidate is missing, expired, or
//! foreign - create a replacement session, persist it, and validate that
//! instead. Callers only ever observe configuration mistakes and provider
//! failures; token expiry heals invisibly.

use std::fs;

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Error, InvalidSession};
use crate::provider::AuthProvider;
use crate::store::{Lookup, SessionStore};
use crate::token::SessionToken;

/// Maximum sessions created within a single resolve: the initial creation
/// plus one automatic retry when a freshly minted token is itself rejected.
/// A second rejection indicates remote inconsistency this crate cannot heal.
const MAX_CREATE_ATTEMPTS: u32 = 2;

/// Orchestrates session lookup, validation, and recreation for one account.
///
/// All I/O is blocking and scoped per call; the only state kept between
/// calls is the validated client. Processes sharing a session file are not
/// coordinated - the last writer wins.
pub struct SessionManager<P: AuthProvider> {
    config: SessionConfig,
    provider: P,
    client: Option<P::Client>,
}

impl<P: AuthProvider> SessionManager<P> {
    pub fn new(config: SessionConfig, provider: P) -> Self {
        Self {
            config,
            provider,
            client: None,
        }
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The collaborator handling credential exchange and validation.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Whether a validated session is currently held.
    pub fn is_active(&self) -> bool {
        self.client.is_some()
    }

    /// The authenticated client, once [`resolve`](Self::resolve) has
    /// succeeded.
    pub fn client(&self) -> Option<&P::Client> {
        self.client.as_ref()
    }

    /// Drop the current client, forcing the next [`resolve`](Self::resolve)
    /// to start from the stored session again.
    pub fn invalidate(&mut self) {
        self.client = None;
    }

    /// Ensure an authenticated client exists and return it.
    ///
    /// Once resolved, the client is cached; later calls return it without
    /// touching the session source or the provider.
    pub fn resolve(&mut self) -> Result<&P::Client, Error> {
        self.resolve_inner(None)
    }

    /// Like [`resolve`](Self::resolve), but validate the given token instead
    /// of consulting the configured session source.
    pub fn resolve_with(&mut self, token: SessionToken) -> Result<&P::Client, Error> {
        self.resolve_inner(Some(token))
    }

    fn resolve_inner(&mut self, explicit: Option<SessionToken>) -> Result<&P::Client, Error> {
        if self.client.is_none() {
            let client = self.establish(explicit)?;
            self.client = Some(client);
        }
        Ok(self.client.as_ref().expect("client present after establish"))
    }

    /// Run the lookup / validate / create cycle until a client is obtained
    /// or a fatal error surfaces.
    fn establish(&self, explicit: Option<SessionToken>) -> Result<P::Client, Error> {
        let store = SessionStore::new(&self.config);
        let mut pending = explicit;
        let mut created = 0u32;
        let mut last_rejection: Option<InvalidSession> = None;

        loop {
            match store.fetch(pending.take())? {
                Lookup::Found(token) => {
                    match self.provider.connect(&token, self.config.proxy.as_ref()) {
                        Ok(client) => {
                            debug!(identifier = %self.config.identifier, "session validated");
                            return Ok(client);
                        }
                        Err(rejection) => {
                            debug!(%rejection, "candidate session rejected");
                            last_rejection = Some(rejection);
                        }
                    }
                }
                Lookup::NotFound => debug!("no stored session available"),
            }

            if created >= MAX_CREATE_ATTEMPTS {
                warn!(
                    attempts = created,
                    "freshly created sessions keep getting rejected, giving up"
                );
                return Err(Error::RecreationLoop {
                    attempts: created,
                    last: last_rejection
                        .unwrap_or_else(|| InvalidSession::new("rejected by remote service")),
                });
            }

            // Creation failures are fatal and propagate as-is; only
            // validation failures re-enter this cycle.
            let token = self.provider.create(
                &self.config.identifier,
                &self.config.password,
                self.config.proxy.as_ref(),
                self.config.totp_token.as_deref(),
            )?;
            created += 1;
            info!(identifier = %self.config.identifier, "new session created");

            // Persisted before re-validation: a new token is saved even if
            // the remote service goes on to reject it.
            self.persist(&token)?;
            pending = Some(token);
        }
    }

    /// Hand the new token to the save callback and replace the session file
    /// wholesale, whichever of the two is configured.
    fn persist(&self, token: &SessionToken) -> Result<(), Error> {
        if let Some(save) = self.config.save.as_ref() {
            save(token.as_str());
            debug!("session handed to save callback");
        }
        if let Some(path) = self.config.file.as_deref() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| Error::WriteSession {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
            fs::write(path, token.as_str()).map_err(|source| Error::WriteSession {
                path: path.to_path_buf(),
                source,
            })?;
            debug!(?path, "session file replaced");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fs;
    use std::sync::{Arc, Mutex};

    use tempfile::TempDir;

    use super::*;
    use crate::error::AuthError;

    /// Test double for the remote service. Counts calls, mints predictable
    /// tokens, and rejects the configured set of token texts.
    struct FakeApi {
        create_calls: Cell<u32>,
        connect_calls: Cell<u32>,
        reject_all: bool,
        rejected: Vec<String>,
        fail_create: bool,
    }

    #[derive(Debug)]
    struct FakeClient {
        token: SessionToken,
    }

    impl FakeApi {
        fn new() -> Self {
            Self {
                create_calls: Cell::new(0),
                connect_calls: Cell::new(0),
                reject_all: false,
                rejected: Vec::new(),
                fail_create: false,
            }
        }

        fn rejecting(texts: &[&str]) -> Self {
            Self {
                rejected: texts.iter().map(|t| t.to_string()).collect(),
                ..Self::new()
            }
        }

        fn rejecting_everything() -> Self {
            Self {
                reject_all: true,
                ..Self::new()
            }
        }

        fn failing_creation() -> Self {
            Self {
                fail_create: true,
                ..Self::new()
            }
        }
    }

    impl AuthProvider for FakeApi {
        type Client = FakeClient;

        fn create(
            &self,
            identifier: &str,
            _password: &str,
            _proxy: Option<&crate::ProxyConfig>,
            _totp_token: Option<&str>,
        ) -> Result<SessionToken, AuthError> {
            self.create_calls.set(self.create_calls.get() + 1);
            if self.fail_create {
                return Err(AuthError::BadCredentials {
                    identifier: identifier.to_string(),
                });
            }
            let serial = self.create_calls.get();
            Ok(SessionToken::new(format!(
                r#"{{"identifier":"{identifier}","authorization":"Bearer fresh-{serial}"}}"#
            )))
        }

        fn connect(
            &self,
            token: &SessionToken,
            _proxy: Option<&crate::ProxyConfig>,
        ) -> Result<FakeClient, InvalidSession> {
            self.connect_calls.set(self.connect_calls.get() + 1);
            if self.reject_all || self.rejected.iter().any(|t| t == token.as_str()) {
                return Err(InvalidSession::new("rejected by fake service"));
            }
            Ok(FakeClient {
                token: token.clone(),
            })
        }
    }

    fn file_config(identifier: &str, dir: &TempDir) -> SessionConfig {
        SessionConfig::builder(identifier, "hunter2")
            .file(dir.path().join("sess.txt"))
            .build()
    }

    fn session_file(manager: &SessionManager<FakeApi>) -> String {
        fs::read_to_string(manager.config().file().unwrap()).unwrap()
    }

    #[test]
    fn missing_file_creates_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut manager = SessionManager::new(file_config("alice", &dir), FakeApi::new());

        manager.resolve().unwrap();

        assert!(manager.is_active());
        assert_eq!(manager.provider().create_calls.get(), 1);
        let stored = SessionToken::new(session_file(&manager));
        assert_eq!(stored.identifier().as_deref(), Some("alice"));
    }

    #[test]
    fn foreign_session_discarded_and_replaced() {
        let dir = TempDir::new().unwrap();
        let config = file_config("alice", &dir);
        fs::write(config.file().unwrap(), r#"{"identifier":"bob"}"#).unwrap();

        let mut manager = SessionManager::new(config, FakeApi::new());
        manager.resolve().unwrap();

        assert_eq!(manager.provider().create_calls.get(), 1);
        // The foreign token never reached validation; only the fresh one did.
        assert_eq!(manager.provider().connect_calls.get(), 1);
        let stored = SessionToken::new(session_file(&manager));
        assert_eq!(stored.identifier().as_deref(), Some("alice"));
    }

    #[test]
    fn blank_load_triggers_recreation_and_save() {
        let saved: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&saved);

        let config = SessionConfig::builder("alice", "hunter2")
            .load(|| "   ".to_string())
            .save(move |token| sink.lock().unwrap().push(token.to_string()))
            .build();

        let mut manager = SessionManager::new(config, FakeApi::new());
        manager.resolve().unwrap();

        assert_eq!(manager.provider().create_calls.get(), 1);
        let saved = saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(
            manager.client().unwrap().token.as_str(),
            saved[0].as_str()
        );
    }

    #[test]
    fn explicit_token_validates_without_creation() {
        let dir = TempDir::new().unwrap();
        let mut manager = SessionManager::new(file_config("alice", &dir), FakeApi::new());

        let token = SessionToken::new(r#"{"identifier":"alice","authorization":"Bearer kept"}"#);
        manager.resolve_with(token.clone()).unwrap();

        assert_eq!(manager.provider().create_calls.get(), 0);
        assert_eq!(manager.client().unwrap().token, token);
    }

    #[test]
    fn second_resolve_reuses_client() {
        let dir = TempDir::new().unwrap();
        let config = file_config("alice", &dir);
        let contents = r#"{"identifier":"alice","authorization":"Bearer stored"}"#;
        fs::write(config.file().unwrap(), contents).unwrap();

        let mut manager = SessionManager::new(config, FakeApi::new());
        manager.resolve().unwrap();
        manager.resolve().unwrap();

        assert_eq!(manager.provider().create_calls.get(), 0);
        assert_eq!(manager.provider().connect_calls.get(), 1);
        assert_eq!(session_file(&manager), contents);
    }

    #[test]
    fn invalid_stored_session_recreates() {
        let dir = TempDir::new().unwrap();
        let config = file_config("alice", &dir);
        let stale = r#"{"identifier":"alice","authorization":"Bearer stale"}"#;
        fs::write(config.file().unwrap(), stale).unwrap();

        let mut manager = SessionManager::new(config, FakeApi::rejecting(&[stale]));
        manager.resolve().unwrap();

        assert_eq!(manager.provider().create_calls.get(), 1);
        assert_eq!(manager.provider().connect_calls.get(), 2);
        assert_ne!(session_file(&manager), stale);
    }

    #[test]
    fn load_callback_token_skips_identity_check() {
        let config = SessionConfig::builder("alice", "hunter2")
            .load(|| r#"{"identifier":"bob","authorization":"Bearer b"}"#.to_string())
            .build();

        let mut manager = SessionManager::new(config, FakeApi::new());
        manager.resolve().unwrap();

        // The foreign token went straight to validation and was accepted.
        assert_eq!(manager.provider().create_calls.get(), 0);
        assert_eq!(
            manager.client().unwrap().token.identifier().as_deref(),
            Some("bob")
        );
    }

    #[test]
    fn recreation_is_capped() {
        let dir = TempDir::new().unwrap();
        let mut manager =
            SessionManager::new(file_config("alice", &dir), FakeApi::rejecting_everything());

        let err = manager.resolve().unwrap_err();

        assert!(matches!(err, Error::RecreationLoop { attempts: 2, .. }));
        assert_eq!(manager.provider().create_calls.get(), 2);
        assert!(!manager.is_active());
    }

    #[test]
    fn persistence_runs_even_when_fresh_token_rejected() {
        let saved: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&saved);

        let config = SessionConfig::builder("alice", "hunter2")
            .load(String::new)
            .save(move |token| sink.lock().unwrap().push(token.to_string()))
            .build();

        let mut manager = SessionManager::new(config, FakeApi::rejecting_everything());
        manager.resolve().unwrap_err();

        // One save per creation, independent of the validation that follows.
        assert_eq!(saved.lock().unwrap().len(), 2);
    }

    #[test]
    fn creation_failure_propagates_without_retry() {
        let dir = TempDir::new().unwrap();
        let mut manager =
            SessionManager::new(file_config("alice", &dir), FakeApi::failing_creation());

        let err = manager.resolve().unwrap_err();

        assert!(matches!(
            err,
            Error::Authentication(AuthError::BadCredentials { .. })
        ));
        assert_eq!(manager.provider().create_calls.get(), 1);
        assert!(!manager.config().file().unwrap().exists());
        assert!(!manager.is_active());
    }

    #[test]
    fn invalidate_forces_a_fresh_resolution() {
        let dir = TempDir::new().unwrap();
        let config = file_config("alice", &dir);
        fs::write(
            config.file().unwrap(),
            r#"{"identifier":"alice","authorization":"Bearer stored"}"#,
        )
        .unwrap();

        let mut manager = SessionManager::new(config, FakeApi::new());
        manager.resolve().unwrap();
        manager.invalidate();
        assert!(!manager.is_active());

        manager.resolve().unwrap();
        assert_eq!(manager.provider().connect_calls.get(), 2);
    }
}
