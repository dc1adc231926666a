//! Session resolution configuration.
//!
//! A [`SessionConfig`] carries the identity material for one account plus
//! the wiring that decides where sessions are stored: a file path, or a
//! caller-supplied load/save callback pair. It is built once at startup and
//! stays immutable for the lifetime of the owning manager, so proxy settings
//! and the TOTP seed are reused across session recreations.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::credentials::CredentialStore;
use crate::error::Error;

/// Session file used when neither a file path nor a load callback is
/// configured.
pub const DEFAULT_SESSION_FILE: &str = "ensta-web-session.txt";

/// Zero-argument callback producing previously saved session text.
/// An empty (or all-whitespace) return value means "nothing saved yet";
/// the callback must not fail for that case.
pub type LoadFn = Box<dyn Fn() -> String + Send + Sync>;

/// Callback handed each newly created session token, exactly once per
/// recreation. Its return value is ignored.
pub type SaveFn = Box<dyn Fn(&str) + Send + Sync>;

/// Proxy routing table keyed by URL scheme ("http", "https").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig(HashMap<String, String>);

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scheme: impl Into<String>, address: impl Into<String>) {
        self.0.insert(scheme.into(), address.into());
    }

    pub fn address_for(&self, scheme: &str) -> Option<&str> {
        self.0.get(scheme).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(scheme, addr)| (scheme.as_str(), addr.as_str()))
    }
}

impl<S: Into<String>, A: Into<String>> FromIterator<(S, A)> for ProxyConfig {
    fn from_iter<I: IntoIterator<Item = (S, A)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(scheme, addr)| (scheme.into(), addr.into()))
                .collect(),
        )
    }
}

/// Identity material and persistence wiring for one account.
///
/// Exactly one source is authoritative for reading stored sessions: the load
/// callback when one is configured, otherwise the file path. When both are
/// present the file is still rewritten on recreation.
pub struct SessionConfig {
    pub(crate) identifier: String,
    pub(crate) password: String,
    pub(crate) file: Option<PathBuf>,
    pub(crate) save: Option<SaveFn>,
    pub(crate) load: Option<LoadFn>,
    pub(crate) proxy: Option<ProxyConfig>,
    pub(crate) totp_token: Option<String>,
}

impl SessionConfig {
    /// Start a configuration for the given account.
    pub fn builder(
        identifier: impl Into<String>,
        password: impl Into<String>,
    ) -> SessionConfigBuilder {
        SessionConfigBuilder {
            identifier: identifier.into(),
            password: password.into(),
            file: None,
            save: None,
            load: None,
            proxy: None,
            totp_token: None,
        }
    }

    /// Start a configuration whose password (and TOTP seed, if one was
    /// stored) come from the OS keychain entry written by
    /// [`CredentialStore::store`].
    pub fn builder_from_keychain(
        identifier: impl Into<String>,
    ) -> Result<SessionConfigBuilder, Error> {
        let identifier = identifier.into();
        let password = CredentialStore::get_password(&identifier)?;
        let totp = CredentialStore::get_totp(&identifier)?;
        let mut builder = Self::builder(identifier, password);
        if let Some(seed) = totp {
            builder = builder.totp_token(seed);
        }
        Ok(builder)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    pub fn totp_token(&self) -> Option<&str> {
        self.totp_token.as_deref()
    }
}

impl fmt::Debug for SessionConfig {
    // Secrets stay out of logs; callbacks have no useful Debug form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .field("file", &self.file)
            .field("save", &self.save.is_some())
            .field("load", &self.load.is_some())
            .field("proxy", &self.proxy)
            .field("totp_token", &self.totp_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Consuming builder for [`SessionConfig`].
pub struct SessionConfigBuilder {
    identifier: String,
    password: String,
    file: Option<PathBuf>,
    save: Option<SaveFn>,
    load: Option<LoadFn>,
    proxy: Option<ProxyConfig>,
    totp_token: Option<String>,
}

impl SessionConfigBuilder {
    /// Store sessions in the given file instead of [`DEFAULT_SESSION_FILE`].
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Read previously saved session text through a callback. When a load
    /// callback is configured it takes precedence over the file path as the
    /// read source, and no default file is applied.
    pub fn load(mut self, callback: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.load = Some(Box::new(callback));
        self
    }

    /// Receive each newly created session token.
    pub fn save(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.save = Some(Box::new(callback));
        self
    }

    /// Route requests through the given proxies.
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// TOTP seed for accounts with two-factor authentication enabled.
    pub fn totp_token(mut self, seed: impl Into<String>) -> Self {
        self.totp_token = Some(seed.into());
        self
    }

    /// Finalize the configuration, falling back to [`DEFAULT_SESSION_FILE`]
    /// when neither a file nor a load callback was configured.
    pub fn build(mut self) -> SessionConfig {
        if self.file.is_none() && self.load.is_none() {
            self.file = Some(PathBuf::from(DEFAULT_SESSION_FILE));
        }
        SessionConfig {
            identifier: self.identifier,
            password: self.password,
            file: self.file,
            save: self.save,
            load: self.load,
            proxy: self.proxy,
            totp_token: self.totp_token,
        }
    }
}
