use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced to callers of [`SessionManager::resolve`](crate::SessionManager::resolve).
///
/// Token expiry and corrupt stored sessions never show up here; they are
/// healed internally by recreating the session. Callers only ever see
/// configuration mistakes, auth provider failures, and session-file I/O
/// failures.
#[derive(Debug, Error)]
pub enum Error {
    /// Neither a session file, a load callback, nor an explicit token was
    /// available to resolve a session from.
    #[error("no session source configured: provide a file path or a load callback")]
    NoSessionSource,

    /// The auth provider could not create a new session. Never retried.
    #[error(transparent)]
    Authentication(#[from] AuthError),

    /// Freshly created sessions kept getting rejected by the remote service.
    #[error("newly created session rejected {attempts} time(s) in a row")]
    RecreationLoop {
        attempts: u32,
        #[source]
        last: InvalidSession,
    },

    /// The session file exists but could not be read.
    #[error("failed to read session file {path:?}")]
    ReadSession {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The session file could not be replaced with a new token.
    #[error("failed to write session file {path:?}")]
    WriteSession {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// OS keychain access failed while resolving stored credentials.
    #[error("keychain access failed")]
    Keychain(#[from] keyring::Error),
}

/// Rejection of a candidate token by the remote service: invalid, expired,
/// or bound to a different account.
///
/// Recoverable from the manager's point of view; it triggers session
/// recreation rather than surfacing to the caller.
#[derive(Debug, Clone, Error)]
#[error("session rejected: {reason}")]
pub struct InvalidSession {
    pub reason: String,
}

impl InvalidSession {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failure to exchange identity material for a new session.
///
/// These are fatal: the manager propagates them to the caller of `resolve`
/// without retrying.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credentials rejected for {identifier}")]
    BadCredentials { identifier: String },

    #[error("two-factor verification failed: {0}")]
    TwoFactor(String),

    #[error("network error during credential exchange: {0}")]
    Network(String),

    /// Catch-all for provider-specific failures.
    #[error("{0}")]
    Provider(String),
}
