//! Candidate session lookup.
//!
//! The store is the leaf of session resolution: it produces a candidate
//! token from exactly one configured source and rejects stored file data
//! that does not belong to the configured account. Whether a candidate is
//! actually usable is decided later, by validating it against the remote
//! service.

use std::fs;

use tracing::debug;

use crate::config::SessionConfig;
use crate::error::Error;
use crate::token::SessionToken;

/// Outcome of a [`SessionStore::fetch`]: a candidate token to try against
/// the remote service, or nothing usable.
#[derive(Debug)]
pub enum Lookup {
    Found(SessionToken),
    NotFound,
}

/// Resolves a candidate session token from one of three mutually exclusive
/// sources: an explicit token, a load callback, or a session file.
///
/// Reads only; persisting new tokens is the manager's job.
pub struct SessionStore<'a> {
    config: &'a SessionConfig,
}

impl<'a> SessionStore<'a> {
    pub fn new(config: &'a SessionConfig) -> Self {
        Self { config }
    }

    /// Produce a candidate token, or [`Lookup::NotFound`] when no usable
    /// session is stored.
    ///
    /// An explicit token is returned as-is: it comes from the creation path,
    /// which already bound it to the configured identity. Tokens from the
    /// load callback are also passed through unchecked and left to fail
    /// remote validation if foreign. Only the file path verifies the stored
    /// `identifier` up front, silently discarding foreign or malformed
    /// records.
    pub fn fetch(&self, explicit: Option<SessionToken>) -> Result<Lookup, Error> {
        if let Some(token) = explicit {
            return Ok(Lookup::Found(token));
        }

        if let Some(load) = self.config.load.as_ref() {
            let text = load();
            let text = text.trim();
            if text.is_empty() {
                debug!("load callback has no saved session");
                return Ok(Lookup::NotFound);
            }
            return Ok(Lookup::Found(SessionToken::new(text)));
        }

        let Some(path) = self.config.file.as_deref() else {
            return Err(Error::NoSessionSource);
        };

        if !path.exists() {
            debug!(?path, "session file does not exist");
            return Ok(Lookup::NotFound);
        }

        let contents = fs::read_to_string(path).map_err(|source| Error::ReadSession {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            debug!(?path, "session file is empty");
            return Ok(Lookup::NotFound);
        }

        let token = SessionToken::new(trimmed);
        match token.identifier() {
            Some(stored) if stored == self.config.identifier => Ok(Lookup::Found(token)),
            Some(stored) => {
                debug!(
                    %stored,
                    configured = %self.config.identifier,
                    "stored session belongs to a different account, discarding"
                );
                Ok(Lookup::NotFound)
            }
            None => {
                debug!(?path, "stored session is not a parseable record, discarding");
                Ok(Lookup::NotFound)
            }
        }
    }
}
