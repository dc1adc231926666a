use std::fmt;

use serde::Deserialize;

/// The slice of a serialized session blob this crate actually inspects.
/// Everything else in the blob belongs to the remote service.
#[derive(Debug, Deserialize)]
struct TokenRecord {
    identifier: String,
}

/// An opaque serialized session credential.
///
/// Issued by the auth provider, replaced wholesale on recreation, never
/// patched. The only structure relied upon here is an `identifier` field
/// binding the token to an account.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The account the token claims to belong to, if the blob is a parseable
    /// record. Unparseable blobs yield `None`, never an error.
    pub fn identifier(&self) -> Option<String> {
        serde_json::from_str::<TokenRecord>(&self.0)
            .ok()
            .map(|record| record.identifier)
    }
}

impl fmt::Debug for SessionToken {
    // Tokens are credentials; keep their contents out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("len", &self.0.len())
            .finish()
    }
}
