use crate::config::ProxyConfig;
use crate::error::{AuthError, InvalidSession};
use crate::token::SessionToken;

/// External collaborator that talks to the remote service.
///
/// Implementations own all transport concerns: request mechanics, proxy
/// wiring, the credential-exchange protocol, and two-factor code derivation.
/// The session manager only needs two capabilities from them.
pub trait AuthProvider {
    /// Authenticated client produced by a successful validation.
    type Client;

    /// Exchange identity material for a brand-new session token.
    ///
    /// Failures here (bad credentials, rejected two-factor code, network
    /// trouble) are fatal to the resolve in progress; the manager never
    /// retries them.
    fn create(
        &self,
        identifier: &str,
        password: &str,
        proxy: Option<&ProxyConfig>,
        totp_token: Option<&str>,
    ) -> Result<SessionToken, AuthError>;

    /// Construct an authenticated client from a candidate token.
    ///
    /// Returns [`InvalidSession`] when the remote service rejects the token
    /// as invalid or expired; the manager recovers by creating a new
    /// session.
    fn connect(
        &self,
        token: &SessionToken,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Self::Client, InvalidSession>;
}
