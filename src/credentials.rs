use keyring::Entry;

/// Keychain service name under which account credentials are filed.
const SERVICE_NAME: &str = "websession";

/// Keychain user suffix for an account's TOTP seed.
const TOTP_SUFFIX: &str = ".totp";

/// Secure OS-level storage for the identity material used to mint sessions.
///
/// Only the account password and the optional TOTP seed live in the
/// keychain. Session tokens themselves always go through the configured
/// file or save/load callbacks.
pub struct CredentialStore;

impl CredentialStore {
    /// Store the password for an account in the OS keychain.
    pub fn store(identifier: &str, password: &str) -> Result<(), keyring::Error> {
        Entry::new(SERVICE_NAME, identifier)?.set_password(password)
    }

    /// Store the TOTP seed for an account with two-factor enabled.
    pub fn store_totp(identifier: &str, seed: &str) -> Result<(), keyring::Error> {
        Entry::new(SERVICE_NAME, &format!("{identifier}{TOTP_SUFFIX}"))?.set_password(seed)
    }

    /// Retrieve the password for an account.
    pub fn get_password(identifier: &str) -> Result<String, keyring::Error> {
        Entry::new(SERVICE_NAME, identifier)?.get_password()
    }

    /// Retrieve the TOTP seed for an account, if one was stored.
    pub fn get_totp(identifier: &str) -> Result<Option<String>, keyring::Error> {
        let entry = Entry::new(SERVICE_NAME, &format!("{identifier}{TOTP_SUFFIX}"))?;
        match entry.get_password() {
            Ok(seed) => Ok(Some(seed)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Delete the stored password and TOTP seed for an account.
    pub fn delete(identifier: &str) -> Result<(), keyring::Error> {
        Entry::new(SERVICE_NAME, identifier)?.delete_credential()?;
        let totp = Entry::new(SERVICE_NAME, &format!("{identifier}{TOTP_SUFFIX}"))?;
        match totp.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Check whether a password is stored for an account.
    pub fn has_credentials(identifier: &str) -> bool {
        Entry::new(SERVICE_NAME, identifier)
            .and_then(|entry| entry.get_password())
            .is_ok()
    }
}
