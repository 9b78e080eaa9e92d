//! API key material for the authentication handshake.
//!
//! Absence of a key is valid: the client then skips authentication and
//! runs in unauthenticated (read-only) mode.

use zeroize::Zeroizing;

/// Supplies the API key sent in the `auth` frame.
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self) -> Option<Zeroizing<String>>;
}

/// Fixed key held in memory, wiped on drop.
pub struct StaticCredentials {
    api_key: Zeroizing<String>,
}

impl StaticCredentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Zeroizing::new(api_key.into()),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn api_key(&self) -> Option<Zeroizing<String>> {
        (!self.api_key.is_empty()).then(|| self.api_key.clone())
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Reads the key from an environment variable on every handshake, so a
/// rotated key is picked up on the next reconnect.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredentials {
    fn api_key(&self) -> Option<Zeroizing<String>> {
        std::env::var(&self.var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(Zeroizing::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credentials() {
        let creds = StaticCredentials::new("k-123");
        assert_eq!(creds.api_key().as_deref().map(String::as_str), Some("k-123"));
        assert!(!format!("{creds:?}").contains("k-123"));
    }

    #[test]
    fn test_empty_static_key_is_absent() {
        assert!(StaticCredentials::new("").api_key().is_none());
    }

    #[test]
    fn test_env_credentials_missing_var() {
        let creds = EnvCredentials::new("MW_TEST_SURELY_UNSET_API_KEY");
        assert!(creds.api_key().is_none());
    }
}
