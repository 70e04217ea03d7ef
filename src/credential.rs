use std::fmt;
use thiserror::Error;

/// Prefix expected on OpenAI-style API keys. This is a format gate only; the
/// provider is the authority on whether a key is actually valid.
pub const KEY_PREFIX: &str = "sk-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("API key is empty")]
    Empty,

    #[error("API key does not start with \"sk-\"")]
    BadPrefix,
}

/// Opaque per-session API key.
///
/// Constructed only through [`ApiKey::parse`], so holding one means the
/// superficial format check already passed. The secret is never logged and
/// never persisted by this crate.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Trim and format-check a raw key as entered by the user.
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CredentialError::Empty);
        }
        if !raw.starts_with(KEY_PREFIX) {
            return Err(CredentialError::BadPrefix);
        }
        Ok(Self(raw.to_string()))
    }

    /// The raw secret, for building the Authorization header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keep the secret out of logs and panic messages.
        f.write_str("ApiKey(sk-***)")
    }
}
