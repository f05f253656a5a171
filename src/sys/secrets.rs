// src/sys/secrets.rs

use secrecy::{ExposeSecret, Secret};
use std::collections::HashMap;
use std::env;
use std::fmt;
use zeroize::Zeroizing;

use crate::models::ProviderKind;
use crate::sys::traits::TokenSource;

/// ProviderCredential is an ephemeral, memory-safe wrapper for cloud API tokens.
///
/// 1. It cannot be accidentally logged (`{:?}` prints `[REDACTED]`).
/// 2. When the struct goes out of scope, the memory is zeroized.
pub struct ProviderCredential {
    token: Secret<Vec<u8>>,
}

impl ProviderCredential {
    pub fn new(raw_token: Vec<u8>) -> Self {
        Self {
            token: Secret::new(raw_token),
        }
    }

    /// Exposes the secret to `action` only. The borrow cannot outlive the call.
    pub fn use_secret<F, R>(&self, action: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        action(self.token.expose_secret())
    }

    /// `Bearer <token>` in a buffer that is wiped when dropped.
    pub fn bearer_header(&self) -> Zeroizing<String> {
        self.use_secret(|raw| Zeroizing::new(format!("Bearer {}", String::from_utf8_lossy(raw))))
    }

    pub fn is_blank(&self) -> bool {
        self.use_secret(|raw| raw.iter().all(|b| b.is_ascii_whitespace()))
    }
}

impl Clone for ProviderCredential {
    fn clone(&self) -> Self {
        self.use_secret(|raw| Self::new(raw.to_vec()))
    }
}

impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderCredential([REDACTED])")
    }
}

// ==============================================================================
// Token Sources
// ==============================================================================

/// Reads `HETZNER_TOKEN`, `DIGITALOCEAN_TOKEN`, ... at the moment a token is needed.
pub struct EnvTokenSource;

impl TokenSource for EnvTokenSource {
    fn token_for(&self, kind: ProviderKind) -> Option<ProviderCredential> {
        let raw = Zeroizing::new(env::var(kind.token_env()).ok()?);
        let credential = ProviderCredential::new(raw.trim().as_bytes().to_vec());
        (!credential.is_blank()).then_some(credential)
    }
}

/// Fixed set of tokens, e.g. supplied by an agent tool call.
#[derive(Default)]
pub struct StaticTokenSource {
    tokens: HashMap<ProviderKind, ProviderCredential>,
}

impl StaticTokenSource {
    pub fn with(mut self, kind: ProviderKind, token: &str) -> Self {
        self.tokens.insert(kind, ProviderCredential::new(token.as_bytes().to_vec()));
        self
    }
}

impl TokenSource for StaticTokenSource {
    fn token_for(&self, kind: ProviderKind) -> Option<ProviderCredential> {
        self.tokens.get(&kind).cloned()
    }
}
