//! Per-realm signature verification.
//!
//! Producers sign `hex(sha256(nonce ++ payload ++ secret))` with the secret
//! shared by their realm. Subscriber handshakes use the same scheme with
//! the filter expression in the payload position.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::model::Packet;

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Realm {0} not known")]
    UnknownRealm(String),

    #[error("Wrong signature for {0}")]
    SignatureMismatch(String),
}

/// Realm -> shared secret. Built once at startup, read-only afterwards.
#[derive(Clone, Default)]
pub struct RealmSecretTable {
    secrets: HashMap<String, String>,
}

impl RealmSecretTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a realm secret.
    pub fn with_realm(mut self, realm: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets.insert(realm.into(), secret.into());
        self
    }

    pub fn secret(&self, realm: &str) -> Option<&str> {
        self.secrets.get(realm).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Known realm names, sorted.
    pub fn realms(&self) -> Vec<&str> {
        let mut realms: Vec<&str> = self.secrets.keys().map(String::as_str).collect();
        realms.sort_unstable();
        realms
    }
}

impl FromIterator<(String, String)> for RealmSecretTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            secrets: iter.into_iter().collect(),
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for RealmSecretTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmSecretTable")
            .field("realms", &self.realms())
            .finish()
    }
}

/// Computes `hex(sha256(nonce ++ payload ++ secret))`.
pub fn sign(nonce: &str, payload: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(payload.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verifies packets and handshakes against a [`RealmSecretTable`].
#[derive(Debug, Clone)]
pub struct Authenticator {
    secrets: Arc<RealmSecretTable>,
}

impl Authenticator {
    pub fn new(secrets: RealmSecretTable) -> Self {
        Self {
            secrets: Arc::new(secrets),
        }
    }

    pub fn secrets(&self) -> &RealmSecretTable {
        &self.secrets
    }

    /// Verifies a decoded packet.
    pub fn verify(&self, packet: &Packet) -> Result<(), AuthError> {
        self.check(
            packet.realm(),
            &packet.nonce,
            &packet.message.payload,
            &packet.signature,
        )
    }

    /// Verifies a subscriber handshake; the filter takes the payload's place.
    pub fn verify_handshake(
        &self,
        realm: &str,
        nonce: &str,
        filter: &str,
        hash: &str,
    ) -> Result<(), AuthError> {
        self.check(realm, nonce, filter, hash)
    }

    fn check(&self, realm: &str, nonce: &str, payload: &str, signature: &str) -> Result<(), AuthError> {
        let secret = self
            .secrets
            .secret(realm)
            .ok_or_else(|| AuthError::UnknownRealm(realm.to_string()))?;

        let expected = sign(nonce, payload, secret);
        if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::SignatureMismatch(realm.to_string()))
        }
    }
}
