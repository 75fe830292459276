//! Core value types flowing through the broker.
//!
//! - `Key`: canonical, immutable form of a tag-based address
//! - `Message`: a key plus its opaque payload, what subscribers receive
//! - `Packet`: a message plus the producer's nonce and signature, only
//!   alive between datagram decode and dispatch

use std::fmt;

/// Canonical tag-based address.
///
/// Built by [`crate::encoding::key::parse_key`]; the derived fields
/// (`path`, `fqn`, `hash_code`) are computed once and never change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    realm: String,
    schema: String,
    tags: Vec<String>,
    path: String,
    fqn: String,
    hash_code: u32,
}

impl Key {
    pub(crate) fn from_parts(
        realm: String,
        schema: String,
        tags: Vec<String>,
        path: String,
        fqn: String,
        hash_code: u32,
    ) -> Self {
        Self {
            realm,
            schema,
            tags,
            path,
            fqn,
            hash_code,
        }
    }

    /// Tenant identifier.
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Event category.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Lowercased tags, sorted ascending, duplicates kept.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// `schema://tag:tag...`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `realm+schema://tag:tag...`
    pub fn fqn(&self) -> &str {
        &self.fqn
    }

    /// FNV-1a 32-bit hash of the fqn.
    pub fn hash_code(&self) -> u32 {
        self.hash_code
    }

    /// Returns true if the key carries the requested tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:x})", self.fqn, self.hash_code)
    }
}

/// A dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: Key,
    /// Opaque payload, may contain line breaks.
    pub payload: String,
}

impl Message {
    pub fn new(key: Key, payload: impl Into<String>) -> Self {
        Self {
            key,
            payload: payload.into(),
        }
    }
}

/// A decoded, not yet authenticated, inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub message: Message,
    pub nonce: String,
    pub signature: String,
}

impl Packet {
    pub fn new(message: Message, nonce: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            message,
            nonce: nonce.into(),
            signature: signature.into(),
        }
    }

    /// Realm of the packet's key.
    pub fn realm(&self) -> &str {
        self.message.key.realm()
    }
}
