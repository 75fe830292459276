//! Subscription filter expressions.
//!
//! ```text
//! ""  or  "*"                      everything in the session realm
//! [<realm>+][<schema>://]<tag>(:<tag>)*
//! ```
//!
//! Schema `*` matches any schema. A key matches when it is in the session
//! realm, the schema matches (if given) and it carries every filter tag.

use super::HandshakeError;
use crate::encoding::key::{is_realm, is_schema};
use crate::model::Key;

const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFilter {
    realm: String,
    schema: Option<String>,
    tags: Vec<String>,
}

impl SubscriptionFilter {
    /// Parses `expr` for a session authenticated in `realm`.
    pub fn parse(realm: &str, expr: &str) -> Result<Self, HandshakeError> {
        let invalid = || HandshakeError::InvalidFilter(expr.to_string());
        let mut rest = expr.trim();

        if let Some((prefix, tail)) = rest.split_once('+') {
            if !is_realm(prefix) || prefix != realm {
                return Err(invalid());
            }
            rest = tail;
        }

        let mut schema = None;
        if let Some((name, tail)) = rest.split_once("://") {
            if name != WILDCARD {
                if !is_schema(name) {
                    return Err(invalid());
                }
                schema = Some(name.to_string());
            }
            rest = tail;
        }

        let tags = if rest.is_empty() || rest == WILDCARD {
            Vec::new()
        } else {
            let tags: Vec<String> = rest.to_lowercase().split(':').map(str::to_string).collect();
            if tags.iter().any(String::is_empty) {
                return Err(invalid());
            }
            tags
        };

        Ok(Self {
            realm: realm.to_string(),
            schema,
            tags,
        })
    }

    pub fn matches(&self, key: &Key) -> bool {
        key.realm() == self.realm
            && self.schema.as_deref().map_or(true, |s| s == key.schema())
            && self.tags.iter().all(|t| key.has_tag(t))
    }
}
