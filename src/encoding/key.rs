//! Address codec.
//!
//! Parses `<realm>+<schema>://<tag>(:<tag>)*` into a canonical [`Key`].
//! Tags are lowercased and sorted; duplicates are kept.

use crate::model::Key;

const SCHEMA_SEPARATOR: &str = "://";
const TAG_SEPARATOR: char = ':';

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Address parse failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Wrong Eos tracking address format \"{0}\"")]
    InvalidAddress(String),
}

/// Parses an address into its canonical key.
pub fn parse_key(address: &str) -> Result<Key, AddressError> {
    let invalid = || AddressError::InvalidAddress(address.to_string());

    let (realm, rest) = address.split_once('+').ok_or_else(invalid)?;
    let (schema, tags) = rest.split_once(SCHEMA_SEPARATOR).ok_or_else(invalid)?;

    if !is_realm(realm) || !is_schema(schema) || tags.is_empty() {
        return Err(invalid());
    }

    let mut tags: Vec<String> = tags
        .to_lowercase()
        .split(TAG_SEPARATOR)
        .map(str::to_string)
        .collect();
    if tags.iter().any(String::is_empty) {
        return Err(invalid());
    }
    tags.sort();

    let path = format!("{}{}{}", schema, SCHEMA_SEPARATOR, tags.join(":"));
    let fqn = format!("{}+{}", realm, path);
    let hash_code = fnv1a_32(fqn.as_bytes());

    Ok(Key::from_parts(
        realm.to_string(),
        schema.to_string(),
        tags,
        path,
        fqn,
        hash_code,
    ))
}

/// Realm names: lowercase letters, digits, `-` and `_`.
pub fn is_realm(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// Schema names: lowercase letters and `-`.
pub fn is_schema(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_lowercase() || b == b'-')
}

/// 32-bit FNV-1a.
pub fn fnv1a_32(data: &[u8]) -> u32 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}
