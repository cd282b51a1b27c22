//! Identity keys and content digests.
//!
//! A key is the SHA-256 of the domain name followed by the record's
//! allow-listed identity fields, each as `name=value`, separated by the
//! ASCII unit separator. Field values are already normalised by the
//! record types (ids canonicalised, whitespace trimmed), so two fetches
//! of the same logical entity always hash the same.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::models::{Domain, Entity};

const SEPARATOR: u8 = 0x1f;

/// Stable identifier of one logical entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for IdentityKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hash_fields(domain: Domain, fields: &[(&'static str, String)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_str().as_bytes());
    for (name, value) in fields {
        hasher.update([SEPARATOR]);
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Derive the identity key of a record.
///
/// Fails when a required identity field is empty; such a record cannot be
/// tracked and is skipped by the caller.
pub fn fingerprint<E: Entity>(entity: &E) -> Result<IdentityKey> {
    let fields = entity.identity_fields();
    for required in E::REQUIRED_FIELDS {
        let present = fields
            .iter()
            .any(|(name, value)| name == required && !value.trim().is_empty());
        if !present {
            return Err(AppError::Identity {
                domain: E::DOMAIN,
                field: required,
            });
        }
    }
    Ok(IdentityKey(hash_fields(E::DOMAIN, &fields)))
}

/// Hash of the record's significant fields.
pub fn content_digest<E: Entity>(entity: &E) -> String {
    hash_fields(E::DOMAIN, &entity.significant_fields())
}

/// A record together with its key and digest, computed once.
#[derive(Debug, Clone)]
pub struct Fingerprinted<E> {
    pub key: IdentityKey,
    pub digest: String,
    pub entity: E,
}

impl<E: Entity> Fingerprinted<E> {
    pub fn new(entity: E) -> Result<Self> {
        let key = fingerprint(&entity)?;
        let digest = content_digest(&entity);
        Ok(Self {
            key,
            digest,
            entity,
        })
    }
}
