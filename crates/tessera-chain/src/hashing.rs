//! Hashing and authentication primitives.
//!
//! Every digest in the chain is SHA-256, every authentication tag is
//! HMAC-SHA256, and both are carried as lowercase 64-character hex strings.
//!
//! Hash input layouts (bytes, in order):
//!
//! - auth tag:   canonical JSON of the entry content (see `canonical_entry_bytes`)
//! - entry hash: auth tag (hex, UTF-8) ‖ previous entry hash (hex, UTF-8)
//! - block hash: height as 8-byte little-endian ‖ previous hash (hex) ‖
//!   merkle root (hex) ‖ timestamp as RFC 3339 with nanoseconds

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};

use tessera_contracts::{
    entry::{AuditLogEntry, EntryId, Metadata},
    error::{LedgerError, LedgerResult},
};

type HmacSha256 = Hmac<Sha256>;

/// The shared secret entries are authenticated with.
///
/// Supplied by the caller; this crate never generates, stores or rotates
/// keys.  `Debug` never prints the key material.
#[derive(Clone)]
pub struct ChainKey(Vec<u8>);

impl ChainKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> LedgerResult<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(LedgerError::InvalidKey {
                reason: "key must not be empty".to_string(),
            });
        }
        Ok(Self(bytes))
    }

    /// Parse a hex-encoded key.
    pub fn from_hex(hex_key: &str) -> LedgerResult<Self> {
        let bytes = hex::decode(hex_key.trim()).map_err(|e| LedgerError::InvalidKey {
            reason: format!("key is not valid hex: {e}"),
        })?;
        Self::from_bytes(bytes)
    }

    fn mac(&self) -> LedgerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.0).map_err(|e| LedgerError::InvalidKey {
            reason: e.to_string(),
        })
    }
}

impl fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainKey(<{} bytes redacted>)", self.0.len())
    }
}

/// The authenticated view of an entry.  Field order here IS the canonical
/// order; absent optionals encode as JSON `null`.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    id: &'a EntryId,
    timestamp: &'a DateTime<Utc>,
    event_type: &'a str,
    user_id: Option<&'a str>,
    tenant_id: Option<&'a str>,
    resource_type: Option<&'a str>,
    resource_id: Option<&'a str>,
    action: &'a str,
    result: &'a str,
    ip_address: Option<&'a str>,
    user_agent: Option<&'a str>,
    metadata: &'a Metadata,
}

/// Deterministic byte representation of an entry's content.
///
/// Covers every caller-visible field but neither the tag nor any hash.
pub fn canonical_entry_bytes(entry: &AuditLogEntry) -> LedgerResult<Vec<u8>> {
    let canonical = CanonicalEntry {
        id: &entry.id,
        timestamp: &entry.timestamp,
        event_type: &entry.event_type,
        user_id: entry.user_id.as_deref(),
        tenant_id: entry.tenant_id.as_deref(),
        resource_type: entry.resource_type.as_deref(),
        resource_id: entry.resource_id.as_deref(),
        action: &entry.action,
        result: &entry.result,
        ip_address: entry.ip_address.as_deref(),
        user_agent: entry.user_agent.as_deref(),
        metadata: &entry.metadata,
    };
    serde_json::to_vec(&canonical).map_err(|e| LedgerError::Serialization {
        reason: format!("failed to canonicalize entry {}: {e}", entry.id),
    })
}

/// HMAC-SHA256 (hex) of the entry's canonical content under `key`.
pub fn compute_auth_tag(key: &ChainKey, entry: &AuditLogEntry) -> LedgerResult<String> {
    let mut mac = key.mac()?;
    mac.update(&canonical_entry_bytes(entry)?);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check the entry's stored `auth_tag` in constant time.
///
/// Any failure along the way (undecodable tag, unusable key, unencodable
/// content) counts as a mismatch.
pub fn verify_auth_tag(key: &ChainKey, entry: &AuditLogEntry) -> bool {
    let Ok(expected) = hex::decode(&entry.auth_tag) else {
        return false;
    };
    let Ok(bytes) = canonical_entry_bytes(entry) else {
        return false;
    };
    let Ok(mut mac) = key.mac() else {
        return false;
    };
    mac.update(&bytes);
    mac.verify_slice(&expected).is_ok()
}

/// SHA-256 (hex) of `auth_tag ‖ previous_entry_hash`.
pub fn compute_entry_hash(auth_tag: &str, previous_entry_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(auth_tag.as_bytes());
    hasher.update(previous_entry_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 (hex) over the block header fields.
pub fn compute_block_hash(
    height: u64,
    previous_hash: &str,
    merkle_root: &str,
    timestamp: &DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(height.to_le_bytes());
    hasher.update(previous_hash.as_bytes());
    hasher.update(merkle_root.as_bytes());
    hasher.update(timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 (hex) of `left ‖ right`, the Merkle node combiner.
pub(crate) fn hash_pair(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}
