//! Entry validation and authentication.
//!
//! `EntryRecorder` is pure: it turns caller fields plus the previous entry
//! hash into a fully populated entry.  Buffering, persistence and locking
//! belong to `AuditChain`, which calls `build` while holding the chain lock.

use std::net::IpAddr;

use chrono::Utc;
use tracing::warn;

use tessera_contracts::{
    entry::{AuditLogEntry, EnhancedAuditLogEntry, EntryFields, EntryId, Metadata, MetadataValue},
    error::{LedgerError, LedgerResult},
};

use crate::hashing::{compute_auth_tag, compute_entry_hash, ChainKey};

/// Nested metadata maps deeper than this are rejected.
const MAX_METADATA_DEPTH: usize = 8;

pub struct EntryRecorder {
    key: ChainKey,
    max_field_len: usize,
}

impl EntryRecorder {
    pub fn new(key: ChainKey, max_field_len: usize) -> Self {
        Self { key, max_field_len }
    }

    /// Reject missing or malformed fields before anything is hashed.
    pub fn validate(&self, fields: &EntryFields) -> LedgerResult<()> {
        self.check_text("event_type", &fields.event_type)?;
        self.check_text("action", &fields.action)?;
        self.check_text("result", &fields.result)?;

        for (name, value) in [
            ("user_id", &fields.user_id),
            ("tenant_id", &fields.tenant_id),
            ("resource_type", &fields.resource_type),
            ("resource_id", &fields.resource_id),
            ("user_agent", &fields.user_agent),
        ] {
            if let Some(value) = value {
                self.check_text(name, value)?;
            }
        }

        if let Some(ip) = &fields.ip_address {
            ip.parse::<IpAddr>()
                .map_err(|_| LedgerError::validation("ip_address", format!("'{ip}' is not an IP address")))?;
        }

        check_metadata(&fields.metadata, 1)
    }

    /// Validate `fields` and produce an authenticated entry linked to
    /// `previous_entry_hash`.  Block coordinates are left unset.
    pub fn build(&self, fields: EntryFields, previous_entry_hash: &str) -> LedgerResult<EnhancedAuditLogEntry> {
        if let Err(e) = self.validate(&fields) {
            warn!(event_type = %fields.event_type, error = %e, "rejected audit entry");
            return Err(e);
        }

        let mut entry = AuditLogEntry {
            id: EntryId::new(),
            timestamp: Utc::now(),
            event_type: fields.event_type,
            user_id: fields.user_id,
            tenant_id: fields.tenant_id,
            resource_type: fields.resource_type,
            resource_id: fields.resource_id,
            action: fields.action,
            result: fields.result,
            ip_address: fields.ip_address,
            user_agent: fields.user_agent,
            metadata: fields.metadata,
            entry_hash: String::new(),
            auth_tag: String::new(),
        };
        entry.auth_tag = compute_auth_tag(&self.key, &entry)?;
        entry.entry_hash = compute_entry_hash(&entry.auth_tag, previous_entry_hash);

        Ok(EnhancedAuditLogEntry {
            entry,
            previous_entry_hash: previous_entry_hash.to_string(),
            block_hash: None,
            block_height: None,
        })
    }

    fn check_text(&self, field: &str, value: &str) -> LedgerResult<()> {
        if value.trim().is_empty() {
            return Err(LedgerError::validation(field, "must not be empty"));
        }
        if value.len() > self.max_field_len {
            return Err(LedgerError::validation(
                field,
                format!("exceeds {} bytes", self.max_field_len),
            ));
        }
        if value.chars().any(char::is_control) {
            return Err(LedgerError::validation(field, "contains control characters"));
        }
        Ok(())
    }
}

fn check_metadata(metadata: &Metadata, depth: usize) -> LedgerResult<()> {
    if depth > MAX_METADATA_DEPTH {
        return Err(LedgerError::validation(
            "metadata",
            format!("nesting deeper than {MAX_METADATA_DEPTH} levels"),
        ));
    }
    for (key, value) in metadata {
        if key.trim().is_empty() {
            return Err(LedgerError::validation("metadata", "keys must not be empty"));
        }
        match value {
            MetadataValue::Number(n) if !n.is_finite() => {
                return Err(LedgerError::validation(
                    "metadata",
                    format!("value for '{key}' is not a finite number"),
                ));
            }
            MetadataValue::Map(inner) => check_metadata(inner, depth + 1)?,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tessera_contracts::block::SEQUENCE_START_HASH;

    use super::*;
    use crate::hashing::verify_auth_tag;

    fn recorder() -> EntryRecorder {
        EntryRecorder::new(ChainKey::from_bytes(b"k".to_vec()).unwrap(), 64)
    }

    fn assert_rejects(fields: EntryFields, expected_field: &str) {
        match recorder().build(fields, SEQUENCE_START_HASH) {
            Err(LedgerError::Validation { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("expected Validation on {expected_field}, got {other:?}"),
        }
    }

    #[test]
    fn builds_authenticated_unsealed_entry() {
        let entry = recorder()
            .build(EntryFields::new("data_read", "read", "success").user("alice"), SEQUENCE_START_HASH)
            .unwrap();

        assert_eq!(entry.previous_entry_hash, SEQUENCE_START_HASH);
        assert!(entry.block_hash.is_none());
        assert!(entry.block_height.is_none());
        assert_eq!(
            entry.entry.entry_hash,
            compute_entry_hash(&entry.entry.auth_tag, SEQUENCE_START_HASH)
        );
        assert!(verify_auth_tag(&ChainKey::from_bytes(b"k".to_vec()).unwrap(), &entry.entry));
    }

    #[test]
    fn rejects_missing_required_fields() {
        assert_rejects(EntryFields::new("", "read", "success"), "event_type");
        assert_rejects(EntryFields::new("data_read", "  ", "success"), "action");
        assert_rejects(EntryFields::new("data_read", "read", ""), "result");
    }

    #[test]
    fn rejects_malformed_optional_fields() {
        assert_rejects(EntryFields::new("data_read", "read", "success").user(""), "user_id");
        assert_rejects(EntryFields::new("data_read", "read", "success").ip("not-an-ip"), "ip_address");
        assert_rejects(
            EntryFields::new("data_read", "read", "success").user_agent("bad\nagent"),
            "user_agent",
        );
        assert_rejects(EntryFields::new("x".repeat(65), "read", "success"), "event_type");
    }

    #[test]
    fn accepts_ipv6_addresses() {
        let fields = EntryFields::new("data_read", "read", "success").ip("::1");
        assert!(recorder().validate(&fields).is_ok());
    }

    #[test]
    fn rejects_non_finite_and_deep_metadata() {
        assert_rejects(EntryFields::new("data_read", "read", "success").meta("ratio", f64::NAN), "metadata");

        let mut nested = MetadataValue::Integer(1);
        for _ in 0..MAX_METADATA_DEPTH {
            nested = MetadataValue::Map([("k".to_string(), nested)].into_iter().collect());
        }
        assert_rejects(EntryFields::new("data_read", "read", "success").meta("deep", nested), "metadata");
    }
}
