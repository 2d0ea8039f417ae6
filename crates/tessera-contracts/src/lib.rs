//! # tessera-contracts
//!
//! Shared types and contracts for the Tessera tamper-evident audit chain.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions, chain constants and error types.

pub mod anomaly;
pub mod block;
pub mod entry;
pub mod error;
pub mod query;
pub mod verify;

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use anomaly::{Severity, TimeWindow};
    use entry::{
        AuditEventType, AuditLogEntry, EnhancedAuditLogEntry, EntryFields, EntryId, MetadataValue,
    };
    use error::LedgerError;
    use query::EntryQuery;

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn make_entry(user: &str, tenant: &str, height: Option<u64>) -> EnhancedAuditLogEntry {
        EnhancedAuditLogEntry {
            entry: AuditLogEntry {
                id: EntryId::new(),
                timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
                event_type: "data_read".to_string(),
                user_id: Some(user.to_string()),
                tenant_id: Some(tenant.to_string()),
                resource_type: None,
                resource_id: None,
                action: "read".to_string(),
                result: "success".to_string(),
                ip_address: None,
                user_agent: None,
                metadata: Default::default(),
                entry_hash: String::new(),
                auth_tag: String::new(),
            },
            previous_entry_hash: block::SEQUENCE_START_HASH.to_string(),
            block_hash: height.map(|_| "h".to_string()),
            block_height: height,
        }
    }

    // ── EntryFields builders ─────────────────────────────────────────────────

    #[test]
    fn login_attempt_failure_records_reason() {
        let fields = EntryFields::login_attempt("alice", false, Some("bad password"));
        assert_eq!(fields.event_type, "failed_login");
        assert_eq!(fields.action, "login");
        assert_eq!(fields.result, "failure");
        assert_eq!(fields.user_id.as_deref(), Some("alice"));
        assert_eq!(
            fields.metadata.get("failure_reason"),
            Some(&MetadataValue::Text("bad password".to_string()))
        );
    }

    #[test]
    fn key_operation_targets_encryption_key() {
        let fields = EntryFields::key_operation(AuditEventType::KeyRotated, "k-1", Some("ops"), true, None);
        assert_eq!(fields.resource_type.as_deref(), Some("encryption_key"));
        assert_eq!(fields.resource_id.as_deref(), Some("k-1"));
        assert_eq!(fields.result, "success");
        assert!(fields.metadata.is_empty());
    }

    #[test]
    fn event_type_classification() {
        assert!(AuditEventType::is_security_incident("unauthorized_access"));
        assert!(!AuditEventType::is_security_incident("data_read"));
        assert!(AuditEventType::is_gdpr_request("gdpr_data_deletion"));
        assert!(!AuditEventType::is_gdpr_request("data_export"));
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    /// Nested metadata keeps its variant types through JSON.
    #[test]
    fn nested_metadata_preserves_variants() {
        let fields = EntryFields::new("data_export", "export", "success")
            .meta("rows", 42i64)
            .meta("ratio", 0.5f64)
            .meta(
                "window",
                MetadataValue::Map(
                    [("from".to_string(), MetadataValue::Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))]
                        .into_iter()
                        .collect(),
                ),
            );

        let json = serde_json::to_string(&fields).unwrap();
        let decoded: EntryFields = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, fields);
    }

    // ── EntryQuery ───────────────────────────────────────────────────────────

    #[test]
    fn query_excludes_pending_by_default() {
        let query = EntryQuery::default();
        assert!(query.matches(&make_entry("alice", "t1", Some(1))));
        assert!(!query.matches(&make_entry("alice", "t1", None)));

        let with_pending = EntryQuery {
            include_pending: true,
            ..EntryQuery::default()
        };
        assert!(with_pending.matches(&make_entry("alice", "t1", None)));
    }

    #[test]
    fn query_filters_by_height_user_and_tenant() {
        let query = EntryQuery {
            user_id: Some("alice".to_string()),
            tenant_id: Some("t1".to_string()),
            block_heights: Some(2..=3),
            include_pending: true,
            ..EntryQuery::default()
        };
        assert!(query.matches(&make_entry("alice", "t1", Some(2))));
        assert!(!query.matches(&make_entry("alice", "t1", Some(4))));
        assert!(!query.matches(&make_entry("bob", "t1", Some(2))));
        assert!(!query.matches(&make_entry("alice", "t2", Some(3))));
        // A height range never matches a pending entry.
        assert!(!query.matches(&make_entry("alice", "t1", None)));
    }

    #[test]
    fn time_window_is_half_open() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let window = TimeWindow::new(start, start + Duration::minutes(1));
        assert!(window.contains(start));
        assert!(!window.contains(start + Duration::minutes(1)));
        assert_eq!(TimeWindow::last_minutes(window.end, 1).unwrap(), window);
    }

    #[test]
    fn time_window_rejects_unusable_lengths() {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert!(matches!(
            TimeWindow::last_minutes(end, i64::MAX),
            Err(LedgerError::Validation { .. })
        ));
        assert!(matches!(TimeWindow::last_minutes(end, -5), Err(LedgerError::Validation { .. })));
        assert_eq!(TimeWindow::last_minutes(end, 0).unwrap().duration(), Duration::zero());
    }

    #[test]
    fn severity_orders_by_seriousness() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    // ── Constants ────────────────────────────────────────────────────────────

    #[test]
    fn constants_are_64_hex_chars() {
        for c in [block::GENESIS_HASH, block::SEQUENCE_START_HASH, block::EMPTY_MERKLE_ROOT] {
            assert_eq!(c.len(), 64);
            assert!(c.chars().all(|ch| ch.is_ascii_hexdigit()));
        }
    }

    // ── LedgerError display messages ─────────────────────────────────────────

    #[test]
    fn error_validation_display() {
        let err = LedgerError::validation("action", "must not be empty");
        let msg = err.to_string();
        assert!(msg.contains("action"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn error_seal_conflict_display() {
        let err = LedgerError::SealConflict {
            attempted_height: 4,
            head_height: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("seal conflict"));
        assert!(msg.contains("attempted height 4"));
    }

    #[test]
    fn error_storage_display() {
        let msg = LedgerError::storage("disk full").to_string();
        assert!(msg.contains("audit storage failed"));
        assert!(msg.contains("disk full"));
    }
}
