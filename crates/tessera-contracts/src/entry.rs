//! Audit entry types.
//!
//! `EntryFields` is what a caller hands to the recorder.  `AuditLogEntry` is
//! the authenticated, immutable record the recorder produces, and
//! `EnhancedAuditLogEntry` wraps it with the chain linkage: the hash of the
//! previous entry in the same pending sequence, and the block coordinates
//! stamped at sealing time.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a single audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub uuid::Uuid);

impl EntryId {
    /// Create a new, unique entry ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single metadata value.
///
/// Metadata is a closed set of scalar variants nested in string-keyed maps.
/// Maps use `BTreeMap` so the canonical encoding has a stable key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    /// Must be finite; NaN and infinities are rejected by the recorder.
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Map(BTreeMap<String, MetadataValue>),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// Entry metadata: key → value, ordered by key.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Well-known event types.
///
/// Entries carry their event type as a plain string so callers are not
/// limited to this list; these are the values the anomaly rules and the
/// compliance report know how to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    FailedLogin,
    SuccessfulLogin,
    Logout,
    UnauthorizedAccess,
    SuspiciousActivity,
    BruteForceAttempt,
    DataRead,
    DataExport,
    DataImport,
    DataDelete,
    RateLimitExceeded,
    GdprDataExport,
    GdprDataDeletion,
    GdprDataCorrection,
    KeyGenerated,
    KeyRotated,
    KeyCompromised,
    SecurityAlert,
    PasswordChanged,
    AccountLocked,
    AccountUnlocked,
}

impl AuditEventType {
    /// The string stored in `AuditLogEntry::event_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FailedLogin => "failed_login",
            Self::SuccessfulLogin => "successful_login",
            Self::Logout => "logout",
            Self::UnauthorizedAccess => "unauthorized_access",
            Self::SuspiciousActivity => "suspicious_activity",
            Self::BruteForceAttempt => "brute_force_attempt",
            Self::DataRead => "data_read",
            Self::DataExport => "data_export",
            Self::DataImport => "data_import",
            Self::DataDelete => "data_delete",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::GdprDataExport => "gdpr_data_export",
            Self::GdprDataDeletion => "gdpr_data_deletion",
            Self::GdprDataCorrection => "gdpr_data_correction",
            Self::KeyGenerated => "key_generated",
            Self::KeyRotated => "key_rotated",
            Self::KeyCompromised => "key_compromised",
            Self::SecurityAlert => "security_alert",
            Self::PasswordChanged => "password_changed",
            Self::AccountLocked => "account_locked",
            Self::AccountUnlocked => "account_unlocked",
        }
    }

    /// Event types counted as security incidents in compliance reports.
    pub fn is_security_incident(event_type: &str) -> bool {
        [
            Self::UnauthorizedAccess,
            Self::SuspiciousActivity,
            Self::FailedLogin,
            Self::BruteForceAttempt,
            Self::KeyCompromised,
        ]
        .iter()
        .any(|t| t.as_str() == event_type)
    }

    /// Event types counted as GDPR requests in compliance reports.
    pub fn is_gdpr_request(event_type: &str) -> bool {
        [
            Self::GdprDataExport,
            Self::GdprDataDeletion,
            Self::GdprDataCorrection,
        ]
        .iter()
        .any(|t| t.as_str() == event_type)
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result string recorded for a successful operation.
pub const RESULT_SUCCESS: &str = "success";

/// The result string recorded for a failed operation.
pub const RESULT_FAILURE: &str = "failure";

/// Caller-supplied fields for a new entry.
///
/// `event_type`, `action` and `result` are required and must be non-empty;
/// everything else is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryFields {
    pub event_type: String,
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: String,
    pub result: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl EntryFields {
    /// Start a new field set with the three required values.
    pub fn new(
        event_type: impl Into<String>,
        action: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            action: action.into(),
            result: result.into(),
            ..Self::default()
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// A login attempt, successful or not.
    ///
    /// A failure reason, when given, lands in `metadata.failure_reason`.
    pub fn login_attempt(user_id: impl Into<String>, success: bool, failure_reason: Option<&str>) -> Self {
        let (event_type, result) = if success {
            (AuditEventType::SuccessfulLogin, RESULT_SUCCESS)
        } else {
            (AuditEventType::FailedLogin, RESULT_FAILURE)
        };
        let mut fields = Self::new(event_type.as_str(), "login", result).user(user_id);
        if let Some(reason) = failure_reason {
            fields = fields.meta("failure_reason", reason);
        }
        fields
    }

    /// A security event whose action defaults to the event type name.
    pub fn security_event(event_type: AuditEventType, user_id: Option<&str>) -> Self {
        let mut fields = Self::new(event_type.as_str(), event_type.as_str(), RESULT_SUCCESS);
        fields.user_id = user_id.map(str::to_string);
        fields
    }

    /// A key-management operation against `key_id`.
    pub fn key_operation(
        event_type: AuditEventType,
        key_id: impl Into<String>,
        user_id: Option<&str>,
        success: bool,
        error: Option<&str>,
    ) -> Self {
        let result = if success { RESULT_SUCCESS } else { RESULT_FAILURE };
        let mut fields = Self::new(event_type.as_str(), event_type.as_str(), result)
            .resource("encryption_key", key_id);
        fields.user_id = user_id.map(str::to_string);
        if let Some(error) = error {
            fields = fields.meta("error", error);
        }
        fields
    }
}

/// An authenticated audit entry.
///
/// Immutable once produced.  `auth_tag` is the HMAC-SHA256 (hex) over the
/// entry's canonical content; `entry_hash` is SHA-256 over the tag and the
/// previous entry's hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: EntryId,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: String,
    pub result: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    /// SHA-256 (hex) of `auth_tag ‖ previous_entry_hash`.
    pub entry_hash: String,
    /// HMAC-SHA256 (hex) over the canonical content.
    pub auth_tag: String,
}

/// An audit entry together with its chain linkage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedAuditLogEntry {
    #[serde(flatten)]
    pub entry: AuditLogEntry,

    /// `entry_hash` of the previous entry in the same pending sequence, or
    /// `SEQUENCE_START_HASH` for the first entry of a block.
    pub previous_entry_hash: String,

    /// Hash of the block that sealed this entry.  `None` while pending.
    pub block_hash: Option<String>,

    /// Height of the block that sealed this entry.  `None` while pending.
    pub block_height: Option<u64>,
}

impl EnhancedAuditLogEntry {
    pub fn id(&self) -> &EntryId {
        &self.entry.id
    }

    pub fn entry_hash(&self) -> &str {
        &self.entry.entry_hash
    }

    /// True once a block has stamped this entry.
    pub fn is_sealed(&self) -> bool {
        self.block_height.is_some()
    }
}
