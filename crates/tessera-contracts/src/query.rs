//! Entry query filters and compliance reporting types.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anomaly::TimeWindow;
use crate::entry::EnhancedAuditLogEntry;

/// Filters for `query_entries`.  Every `None` field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryQuery {
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub block_heights: Option<RangeInclusive<u64>>,
    pub time_range: Option<TimeWindow>,
    /// Include entries that have not been sealed yet.  Ignored when
    /// `block_heights` is set, since pending entries have no height.
    pub include_pending: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl EntryQuery {
    /// Return true if `entry` passes every field filter.
    ///
    /// Paging (`offset`/`limit`) is applied by the caller after filtering.
    pub fn matches(&self, entry: &EnhancedAuditLogEntry) -> bool {
        let e = &entry.entry;
        if let Some(event_type) = &self.event_type {
            if &e.event_type != event_type {
                return false;
            }
        }
        if self.user_id.is_some() && e.user_id != self.user_id {
            return false;
        }
        if self.tenant_id.is_some() && e.tenant_id != self.tenant_id {
            return false;
        }
        match (&self.block_heights, entry.block_height) {
            (Some(range), Some(height)) if !range.contains(&height) => return false,
            (Some(_), None) => return false,
            (None, None) if !self.include_pending => return false,
            _ => {}
        }
        if let Some(window) = &self.time_range {
            if !window.contains(e.timestamp) {
                return false;
            }
        }
        true
    }
}

/// Aggregate statistics over the verified entries in a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub generated_at: DateTime<Utc>,
    pub period: TimeWindow,
    pub tenant_id: Option<String>,
    pub total_events: usize,
    pub failed_operations: usize,
    pub security_incidents: usize,
    pub gdpr_requests: usize,
    /// False if any block in the chain failed verification.  Entries from
    /// invalid blocks are never counted.
    pub chain_valid: bool,
}
