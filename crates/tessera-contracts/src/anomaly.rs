//! Anomaly finding types.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// How serious a finding is.  Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A half-open UTC time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window of length `minutes` ending at `end`.
    ///
    /// Fails with `LedgerError::Validation` when `minutes` is negative or the
    /// start would fall outside the representable date range.
    pub fn last_minutes(end: DateTime<Utc>, minutes: i64) -> LedgerResult<Self> {
        let start = Duration::try_minutes(minutes)
            .filter(|_| minutes >= 0)
            .and_then(|length| end.checked_sub_signed(length))
            .ok_or_else(|| LedgerError::validation("window", format!("{} minutes is not a usable window length", minutes)))?;
        Ok(Self { start, end })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// A single behavioral outlier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyFinding {
    /// Stable rule identifier, e.g. `"event_rate_spike"`.
    pub anomaly_type: String,
    pub severity: Severity,
    pub description: String,
    pub affected_user_id: Option<String>,
    pub affected_tenant_id: Option<String>,
    pub affected_ip_address: Option<String>,
    /// The instant the finding refers to: the triggering entry's timestamp,
    /// or the end of the analysed window for aggregate rules.
    pub timestamp: DateTime<Utc>,
}
