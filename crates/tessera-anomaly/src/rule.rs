//! Detection thresholds and configuration schema.
//!
//! A `DetectorConfig` is deserialized from TOML.  Every section has a
//! default, so an empty document gives a working detector.
//!
//! Example in TOML:
//! ```toml
//! [rate_spike]
//! baseline_minutes = 120
//! multiplier = 4.0
//!
//! [failure_burst]
//! min_failures = 5
//! privileged_actions = ["grant_role", "export"]
//!
//! [cross_tenant]
//! allowed_actors = ["support-admin"]
//!
//! [off_hours]
//! enabled = false
//! ```

use serde::{Deserialize, Serialize};

use tessera_contracts::error::{LedgerError, LedgerResult};

/// Longest baseline or burst window accepted, in minutes (366 days).
pub const MAX_WINDOW_MINUTES: i64 = 366 * 24 * 60;

/// Event-rate spikes per actor and per IP address against the preceding
/// baseline window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateSpikeRule {
    pub enabled: bool,
    /// Length of the baseline window immediately before the analysed window.
    pub baseline_minutes: i64,
    /// A count at least `multiplier` times the baseline-scaled expectation
    /// is a spike.
    pub multiplier: f64,
    /// Counts below this are never reported, whatever the baseline.
    pub min_events: usize,
}

impl Default for RateSpikeRule {
    fn default() -> Self {
        Self {
            enabled: true,
            baseline_minutes: 60,
            multiplier: 3.0,
            min_events: 20,
        }
    }
}

/// A burst of failed results followed by a successful privileged action
/// from the same actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FailureBurstRule {
    pub enabled: bool,
    pub min_failures: usize,
    /// How far before the privileged success failures are counted.
    pub within_minutes: i64,
    pub privileged_actions: Vec<String>,
}

impl Default for FailureBurstRule {
    fn default() -> Self {
        Self {
            enabled: true,
            min_failures: 3,
            within_minutes: 10,
            privileged_actions: ["grant_role", "delete_user", "export", "rotate_key", "change_password"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// One actor touching more than one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrossTenantRule {
    pub enabled: bool,
    /// Actors expected to work across tenants (support staff, system jobs).
    pub allowed_actors: Vec<String>,
}

impl Default for CrossTenantRule {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_actors: Vec::new(),
        }
    }
}

/// A per-actor count over the window compared against one threshold.
///
/// When a count section is present in TOML its `threshold` is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountRule {
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    pub threshold: usize,
}

impl CountRule {
    fn with_threshold(threshold: usize) -> Self {
        Self {
            enabled: true,
            threshold,
        }
    }
}

fn enabled_default() -> bool {
    true
}

/// Activity outside business hours (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OffHoursRule {
    pub enabled: bool,
    pub threshold: usize,
    /// First business hour, inclusive.
    pub start_hour: u32,
    /// Last business hour, inclusive.
    pub end_hour: u32,
}

impl Default for OffHoursRule {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 10,
            start_hour: 8,
            end_hour: 18,
        }
    }
}

fn failed_logins_default() -> CountRule {
    CountRule::with_threshold(5)
}

fn data_access_default() -> CountRule {
    CountRule::with_threshold(100)
}

fn data_exports_default() -> CountRule {
    CountRule::with_threshold(3)
}

fn ip_addresses_default() -> CountRule {
    CountRule::with_threshold(3)
}

/// The top-level structure deserialized from a TOML threshold file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    #[serde(default)]
    pub rate_spike: RateSpikeRule,
    #[serde(default)]
    pub failure_burst: FailureBurstRule,
    #[serde(default)]
    pub cross_tenant: CrossTenantRule,
    /// `failed_login` events per actor.
    #[serde(default = "failed_logins_default")]
    pub failed_logins: CountRule,
    /// `data_read` and `data_export` events per actor.
    #[serde(default = "data_access_default")]
    pub data_access: CountRule,
    /// `data_export` events per actor.
    #[serde(default = "data_exports_default")]
    pub data_exports: CountRule,
    /// Distinct IP addresses per actor within one clock hour.
    #[serde(default = "ip_addresses_default")]
    pub ip_addresses: CountRule,
    #[serde(default)]
    pub off_hours: OffHoursRule,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            rate_spike: RateSpikeRule::default(),
            failure_burst: FailureBurstRule::default(),
            cross_tenant: CrossTenantRule::default(),
            failed_logins: failed_logins_default(),
            data_access: data_access_default(),
            data_exports: data_exports_default(),
            ip_addresses: ip_addresses_default(),
            off_hours: OffHoursRule::default(),
        }
    }
}

fn invalid(reason: String) -> LedgerError {
    LedgerError::Config { reason }
}

impl DetectorConfig {
    /// Reject thresholds that would make a rule fire on every actor or
    /// windows too long to subtract from a timestamp.
    pub fn validate(&self) -> LedgerResult<()> {
        let minutes = [
            ("rate_spike.baseline_minutes", self.rate_spike.baseline_minutes),
            ("failure_burst.within_minutes", self.failure_burst.within_minutes),
        ];
        for (name, value) in minutes {
            if !(1..=MAX_WINDOW_MINUTES).contains(&value) {
                return Err(invalid(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_WINDOW_MINUTES, value
                )));
            }
        }

        let multiplier = self.rate_spike.multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(invalid(format!(
                "rate_spike.multiplier must be a positive number, got {}",
                multiplier
            )));
        }

        let thresholds = [
            ("failure_burst.min_failures", self.failure_burst.min_failures),
            ("failed_logins.threshold", self.failed_logins.threshold),
            ("data_access.threshold", self.data_access.threshold),
            ("data_exports.threshold", self.data_exports.threshold),
            ("ip_addresses.threshold", self.ip_addresses.threshold),
            ("off_hours.threshold", self.off_hours.threshold),
        ];
        if let Some((name, _)) = thresholds.iter().find(|(_, value)| *value == 0) {
            return Err(invalid(format!("{} must be at least 1", name)));
        }

        let hours = &self.off_hours;
        if hours.start_hour > 23 || hours.end_hour > 23 || hours.start_hour > hours.end_hour {
            return Err(invalid(format!(
                "off_hours needs 0 <= start_hour <= end_hour <= 23, got {}..{}",
                hours.start_hour, hours.end_hour
            )));
        }
        Ok(())
    }
}
