//! Threshold-driven anomaly detector.
//!
//! `ThresholdDetector` loads a `DetectorConfig` from a TOML string or file
//! and implements the `AnomalyDetector` trait from tessera-core.
//!
//! Rules run in a fixed order and group by actor through `BTreeMap`s, so the
//! same entries always produce the same findings in the same order:
//!
//! 1. event-rate spike per actor, then per IP address
//! 2. failure burst followed by a privileged success
//! 3. cross-tenant access
//! 4. failed logins, data access, data exports (per-actor counts)
//! 5. distinct IP addresses per actor per clock hour
//! 6. off-hours activity
//!
//! Entries without a `user_id` are grouped under `anonymous`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use tracing::debug;

use tessera_contracts::{
    anomaly::{AnomalyFinding, Severity, TimeWindow},
    entry::{AuditEventType, EnhancedAuditLogEntry, RESULT_FAILURE, RESULT_SUCCESS},
    error::{LedgerError, LedgerResult},
};
use tessera_core::traits::AnomalyDetector;

use crate::rule::{CountRule, DetectorConfig};

const ANONYMOUS: &str = "anonymous";

/// An `AnomalyDetector` whose thresholds come from a TOML document.
#[derive(Debug, Default)]
pub struct ThresholdDetector {
    config: DetectorConfig,
}

impl ThresholdDetector {
    /// Build a detector from an already-parsed configuration.
    ///
    /// Returns `LedgerError::Config` if the thresholds fail
    /// `DetectorConfig::validate`.
    pub fn new(config: DetectorConfig) -> LedgerResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Parse `s` as TOML and build a `ThresholdDetector`.
    ///
    /// Returns `LedgerError::Config` if the TOML is malformed, does not
    /// match the `DetectorConfig` schema, or fails validation.
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        let config: DetectorConfig = toml::from_str(s).map_err(|e| LedgerError::Config {
            reason: format!("failed to parse detector TOML: {}", e),
        })?;
        Self::new(config)
    }

    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LedgerError::Config {
            reason: format!("failed to read detector file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn minutes(value: i64) -> LedgerResult<Duration> {
    Duration::try_minutes(value).ok_or_else(|| LedgerError::Config {
        reason: format!("{} minutes is out of range", value),
    })
}

/// `[instant - length, end)`, or a validation error if the start underflows.
fn reaching_back(instant: DateTime<Utc>, length: Duration, end: DateTime<Utc>) -> LedgerResult<TimeWindow> {
    let start = instant
        .checked_sub_signed(length)
        .ok_or_else(|| LedgerError::validation("window", "window start is out of range"))?;
    Ok(TimeWindow::new(start, end))
}

fn actor(entry: &EnhancedAuditLogEntry) -> &str {
    entry.entry.user_id.as_deref().unwrap_or(ANONYMOUS)
}

fn named(actor: &str) -> Option<String> {
    (actor != ANONYMOUS).then(|| actor.to_string())
}

fn in_tenant(entry: &EnhancedAuditLogEntry, tenant: Option<&str>) -> bool {
    tenant.is_none() || entry.entry.tenant_id.as_deref() == tenant
}

fn finding(
    anomaly_type: &str,
    severity: Severity,
    description: String,
    user: Option<String>,
    tenant: Option<&str>,
    timestamp: DateTime<Utc>,
) -> AnomalyFinding {
    AnomalyFinding {
        anomaly_type: anomaly_type.to_string(),
        severity,
        description,
        affected_user_id: user,
        affected_tenant_id: tenant.map(str::to_string),
        affected_ip_address: None,
        timestamp,
    }
}

type KeyFn = fn(&EnhancedAuditLogEntry) -> Option<&str>;

fn user_key(entry: &EnhancedAuditLogEntry) -> Option<&str> {
    entry.entry.user_id.as_deref()
}

fn ip_key(entry: &EnhancedAuditLogEntry) -> Option<&str> {
    entry.entry.ip_address.as_deref()
}

fn by_actor<'a>(entries: &[&'a EnhancedAuditLogEntry]) -> BTreeMap<&'a str, Vec<&'a EnhancedAuditLogEntry>> {
    let mut grouped: BTreeMap<&str, Vec<&EnhancedAuditLogEntry>> = BTreeMap::new();
    for &entry in entries {
        grouped.entry(actor(entry)).or_default().push(entry);
    }
    grouped
}

// ── Rules ─────────────────────────────────────────────────────────────────────

impl ThresholdDetector {
    fn rate_spikes(
        &self,
        current: &[&EnhancedAuditLogEntry],
        baseline: &[&EnhancedAuditLogEntry],
        window: &TimeWindow,
        tenant: Option<&str>,
        out: &mut Vec<AnomalyFinding>,
    ) {
        let rule = &self.config.rate_spike;
        if !rule.enabled {
            return;
        }
        // Baseline counts are scaled to the analysed window's length.
        let scale = window.duration().num_seconds() as f64 / (rule.baseline_minutes * 60) as f64;

        let dimensions: [(&str, KeyFn); 2] = [("actor", user_key), ("ip", ip_key)];

        for (dimension, key_of) in dimensions {
            let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
            for entry in current {
                if let Some(key) = key_of(*entry) {
                    counts.entry(key).or_default().0 += 1;
                }
            }
            for entry in baseline {
                if let Some(key) = key_of(*entry) {
                    if let Some(slot) = counts.get_mut(key) {
                        slot.1 += 1;
                    }
                }
            }

            for (key, (count, base)) in counts {
                if count < rule.min_events {
                    continue;
                }
                let expected = base as f64 * scale;
                if expected > 0.0 && (count as f64) < expected * rule.multiplier {
                    continue;
                }
                let severity = if expected == 0.0 || count as f64 >= expected * rule.multiplier * 2.0 {
                    Severity::High
                } else {
                    Severity::Medium
                };
                let mut f = finding(
                    "event_rate_spike",
                    severity,
                    format!("{dimension} {key} produced {count} events against a baseline expectation of {expected:.1}"),
                    None,
                    tenant,
                    window.end,
                );
                if dimension == "actor" {
                    f.affected_user_id = Some(key.to_string());
                } else {
                    f.affected_ip_address = Some(key.to_string());
                }
                out.push(f);
            }
        }
    }

    fn failure_bursts(
        &self,
        scoped: &[&EnhancedAuditLogEntry],
        within: Duration,
        window: &TimeWindow,
        tenant: Option<&str>,
        out: &mut Vec<AnomalyFinding>,
    ) {
        let rule = &self.config.failure_burst;
        if !rule.enabled {
            return;
        }
        for (actor, mut entries) in by_actor(scoped) {
            entries.sort_by_key(|e| e.entry.timestamp);
            for (i, entry) in entries.iter().enumerate() {
                let e = &entry.entry;
                if e.result != RESULT_SUCCESS
                    || !window.contains(e.timestamp)
                    || !rule.privileged_actions.iter().any(|a| a == &e.action)
                {
                    continue;
                }
                let failures = entries[..i]
                    .iter()
                    .filter(|p| {
                        p.entry.result == RESULT_FAILURE
                            && e.timestamp.signed_duration_since(p.entry.timestamp) <= within
                    })
                    .count();
                if failures >= rule.min_failures {
                    out.push(finding(
                        "failure_burst_then_privileged_success",
                        Severity::High,
                        format!(
                            "{actor} succeeded at privileged action '{}' after {failures} failures within {} minutes",
                            e.action, rule.within_minutes
                        ),
                        named(actor),
                        tenant,
                        e.timestamp,
                    ));
                }
            }
        }
    }

    /// Cross-tenant access looks at every tenant, not only the filtered
    /// one; the filter only decides which actors are reported.
    fn cross_tenant(
        &self,
        unscoped: &[&EnhancedAuditLogEntry],
        window: &TimeWindow,
        tenant: Option<&str>,
        out: &mut Vec<AnomalyFinding>,
    ) {
        let rule = &self.config.cross_tenant;
        if !rule.enabled {
            return;
        }
        let mut tenants: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for entry in unscoped {
            if let (Some(user), Some(t)) = (entry.entry.user_id.as_deref(), entry.entry.tenant_id.as_deref()) {
                tenants.entry(user).or_default().insert(t);
            }
        }

        for (user, seen) in tenants {
            if seen.len() < 2 || rule.allowed_actors.iter().any(|a| a == user) {
                continue;
            }
            if let Some(t) = tenant {
                if !seen.contains(t) {
                    continue;
                }
            }
            let list: Vec<&str> = seen.into_iter().collect();
            out.push(finding(
                "cross_tenant_access",
                Severity::High,
                format!("{user} accessed {} tenants: {}", list.len(), list.join(", ")),
                Some(user.to_string()),
                tenant,
                window.end,
            ));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn count_rule(
        rule: &CountRule,
        anomaly_type: &str,
        severity: Severity,
        what: &str,
        grouped: &BTreeMap<&str, Vec<&EnhancedAuditLogEntry>>,
        matches: impl Fn(&EnhancedAuditLogEntry) -> bool,
        window: &TimeWindow,
        tenant: Option<&str>,
        out: &mut Vec<AnomalyFinding>,
    ) {
        if !rule.enabled {
            return;
        }
        for (actor, entries) in grouped {
            let count = entries.iter().filter(|e| matches(**e)).count();
            if count >= rule.threshold {
                out.push(finding(
                    anomaly_type,
                    severity,
                    format!("{actor} had {count} {what}"),
                    named(actor),
                    tenant,
                    window.end,
                ));
            }
        }
    }

    fn ip_addresses(
        &self,
        grouped: &BTreeMap<&str, Vec<&EnhancedAuditLogEntry>>,
        tenant: Option<&str>,
        out: &mut Vec<AnomalyFinding>,
    ) {
        let rule = &self.config.ip_addresses;
        if !rule.enabled {
            return;
        }
        for (actor, entries) in grouped {
            let mut per_hour: BTreeMap<DateTime<Utc>, BTreeSet<&str>> = BTreeMap::new();
            for entry in entries {
                let Some(ip) = entry.entry.ip_address.as_deref() else {
                    continue;
                };
                let hour = entry
                    .entry
                    .timestamp
                    .duration_trunc(Duration::hours(1))
                    .unwrap_or(entry.entry.timestamp);
                per_hour.entry(hour).or_default().insert(ip);
            }
            for (hour, ips) in per_hour {
                if ips.len() >= rule.threshold {
                    out.push(finding(
                        "multiple_ip_addresses",
                        Severity::Medium,
                        format!("{actor} used {} distinct IP addresses within one hour", ips.len()),
                        named(actor),
                        tenant,
                        hour,
                    ));
                }
            }
        }
    }
}

impl AnomalyDetector for ThresholdDetector {
    fn lookback(&self) -> Duration {
        let longest = self
            .config
            .rate_spike
            .baseline_minutes
            .max(self.config.failure_burst.within_minutes);
        minutes(longest).unwrap_or_else(|_| Duration::zero())
    }

    fn detect(
        &self,
        entries: &[EnhancedAuditLogEntry],
        window: &TimeWindow,
        tenant: Option<&str>,
    ) -> LedgerResult<Vec<AnomalyFinding>> {
        let within = minutes(self.config.failure_burst.within_minutes)?;
        let baseline_window = reaching_back(
            window.start,
            minutes(self.config.rate_spike.baseline_minutes)?,
            window.start,
        )?;
        let burst_window = reaching_back(window.start, within, window.end)?;

        let unscoped: Vec<&EnhancedAuditLogEntry> =
            entries.iter().filter(|e| window.contains(e.entry.timestamp)).collect();
        let current: Vec<&EnhancedAuditLogEntry> =
            unscoped.iter().copied().filter(|e| in_tenant(e, tenant)).collect();
        let baseline: Vec<&EnhancedAuditLogEntry> = entries
            .iter()
            .filter(|e| baseline_window.contains(e.entry.timestamp) && in_tenant(e, tenant))
            .collect();
        let burst_scope: Vec<&EnhancedAuditLogEntry> = entries
            .iter()
            .filter(|e| burst_window.contains(e.entry.timestamp) && in_tenant(e, tenant))
            .collect();

        let mut out = Vec::new();
        self.rate_spikes(&current, &baseline, window, tenant, &mut out);
        self.failure_bursts(&burst_scope, within, window, tenant, &mut out);
        self.cross_tenant(&unscoped, window, tenant, &mut out);

        let grouped = by_actor(&current);
        let failed_login = AuditEventType::FailedLogin.as_str();
        let data_read = AuditEventType::DataRead.as_str();
        let data_export = AuditEventType::DataExport.as_str();
        Self::count_rule(
            &self.config.failed_logins,
            "multiple_failed_logins",
            Severity::High,
            "failed login attempts",
            &grouped,
            |e| e.entry.event_type == failed_login,
            window,
            tenant,
            &mut out,
        );
        Self::count_rule(
            &self.config.data_access,
            "excessive_data_access",
            Severity::Medium,
            "data accesses",
            &grouped,
            |e| e.entry.event_type == data_read || e.entry.event_type == data_export,
            window,
            tenant,
            &mut out,
        );
        Self::count_rule(
            &self.config.data_exports,
            "multiple_data_exports",
            Severity::High,
            "data exports",
            &grouped,
            |e| e.entry.event_type == data_export,
            window,
            tenant,
            &mut out,
        );
        self.ip_addresses(&grouped, tenant, &mut out);

        let off_hours = &self.config.off_hours;
        Self::count_rule(
            &CountRule {
                enabled: off_hours.enabled,
                threshold: off_hours.threshold,
            },
            "off_hours_activity",
            Severity::Low,
            "events outside business hours",
            &grouped,
            |e| {
                let hour = e.entry.timestamp.hour();
                hour < off_hours.start_hour || hour > off_hours.end_hour
            },
            window,
            tenant,
            &mut out,
        );

        debug!(
            entries = current.len(),
            baseline = baseline.len(),
            findings = out.len(),
            "threshold detector finished"
        );
        Ok(out)
    }
}
