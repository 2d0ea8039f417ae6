//! # tessera-anomaly
//!
//! A TOML-configured threshold detector for tessera audit chains.
//!
//! ## Overview
//!
//! [`ThresholdDetector`] implements the
//! [`AnomalyDetector`](tessera_core::traits::AnomalyDetector) trait.  The
//! chain service hands it only entries from blocks that passed verification;
//! the detector itself never looks at hashes.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use tessera_anomaly::ThresholdDetector;
//!
//! let detector = ThresholdDetector::from_file(Path::new("thresholds.toml"))?;
//! // Pass `Box::new(detector)` to `tessera_chain::AuditChain::open(...)`.
//! ```
//!
//! ## Output order
//!
//! Findings are grouped by rule in a fixed order and, within a rule, by
//! actor name.  Identical input always yields identical output.

pub mod engine;
pub mod rule;

pub use engine::ThresholdDetector;
pub use rule::{
    CountRule, CrossTenantRule, DetectorConfig, FailureBurstRule, OffHoursRule, RateSpikeRule, MAX_WINDOW_MINUTES,
};

// ── Tests ─────────────────────────────────────────────────────────────────────
