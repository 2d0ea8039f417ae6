//! # tessera-core
//!
//! The narrow capability traits the Tessera audit chain is assembled from:
//!
//! - `AuditStore`: durable, append-only persistence (external boundary)
//! - `AuditRecorder`: validates and authenticates a single event
//! - `AnomalyDetector`: scans verified entries for behavioral outliers
//!
//! The chain-aware service in `tessera-chain` composes these rather than
//! extending a base recorder.

pub mod traits;

pub use traits::{AnomalyDetector, AuditRecorder, AuditStore};
