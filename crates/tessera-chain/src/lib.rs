//! # tessera-chain
//!
//! A tamper-evident audit chain.
//!
//! ## Overview
//!
//! Every recorded event becomes an entry authenticated with HMAC-SHA256
//! under a shared key and linked to the previous pending entry by SHA-256.
//! Sealing collects the pending entries into a block whose Merkle root
//! commits to their hashes and whose hash links to the previous block.
//! Altering any stored byte, whether an entry field, an entry hash or a
//! block header, is caught by `AuditChain::verify_chain`, which reports
//! every affected block and entry rather than stopping at the first.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tessera_chain::{AuditChain, ChainConfig, ChainKey, MemoryAuditStore};
//! use tessera_contracts::entry::EntryFields;
//!
//! let chain = AuditChain::open(
//!     Arc::new(MemoryAuditStore::new()),
//!     ChainKey::from_hex(&key_hex)?,
//!     ChainConfig::default(),
//!     Box::new(detector),
//! )?;
//! chain.record_entry(EntryFields::login_attempt("alice", true, None))?;
//! let block = chain.seal_block()?;
//! assert!(chain.verify_chain()?.is_valid);
//! ```

pub mod config;
pub mod file;
pub mod hashing;
pub mod memory;
pub mod merkle;
pub mod recorder;
pub mod sealer;
pub mod service;
pub mod verifier;

pub use config::ChainConfig;
pub use file::JsonlAuditStore;
pub use hashing::ChainKey;
pub use memory::MemoryAuditStore;
pub use recorder::EntryRecorder;
pub use sealer::ChainBlockSealer;
pub use service::{AuditChain, INTEGRITY_VIOLATION_ANOMALY};
pub use verifier::ChainVerifier;

// ── Tests ─────────────────────────────────────────────────────────────────────
