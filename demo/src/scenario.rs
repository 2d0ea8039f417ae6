//! Record, seal, verify, tamper, re-verify.
//!
//! Runs against a scratch JSON-lines file so the tamper step edits real
//! persisted bytes, exactly as an attacker with file access would.

use std::path::Path;

use serde_json::Value;
use uuid::Uuid;

use tessera_chain::ChainKey;
use tessera_contracts::{
    entry::{AuditEventType, EntryFields, EntryId, RESULT_SUCCESS},
    error::{LedgerError, LedgerResult},
};

use crate::ChainArgs;

/// Used when neither `--key-hex` nor the environment supplies a key.
const DEMO_KEY: &[u8] = b"tessera-demo-key-not-for-production";

pub fn run(args: &ChainArgs) -> LedgerResult<bool> {
    let key = match args.key() {
        Ok(key) => key,
        Err(_) => ChainKey::from_bytes(DEMO_KEY)?,
    };
    let dir = std::env::temp_dir().join(format!("tessera-scenario-{}", Uuid::new_v4()));
    let path = dir.join("chain.jsonl");

    let outcome = walk_through(args, &path, key);
    let _ = std::fs::remove_dir_all(&dir);
    outcome
}

fn walk_through(args: &ChainArgs, path: &Path, key: ChainKey) -> LedgerResult<bool> {
    println!("=== Tamper-evidence walkthrough ===");
    println!("  store: {}", path.display());
    println!();

    let target = {
        let chain = args.open_at(path, key.clone())?;
        println!("  [1] Recording three entries for alice");
        let e1 = chain.record_entry(
            EntryFields::login_attempt("alice", true, None).tenant("acme").ip("192.0.2.10"),
        )?;
        let e2 = chain.record_entry(
            EntryFields::new(AuditEventType::DataRead.as_str(), "view-document", RESULT_SUCCESS)
                .user("alice")
                .tenant("acme")
                .resource("document", "doc-42"),
        )?;
        let e3 = chain.record_entry(
            EntryFields::login_attempt("alice", false, Some("bad password")).tenant("acme").ip("192.0.2.10"),
        )?;
        for (label, entry) in [("E1", &e1), ("E2", &e2), ("E3", &e3)] {
            println!("      {} {} {:<14} {}", label, entry.id(), entry.entry.event_type, entry.entry.result);
        }

        let block = chain.seal_block()?;
        println!("  [2] Sealed block {} ({} entries)", block.height, block.entries.len());
        println!("      merkle root: {}", block.merkle_root);

        let report = chain.verify_chain()?;
        println!(
            "  [3] Verification: valid={} ({} blocks, {} entries)",
            report.is_valid, report.blocks_checked, report.entries_checked
        );
        if !report.is_valid {
            return Ok(false);
        }
        e2.id().clone()
    };

    println!("  [4] Editing E2's result to \"failure\" directly in the store file");
    rewrite_result(path, &target, "failure")?;

    let chain = args.open_at(path, key)?;
    let report = chain.verify_chain()?;
    println!("  [5] Verification after tampering: valid={}", report.is_valid);
    println!("      invalid blocks:  {:?}", report.invalid_block_heights);
    for id in &report.invalid_entry_ids {
        println!("      invalid entry:   {}", id);
    }
    for violation in &report.violations {
        println!("      violation:       {:?} at block {}", violation.kind, violation.block_height);
    }
    println!();

    let caught = !report.is_valid
        && report.invalid_block_heights == [1]
        && report.invalid_entry_ids == [target];
    if caught {
        println!("Tampering with E2 was detected and pinned to block 1.");
    } else {
        println!("Tampering was NOT pinned to E2 as expected.");
    }
    Ok(caught)
}

/// Change `result` of the sealed copy of `target` in the JSON-lines file.
fn rewrite_result(path: &Path, target: &EntryId, result: &str) -> LedgerResult<()> {
    let io_err = |e: std::io::Error| LedgerError::storage(format!("{}: {}", path.display(), e));
    let json_err = |e: serde_json::Error| LedgerError::Serialization { reason: e.to_string() };

    let contents = std::fs::read_to_string(path).map_err(io_err)?;
    let target = target.to_string();
    let mut lines = Vec::new();
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let mut record: Value = serde_json::from_str(line).map_err(json_err)?;
        if record["kind"] == "block" {
            if let Some(entries) = record["record"]["entries"].as_array_mut() {
                for entry in entries.iter_mut().filter(|e| e["id"] == target.as_str()) {
                    entry["result"] = Value::from(result);
                }
            }
        }
        lines.push(serde_json::to_string(&record).map_err(json_err)?);
    }
    std::fs::write(path, lines.join("\n") + "\n").map_err(io_err)
}
