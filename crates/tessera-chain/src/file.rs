//! Append-only JSON-lines implementation of `AuditStore`.
//!
//! Each line of the file is one `StoreRecord`: either a pending entry or a
//! sealed block (which carries its stamped entries).  Opening the store
//! replays the file into a `StoreState` mirror; writes are checked against
//! the mirror, appended, synced, and only then applied to the mirror.
//!
//! A write that fails is truncated back off the file.  If even the
//! truncation fails the store refuses further writes until it is reopened.
//!
//! Replay does NOT re-check hashes.  A file that was edited after the fact
//! still loads, so `ChainVerifier` can report what changed.  A block that
//! does not extend the replayed tip is logged and kept for the same reason.
//! An unterminated, unparseable last line is the remains of an interrupted
//! append and is cut off.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tessera_contracts::{
    block::AuditChainBlock,
    entry::EnhancedAuditLogEntry,
    error::{LedgerError, LedgerResult},
};
use tessera_core::traits::AuditStore;

use crate::memory::{lock_state, StoreState};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
enum StoreRecord {
    Entry(EnhancedAuditLogEntry),
    Block(AuditChainBlock),
}

struct FileState {
    mirror: StoreState,
    file: File,
    /// Set when a failed append could not be rolled back.
    poisoned: bool,
}

/// A durable audit store backed by one append-only JSON-lines file.
pub struct JsonlAuditStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl JsonlAuditStore {
    /// Open (or create) the store at `path` and replay its contents.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                LedgerError::storage(format!("failed to create '{}': {}", parent.display(), e))
            })?;
        }

        let io_err = |e: std::io::Error| LedgerError::storage(format!("'{}': {}", path.display(), e));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(io_err)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(io_err)?;

        let mut mirror = StoreState::default();
        let mut offset = 0u64;
        let mut torn = false;
        let mut lines = contents.split_inclusive('\n').enumerate().peekable();
        while let Some((index, raw)) = lines.next() {
            let line = raw.trim();
            let last = lines.peek().is_none();
            if !line.is_empty() {
                match serde_json::from_str::<StoreRecord>(line) {
                    Ok(record) => replay(&mut mirror, record, index + 1),
                    Err(e) if last && !raw.ends_with('\n') => {
                        warn!(
                            path = %path.display(),
                            line = index + 1,
                            error = %e,
                            "cutting off torn record at end of audit store"
                        );
                        file.set_len(offset).and_then(|()| file.sync_data()).map_err(io_err)?;
                        torn = true;
                        break;
                    }
                    Err(e) => {
                        return Err(LedgerError::Serialization {
                            reason: format!("{} line {}: {}", path.display(), index + 1, e),
                        })
                    }
                }
            }
            offset += raw.len() as u64;
        }
        // A hand-edited file may lack the final newline.
        if !torn && !contents.is_empty() && !contents.ends_with('\n') {
            file.write_all(b"\n").and_then(|()| file.sync_data()).map_err(io_err)?;
        }

        info!(
            path = %path.display(),
            blocks = mirror.blocks.len(),
            pending = mirror.pending.len(),
            "audit store opened"
        );

        Ok(Self {
            path,
            state: Mutex::new(FileState {
                mirror,
                file,
                poisoned: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, or leave the file as it was.
    fn append(&self, state: &mut FileState, record: &StoreRecord) -> LedgerResult<()> {
        if state.poisoned {
            return Err(LedgerError::storage(format!(
                "'{}' holds an unrolled-back partial write; reopen the store",
                self.path.display()
            )));
        }

        let mut line = serde_json::to_vec(record).map_err(|e| LedgerError::Serialization {
            reason: e.to_string(),
        })?;
        line.push(b'\n');

        let file = &mut state.file;
        let before = file
            .metadata()
            .map_err(|e| LedgerError::storage(format!("failed to stat '{}': {}", self.path.display(), e)))?
            .len();

        let Err(e) = file.write_all(&line).and_then(|()| file.sync_data()) else {
            return Ok(());
        };

        let rolled_back = match file.metadata() {
            Ok(meta) if meta.len() == before => true,
            Ok(_) => file.set_len(before).and_then(|()| file.sync_data()).is_ok(),
            Err(_) => false,
        };
        if !rolled_back {
            state.poisoned = true;
        }
        warn!(path = %self.path.display(), error = %e, rolled_back, "audit store append failed");
        Err(LedgerError::storage(format!("failed to append to '{}': {}", self.path.display(), e)))
    }
}

fn replay(mirror: &mut StoreState, record: StoreRecord, line: usize) {
    match record {
        StoreRecord::Entry(entry) => match mirror.check_entry(&entry) {
            Ok(()) => mirror.apply_entry(entry),
            Err(e) => warn!(line, error = %e, "skipping entry record during replay"),
        },
        StoreRecord::Block(block) => {
            if let Err(e) = mirror.check_block(&block) {
                warn!(line, height = block.height, error = %e, "replayed block does not extend the chain tip");
            }
            mirror.apply_block(block);
        }
    }
}

impl AuditStore for JsonlAuditStore {
    fn insert_entry(&self, entry: &EnhancedAuditLogEntry) -> LedgerResult<()> {
        let mut state = lock_state(&self.state)?;
        state.mirror.check_entry(entry)?;
        let record = StoreRecord::Entry(entry.clone());
        self.append(&mut state, &record)?;
        if let StoreRecord::Entry(entry) = record {
            state.mirror.apply_entry(entry);
        }
        debug!(path = %self.path.display(), "pending entry appended");
        Ok(())
    }

    fn insert_block(&self, block: &AuditChainBlock) -> LedgerResult<()> {
        let mut state = lock_state(&self.state)?;
        state.mirror.check_block(block)?;
        let record = StoreRecord::Block(block.clone());
        self.append(&mut state, &record)?;
        if let StoreRecord::Block(block) = record {
            state.mirror.apply_block(block);
        }
        Ok(())
    }

    fn fetch_entries(&self, heights: Option<RangeInclusive<u64>>) -> LedgerResult<Vec<EnhancedAuditLogEntry>> {
        Ok(lock_state(&self.state)?.mirror.entries_in(heights.as_ref()))
    }

    fn fetch_pending_entries(&self) -> LedgerResult<Vec<EnhancedAuditLogEntry>> {
        Ok(lock_state(&self.state)?.mirror.pending.clone())
    }

    fn fetch_latest_block(&self) -> LedgerResult<Option<AuditChainBlock>> {
        Ok(lock_state(&self.state)?.mirror.blocks.last().cloned())
    }

    fn fetch_all_blocks(&self) -> LedgerResult<Vec<AuditChainBlock>> {
        Ok(lock_state(&self.state)?.mirror.blocks.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tessera_contracts::{block::SEQUENCE_START_HASH, entry::EntryFields};

    use super::*;
    use crate::{hashing::ChainKey, recorder::EntryRecorder, sealer::ChainBlockSealer, verifier::ChainVerifier};

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn key() -> ChainKey {
        ChainKey::from_bytes(b"file-store-key".to_vec()).unwrap()
    }

    fn entry() -> EnhancedAuditLogEntry {
        EntryRecorder::new(key(), 128)
            .build(EntryFields::new("data_read", "read", "success"), SEQUENCE_START_HASH)
            .unwrap()
    }

    fn scratch() -> PathBuf {
        std::env::temp_dir()
            .join(format!("tessera-file-test-{}", uuid::Uuid::new_v4()))
            .join("chain.jsonl")
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    /// Genesis plus one sealed block, written through the store.
    fn sealed_store(path: &Path) -> JsonlAuditStore {
        let store = JsonlAuditStore::open(path).unwrap();
        let genesis = ChainBlockSealer::genesis(Utc::now());
        store.insert_block(&genesis).unwrap();
        let e = entry();
        store.insert_entry(&e).unwrap();
        store
            .insert_block(&ChainBlockSealer::assemble(1, &genesis.hash, vec![e], Utc::now()))
            .unwrap();
        store
    }

    fn append_raw(path: &Path, bytes: &[u8]) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    // ── Failed writes ────────────────────────────────────────────────────────

    #[test]
    fn failed_append_leaves_file_and_mirror_untouched() {
        let path = scratch();
        let store = sealed_store(&path);
        let before = std::fs::read(&path).unwrap();

        // A read-only handle makes every write fail.
        store.state.lock().unwrap().file = File::open(&path).unwrap();
        let err = store.insert_entry(&entry()).unwrap_err();
        assert!(matches!(err, LedgerError::Storage { .. }));
        assert!(store.fetch_pending_entries().unwrap().is_empty());
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(!store.state.lock().unwrap().poisoned);

        // Writes resume once the file is writable again.
        store.state.lock().unwrap().file = OpenOptions::new().append(true).read(true).open(&path).unwrap();
        store.insert_entry(&entry()).unwrap();

        let reopened = JsonlAuditStore::open(&path).unwrap();
        assert_eq!(reopened.fetch_pending_entries().unwrap().len(), 1);
        assert_eq!(reopened.fetch_all_blocks().unwrap().len(), 2);
        cleanup(&path);
    }

    #[test]
    fn poisoned_store_refuses_writes() {
        let path = scratch();
        let store = sealed_store(&path);
        store.state.lock().unwrap().poisoned = true;

        let err = store.insert_entry(&entry()).unwrap_err();
        assert!(err.to_string().contains("reopen"));
        assert!(JsonlAuditStore::open(&path).unwrap().fetch_pending_entries().unwrap().is_empty());
        cleanup(&path);
    }

    // ── Replay ───────────────────────────────────────────────────────────────

    #[test]
    fn torn_tail_is_cut_off_on_open() {
        let path = scratch();
        drop(sealed_store(&path));
        let intact = std::fs::read(&path).unwrap();
        append_raw(&path, br#"{"kind":"entry","record":{"id":"#);

        let store = JsonlAuditStore::open(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), intact);
        assert_eq!(store.fetch_all_blocks().unwrap().len(), 2);

        // The next record starts on a clean line.
        store.insert_entry(&entry()).unwrap();
        drop(store);
        let store = JsonlAuditStore::open(&path).unwrap();
        assert_eq!(store.fetch_pending_entries().unwrap().len(), 1);
        cleanup(&path);
    }

    #[test]
    fn missing_final_newline_is_restored() {
        let path = scratch();
        drop(sealed_store(&path));
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, contents.trim_end()).unwrap();

        let store = JsonlAuditStore::open(&path).unwrap();
        store.insert_entry(&entry()).unwrap();
        drop(store);

        let store = JsonlAuditStore::open(&path).unwrap();
        assert_eq!(store.fetch_all_blocks().unwrap().len(), 2);
        assert_eq!(store.fetch_pending_entries().unwrap().len(), 1);
        cleanup(&path);
    }

    #[test]
    fn corrupt_line_inside_file_is_an_error() {
        let path = scratch();
        drop(sealed_store(&path));
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, format!("not json\n{}", contents)).unwrap();

        let err = JsonlAuditStore::open(&path).err().unwrap();
        assert!(matches!(err, LedgerError::Serialization { .. }));
        cleanup(&path);
    }

    #[test]
    fn replayed_duplicate_block_is_kept_and_fails_verification() {
        let path = scratch();
        drop(sealed_store(&path));
        let contents = std::fs::read_to_string(&path).unwrap();
        let last = contents.lines().last().unwrap().to_string();
        append_raw(&path, format!("{}\n", last).as_bytes());

        let store = JsonlAuditStore::open(&path).unwrap();
        let blocks = store.fetch_all_blocks().unwrap();
        assert_eq!(blocks.len(), 3);

        let report = ChainVerifier::new(key()).verify(&blocks);
        assert!(!report.is_valid);
        assert_eq!(report.invalid_block_heights, vec![1]);

        // New blocks are still checked against the replayed tip.
        let stale = ChainBlockSealer::assemble(1, &blocks[0].hash, vec![entry()], Utc::now());
        assert!(matches!(store.insert_block(&stale), Err(LedgerError::SealConflict { .. })));
        cleanup(&path);
    }
}
