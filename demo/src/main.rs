//! tessera: command-line front end for a tamper-evident audit chain.
//!
//! The chain lives in one JSON-lines file (`--store`).  Every command opens
//! it, does one thing and exits, so a chain persists across runs and can be
//! tampered with by hand to watch verification catch it.
//!
//! Usage:
//!   tessera scenario
//!   tessera --key-hex 00ff.. record --event-type failed_login --action login --result failure --user alice
//!   tessera seal
//!   tessera verify
//!   tessera query --user alice --pending
//!   tessera anomalies --minutes 60
//!   tessera report --tenant acme

mod scenario;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tessera_anomaly::ThresholdDetector;
use tessera_chain::{AuditChain, ChainConfig, ChainKey, JsonlAuditStore};
use tessera_contracts::{
    anomaly::TimeWindow,
    entry::{EntryFields, MetadataValue},
    error::{LedgerError, LedgerResult},
    query::EntryQuery,
};

/// Environment variable consulted when `--key-hex` is absent.
pub const KEY_ENV: &str = "TESSERA_HMAC_KEY";

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "tessera",
    about = "Tamper-evident audit chain",
    long_about = "Records authenticated audit entries, seals them into hash-linked blocks,\n\
                  verifies the chain and scans verified entries for anomalies."
)]
struct Cli {
    #[command(flatten)]
    chain: ChainArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ChainArgs {
    /// JSON-lines file holding the chain.
    #[arg(long, global = true, default_value = "tessera-chain.jsonl")]
    store: PathBuf,

    /// HMAC key as hex.  Falls back to the TESSERA_HMAC_KEY variable.
    #[arg(long, global = true)]
    key_hex: Option<String>,

    /// Chain configuration TOML (seal retries, field length limit).
    #[arg(long, global = true)]
    chain_config: Option<PathBuf>,

    /// Anomaly threshold TOML.
    #[arg(long, global = true)]
    thresholds: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Walk through record, seal, verify, tamper and re-verify on a scratch file.
    Scenario,
    /// Record one audit entry into the pending buffer.
    Record(RecordArgs),
    /// Seal all pending entries into the next block.
    Seal,
    /// Verify every block and entry; exits non-zero if the chain is invalid.
    Verify,
    /// Print matching entries as JSON lines.
    Query(QueryArgs),
    /// Scan verified entries of a recent window for anomalies.
    Anomalies(WindowArgs),
    /// Summarize verified entries of a recent window.
    Report(WindowArgs),
}

#[derive(Args)]
struct RecordArgs {
    #[arg(long)]
    event_type: String,
    #[arg(long)]
    action: String,
    #[arg(long, default_value = "success")]
    result: String,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    tenant: Option<String>,
    #[arg(long)]
    resource_type: Option<String>,
    #[arg(long)]
    resource_id: Option<String>,
    #[arg(long)]
    ip: Option<String>,
    #[arg(long)]
    user_agent: Option<String>,
    /// Metadata as key=value; repeatable.
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    metadata: Vec<String>,
}

#[derive(Args)]
struct QueryArgs {
    #[arg(long)]
    event_type: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    tenant: Option<String>,
    /// Lowest block height to include.
    #[arg(long)]
    from_height: Option<u64>,
    /// Highest block height to include.
    #[arg(long)]
    to_height: Option<u64>,
    /// Only entries timestamped within this many minutes before now.
    #[arg(long)]
    since_minutes: Option<i64>,
    /// Include entries that are not sealed yet.
    #[arg(long)]
    pending: bool,
    #[arg(long, default_value_t = 0)]
    offset: usize,
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct WindowArgs {
    /// Length of the window, ending now.
    #[arg(long, default_value_t = 60)]
    minutes: i64,
    #[arg(long)]
    tenant: Option<String>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=info to see seals and verification summaries.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Scenario => scenario::run(&cli.chain),
        Command::Record(args) => run_record(&cli.chain, args),
        Command::Seal => run_seal(&cli.chain),
        Command::Verify => run_verify(&cli.chain),
        Command::Query(args) => run_query(&cli.chain, args),
        Command::Anomalies(args) => run_anomalies(&cli.chain, args),
        Command::Report(args) => run_report(&cli.chain, args),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("tessera error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────────

impl ChainArgs {
    fn key(&self) -> LedgerResult<ChainKey> {
        match &self.key_hex {
            Some(hex_key) => ChainKey::from_hex(hex_key),
            None => match std::env::var(KEY_ENV) {
                Ok(hex_key) => ChainKey::from_hex(hex_key.trim()),
                Err(_) => Err(LedgerError::InvalidKey {
                    reason: format!("no key given; pass --key-hex or set {}", KEY_ENV),
                }),
            },
        }
    }

    fn config(&self) -> LedgerResult<ChainConfig> {
        self.chain_config
            .as_deref()
            .map(ChainConfig::from_file)
            .unwrap_or_else(|| Ok(ChainConfig::default()))
    }

    fn detector(&self) -> LedgerResult<ThresholdDetector> {
        self.thresholds
            .as_deref()
            .map(ThresholdDetector::from_file)
            .unwrap_or_else(|| Ok(ThresholdDetector::default()))
    }

    fn open_at(&self, path: &Path, key: ChainKey) -> LedgerResult<AuditChain> {
        let store = Arc::new(JsonlAuditStore::open(path)?);
        AuditChain::open(store, key, self.config()?, Box::new(self.detector()?))
    }

    fn open(&self) -> LedgerResult<AuditChain> {
        self.open_at(&self.store, self.key()?)
    }
}

fn print_json(value: &impl serde::Serialize, pretty: bool) -> LedgerResult<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    let rendered = rendered.map_err(|e| LedgerError::Serialization { reason: e.to_string() })?;
    println!("{}", rendered);
    Ok(())
}

/// `key=value`; integers and booleans keep their type, anything else is text.
fn parse_meta(pair: &str) -> LedgerResult<(String, MetadataValue)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| LedgerError::validation("metadata", format!("'{}' is not key=value", pair)))?;
    let value = if let Ok(n) = raw.parse::<i64>() {
        MetadataValue::from(n)
    } else if let Ok(b) = raw.parse::<bool>() {
        MetadataValue::from(b)
    } else {
        MetadataValue::from(raw)
    };
    Ok((key.to_string(), value))
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn run_record(chain_args: &ChainArgs, args: RecordArgs) -> LedgerResult<bool> {
    let chain = chain_args.open()?;

    let mut fields = EntryFields::new(args.event_type, args.action, args.result);
    fields.user_id = args.user;
    fields.tenant_id = args.tenant;
    fields.resource_type = args.resource_type;
    fields.resource_id = args.resource_id;
    fields.ip_address = args.ip;
    fields.user_agent = args.user_agent;
    for pair in &args.metadata {
        let (key, value) = parse_meta(pair)?;
        fields.metadata.insert(key, value);
    }

    let entry = chain.record_entry(fields)?;
    println!("recorded {} (pending: {})", entry.id(), chain.pending_count()?);
    Ok(true)
}

fn run_seal(chain_args: &ChainArgs) -> LedgerResult<bool> {
    let chain = chain_args.open()?;
    let block = chain.seal_block()?;
    println!(
        "sealed block {} with {} entries\n  hash:        {}\n  merkle root: {}",
        block.height,
        block.entries.len(),
        block.hash,
        block.merkle_root
    );
    Ok(true)
}

fn run_verify(chain_args: &ChainArgs) -> LedgerResult<bool> {
    let chain = chain_args.open()?;
    let report = chain.verify_chain()?;
    print_json(&report, true)?;
    if !report.is_valid {
        warn!(
            blocks = ?report.invalid_block_heights,
            entries = report.invalid_entry_ids.len(),
            "audit chain failed verification"
        );
    }
    Ok(report.is_valid)
}

fn run_query(chain_args: &ChainArgs, args: QueryArgs) -> LedgerResult<bool> {
    let chain = chain_args.open()?;
    let block_heights = match (args.from_height, args.to_height) {
        (None, None) => None,
        (from, to) => Some(from.unwrap_or(0)..=to.unwrap_or(u64::MAX)),
    };
    // The window ends just after now so entries recorded this instant match.
    let time_range = args
        .since_minutes
        .map(|minutes| TimeWindow::last_minutes(Utc::now() + Duration::seconds(1), minutes))
        .transpose()?;
    let query = EntryQuery {
        event_type: args.event_type,
        user_id: args.user,
        tenant_id: args.tenant,
        block_heights,
        time_range,
        include_pending: args.pending,
        offset: args.offset,
        limit: args.limit,
    };
    for entry in chain.query_entries(&query)? {
        print_json(&entry, false)?;
    }
    Ok(true)
}

fn run_anomalies(chain_args: &ChainArgs, args: WindowArgs) -> LedgerResult<bool> {
    let window = TimeWindow::last_minutes(Utc::now(), args.minutes)?;
    let chain = chain_args.open()?;
    let findings = chain.detect_anomalies(&window, args.tenant.as_deref())?;
    if findings.is_empty() {
        println!("no anomalies in the last {} minutes", args.minutes);
    }
    for finding in &findings {
        print_json(finding, false)?;
    }
    Ok(true)
}

fn run_report(chain_args: &ChainArgs, args: WindowArgs) -> LedgerResult<bool> {
    let window = TimeWindow::last_minutes(Utc::now(), args.minutes)?;
    let chain = chain_args.open()?;
    let report = chain.compliance_report(&window, args.tenant.as_deref())?;
    print_json(&report, true)?;
    Ok(report.chain_valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meta_keeps_types() {
        assert_eq!(parse_meta("attempts=3").unwrap(), ("attempts".to_string(), MetadataValue::Integer(3)));
        assert_eq!(parse_meta("mfa=true").unwrap().1, MetadataValue::Bool(true));
        assert_eq!(parse_meta("note=a=b").unwrap().1, MetadataValue::from("a=b"));
    }

    #[test]
    fn test_parse_meta_rejects_missing_equals() {
        assert!(matches!(parse_meta("nope"), Err(LedgerError::Validation { .. })));
    }

    #[test]
    fn test_query_accepts_time_filter() {
        let cli = Cli::try_parse_from(["tessera", "query", "--since-minutes", "15", "--limit", "5"]).unwrap();
        match cli.command {
            Command::Query(args) => {
                assert_eq!(args.since_minutes, Some(15));
                assert_eq!(args.limit, Some(5));
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn test_huge_window_is_rejected_not_panicking() {
        let args = ChainArgs {
            store: std::env::temp_dir().join(format!("tessera-cli-{}.jsonl", uuid::Uuid::new_v4())),
            key_hex: Some("00ff00ff".to_string()),
            chain_config: None,
            thresholds: None,
        };
        let window = WindowArgs {
            minutes: i64::MAX,
            tenant: None,
        };
        assert!(matches!(run_anomalies(&args, window), Err(LedgerError::Validation { .. })));
        let _ = std::fs::remove_file(&args.store);
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tessera", "query", "--user", "alice", "--store", "x.jsonl", "--pending"]).unwrap();
        assert_eq!(cli.chain.store, PathBuf::from("x.jsonl"));
        match cli.command {
            Command::Query(args) => {
                assert_eq!(args.user.as_deref(), Some("alice"));
                assert!(args.pending);
            }
            _ => panic!("expected query"),
        }
    }
}
