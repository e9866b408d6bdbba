//! Diagnostics for the terminal.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **Status**: order totals, sync backlog, remote mode, schema version
//! - **Log rotation helpers**: used by `lib.rs` before the file appender starts

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::PosConfig;
use crate::db::{self, StorageError};
use crate::ledger::OrderLedger;
use crate::sync::SyncStats;

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// File name prefix used by the rolling appender.
pub const LOG_FILE_PREFIX: &str = "pos";

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

/// Returns version, build timestamp, git SHA, and platform info.
pub fn about() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "rustVersion": env!("CARGO_PKG_RUST_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub total_orders: usize,
    pub unsynced_orders: usize,
    pub data_dir: PathBuf,
    pub remote_configured: bool,
    pub print_channel: String,
    pub schema_version: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncStats>,
}

/// Snapshot of the ledger and sync state. Counts are read from storage.
pub fn status(
    ledger: &OrderLedger,
    config: &PosConfig,
    sync: Option<SyncStats>,
) -> Result<StatusReport, StorageError> {
    let schema_version = {
        let conn = ledger.db().lock()?;
        db::schema_version(&conn)?
    };

    Ok(StatusReport {
        total_orders: ledger.count_all()?,
        unsynced_orders: ledger.count_unsynced()?,
        data_dir: config.data_dir.clone(),
        remote_configured: config.remote().is_some(),
        print_channel: config.print_channel.to_string(),
        schema_version,
        sync,
    })
}

// ---------------------------------------------------------------------------
// Log rotation
// ---------------------------------------------------------------------------

/// Prune old log files in `log_dir`, keeping only the most recent
/// `MAX_LOG_FILES`.
pub fn prune_old_logs(log_dir: &Path) {
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|name| name.starts_with(&format!("{LOG_FILE_PREFIX}.")))
                .unwrap_or(false);
            if is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}
