//! Turco's House POS
//!
//! Order capture for event sales: build a cart, take payment, print a
//! receipt. Every finalized order is written to a local SQLite ledger first
//! and mirrored to a remote store in the background when one is configured.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod escpos;
pub mod ledger;
pub mod order;
pub mod pricing;
pub mod receipt;
pub mod register;
pub mod remote;
pub mod session;
pub mod sync;

pub use catalog::Catalog;
pub use config::PosConfig;
pub use order::{Order, Payment, PaymentMethod};
pub use register::{Finalized, LedgerStatus, PrintStatus, Register, RegisterError};

/// Install the global subscriber: console output plus a daily rolling file
/// in `log_dir`. Keep the returned guard alive until exit so buffered log
/// lines are flushed.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,turcos_pos_lib=debug"));

    // Prune old log files before setting up the appender
    diagnostics::prune_old_logs(log_dir);
    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
