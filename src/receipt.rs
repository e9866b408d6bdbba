//! Receipt layout and print-channel dispatch.
//!
//! The receipt is a fixed-width text block. Channels decide what happens to
//! it: echo to the terminal, write ESC/POS bytes for a thermal printer, or
//! wrap it in a RawBT intent for an Android print bridge.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::Local;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::config::{PrintChannel, ReceiptLayout};
use crate::escpos::EscPosBuilder;
use crate::order::{Order, Payment};
use crate::pricing;

const NAME_COLUMNS: usize = 14;
const RAWBT_PACKAGE: &str = "ru.a402d.rawbtprinter";

#[derive(Debug, Error)]
pub enum PrintError {
    #[error("failed to create receipts directory {}: {source}", path.display())]
    Dir { path: PathBuf, source: io::Error },
    #[error("failed to write receipt {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to write receipt to console: {0}")]
    Console(#[source] io::Error),
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// `Q70.00` style amount with exactly two decimals.
pub fn money(currency: &str, amount: Decimal) -> String {
    let mut value = amount.round_dp(2);
    value.rescale(2);
    format!("{currency}{value}")
}

fn centered(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    format!("{}{text}", " ".repeat((width - len) / 2))
}

fn spread(label: &str, value: &str, width: usize) -> String {
    let gap = width
        .saturating_sub(label.chars().count() + value.chars().count())
        .max(1);
    format!("{label}{}{value}", " ".repeat(gap))
}

fn name_column(name: &str) -> String {
    format!("{:<width$}", name, width = NAME_COLUMNS).chars().take(NAME_COLUMNS).collect()
}

/// Render the receipt text for a finalized order.
pub fn render_receipt(order: &Order, catalog: &Catalog, layout: &ReceiptLayout) -> String {
    let width = layout.width.max(NAME_COLUMNS + 10);
    let separator = "-".repeat(width);
    let cur = layout.currency.as_str();
    let mut lines: Vec<String> = Vec::new();

    lines.push(centered(&layout.header, width));
    lines.push(centered(&order.event_name, width));
    lines.push(separator.clone());
    lines.push(format!(
        "{} | {}",
        order.created_at.with_timezone(&Local).format("%H:%M:%S"),
        order.seller
    ));
    lines.push(format!("#{}", order.id));
    lines.push(separator.clone());
    lines.push("CANT PROD           TOTAL".to_string());

    for item in &order.items {
        let subtotal = pricing::line_total(catalog, item);
        lines.push(format!(
            "{} {} {}",
            item.quantity,
            name_column(&item.name),
            money(cur, subtotal)
        ));
        if !item.add_ons.is_empty() {
            lines.push(format!("  {}", item.add_ons));
        }
    }

    lines.push(separator.clone());
    lines.push(spread("TOTAL:", &money(cur, order.total), width));
    lines.push(separator);
    lines.push(format!("Pago: {}", order.payment_method().as_str().to_uppercase()));
    if let Payment::Cash { tendered, change } = order.payment {
        lines.push(format!(
            "Efe: {} | Vuelto: {}",
            money(cur, tendered),
            money(cur, change)
        ));
    }
    lines.push(String::new());
    for footer in &layout.footer {
        lines.push(centered(footer, width));
    }

    let mut text = lines.join("\n");
    text.push_str("\n\n");
    text
}

/// ESC/POS document for the receipt text. The first line is the header and
/// is printed bold and centred.
pub fn escpos_document(text: &str) -> Vec<u8> {
    let mut b = EscPosBuilder::new();
    b.init().latin_mode();

    let mut lines = text.lines();
    if let Some(header) = lines.next() {
        b.center().bold(true).text(header.trim()).lf().bold(false).left();
    }
    for line in lines {
        b.text(line).lf();
    }
    b.feed(3).cut();
    b.build()
}

/// Android intent URI understood by the RawBT print service.
pub fn rawbt_intent(text: &str) -> String {
    format!(
        "intent:base64,{}#Intent;scheme=rawbt;package={RAWBT_PACKAGE};end;",
        BASE64_STANDARD.encode(text.as_bytes())
    )
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Where a dispatched receipt ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintOutput {
    Console,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ReceiptPrinter {
    channel: PrintChannel,
    receipts_dir: PathBuf,
    layout: ReceiptLayout,
}

impl ReceiptPrinter {
    pub fn new(channel: PrintChannel, receipts_dir: PathBuf, layout: ReceiptLayout) -> Self {
        Self {
            channel,
            receipts_dir,
            layout,
        }
    }

    pub fn channel(&self) -> PrintChannel {
        self.channel
    }

    pub fn layout(&self) -> &ReceiptLayout {
        &self.layout
    }

    /// Render and dispatch the receipt for `order`.
    pub fn print(&self, order: &Order, catalog: &Catalog) -> Result<PrintOutput, PrintError> {
        let text = render_receipt(order, catalog, &self.layout);
        self.dispatch(&order.id, &text)
    }

    pub fn dispatch(&self, order_id: &str, text: &str) -> Result<PrintOutput, PrintError> {
        let output = match self.channel {
            PrintChannel::Console => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                out.write_all(text.as_bytes())
                    .and_then(|_| out.flush())
                    .map_err(PrintError::Console)?;
                PrintOutput::Console
            }
            PrintChannel::File => {
                let path = self.receipt_path(order_id, "bin")?;
                write_file(&path, &escpos_document(text))?;
                PrintOutput::File(path)
            }
            PrintChannel::Rawbt => {
                let path = self.receipt_path(order_id, "rawbt")?;
                write_file(&path, rawbt_intent(text).as_bytes())?;
                PrintOutput::File(path)
            }
        };
        info!(order_id = %order_id, channel = %self.channel, "Receipt dispatched");
        Ok(output)
    }

    fn receipt_path(&self, order_id: &str, extension: &str) -> Result<PathBuf, PrintError> {
        fs::create_dir_all(&self.receipts_dir).map_err(|source| PrintError::Dir {
            path: self.receipts_dir.clone(),
            source,
        })?;
        Ok(self.receipts_dir.join(format!("{order_id}.{extension}")))
    }
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), PrintError> {
    fs::write(path, data).map_err(|source| PrintError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = data.len(), "Receipt written");
    Ok(())
}
