//! The register: one seller, one device, one transaction at a time.
//!
//! Holds the event session, the live [`Transaction`], and the collaborators
//! an order passes through when it is finalized: ledger, sync worker and
//! receipt printer. Finalization never fails because of those collaborators.
//! Ledger and print problems come back as statuses on [`Finalized`], and the
//! remote push is queued without waiting for it.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cart::AddOnSelection;
use crate::catalog::Catalog;
use crate::checkout::{CheckoutError, Transaction};
use crate::config::PosConfig;
use crate::db::{self, StorageError};
use crate::ledger::OrderLedger;
use crate::order::{new_order_id, Order};
use crate::receipt::{PrintError, PrintOutput, ReceiptPrinter};
use crate::remote::RemoteStore;
use crate::session::{self, EventSession, SessionError};
use crate::sync::{OfflineSyncAgent, SyncAgent, SyncHandle, SyncStats, SyncWorker};

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Print(#[from] PrintError),
    #[error("order {0} not found")]
    UnknownOrder(String),
    #[error("no order has been finalized yet")]
    NothingToReprint,
}

/// Whether the order made it into the local ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerStatus {
    Recorded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintStatus {
    Printed(PrintOutput),
    Failed(String),
}

/// Result of a finalized sale.
#[derive(Debug, Clone)]
pub struct Finalized {
    pub order: Order,
    pub ledger: LedgerStatus,
    pub print: PrintStatus,
    /// The push was handed to the sync worker; it has not necessarily run.
    pub sync_queued: bool,
}

/// Remote agent for the configuration, or the offline agent in local-only
/// mode.
pub fn sync_agent_for(config: &PosConfig) -> Arc<dyn SyncAgent> {
    let Some(remote) = config.remote() else {
        info!("No remote store configured; running local-only");
        return Arc::new(OfflineSyncAgent);
    };
    match RemoteStore::new(
        &remote.url,
        remote.api_key.clone(),
        &remote.collection,
        config.sync_timeout(),
    ) {
        Ok(store) => {
            info!(url = %store.base_url(), "Remote store configured");
            Arc::new(store)
        }
        Err(e) => {
            warn!(error = %e, "Remote store unavailable; running local-only");
            Arc::new(OfflineSyncAgent)
        }
    }
}

pub struct Register {
    catalog: Catalog,
    ledger: OrderLedger,
    sync: SyncHandle,
    printer: ReceiptPrinter,
    session: Option<EventSession>,
    transaction: Transaction,
    last_order: Option<Order>,
}

impl Register {
    pub fn new(
        catalog: Catalog,
        ledger: OrderLedger,
        sync: SyncHandle,
        printer: ReceiptPrinter,
    ) -> Self {
        Self {
            catalog,
            ledger,
            sync,
            printer,
            session: None,
            transaction: Transaction::new(),
            last_order: None,
        }
    }

    /// Open storage under the configured data directory and start the sync
    /// worker. Must run inside a tokio runtime.
    pub fn open(config: &PosConfig, catalog: Catalog) -> Result<Self, RegisterError> {
        let db = Arc::new(db::init(&config.data_dir)?);
        let ledger = OrderLedger::new(db);

        let orders = ledger.count_all()?;
        let pending = ledger.count_unsynced()?;
        info!(orders, pending, "Order ledger loaded");

        let sync = SyncWorker::start(sync_agent_for(config), ledger.clone(), config.sync_timeout());
        let printer = ReceiptPrinter::new(
            config.print_channel,
            config.receipts_dir(),
            config.receipt.clone(),
        );
        Ok(Self::new(catalog, ledger, sync, printer))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub fn printer(&self) -> &ReceiptPrinter {
        &self.printer
    }

    // -- session -------------------------------------------------------------

    pub fn session(&self) -> Option<&EventSession> {
        self.session.as_ref()
    }

    /// Start a new event session and remember it for the next launch.
    pub fn start_session(&mut self, seller: &str, event_name: &str) -> Result<&EventSession, RegisterError> {
        let started = EventSession::start(seller, event_name)?;
        session::save(self.ledger.db(), &started)?;
        info!(seller = %started.seller, event = %started.event_name, "Event session started");
        Ok(&*self.session.insert(started))
    }

    /// Continue the session stored by a previous launch, if there is one.
    pub fn resume_session(&mut self) -> Result<Option<&EventSession>, RegisterError> {
        let Some(stored) = session::load(self.ledger.db())? else {
            return Ok(None);
        };
        info!(seller = %stored.seller, event = %stored.event_name, "Event session resumed");
        Ok(Some(&*self.session.insert(stored)))
    }

    /// Log out: forget the session and abandon any transaction in progress.
    pub fn end_session(&mut self) -> Result<(), RegisterError> {
        session::clear(self.ledger.db())?;
        if let Some(ended) = self.session.take() {
            info!(seller = %ended.seller, event = %ended.event_name, "Event session ended");
        }
        self.transaction.reset();
        Ok(())
    }

    // -- transaction ---------------------------------------------------------

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Direct access for cart edits and payment inputs.
    pub fn transaction_mut(&mut self) -> &mut Transaction {
        &mut self.transaction
    }

    /// Add a catalog product to the cart.
    pub fn add_item(
        &mut self,
        product_id: u32,
        quantity: u32,
        add_ons: AddOnSelection,
    ) -> Result<usize, RegisterError> {
        let product = self
            .catalog
            .product(product_id)
            .ok_or(CheckoutError::UnknownProduct(product_id))?;
        Ok(self.transaction.add_item(product, quantity, add_ons)?)
    }

    pub fn display_total(&self) -> Decimal {
        self.transaction.display_total(&self.catalog)
    }

    pub fn begin_payment(&mut self) -> Result<Decimal, RegisterError> {
        Ok(self.transaction.begin_payment(&self.catalog)?)
    }

    /// Confirm payment and issue the order.
    ///
    /// Validation errors leave everything as it was. Once the order exists,
    /// the sale always completes: the ledger append, remote push and receipt
    /// each report their own status.
    pub fn finalize(&mut self) -> Result<Finalized, RegisterError> {
        let session = self.session.as_ref().ok_or(CheckoutError::NoSession)?;
        let order = self
            .transaction
            .confirm(session, new_order_id(), Utc::now())?;

        let ledger = match self.ledger.append(&order) {
            Ok(()) => LedgerStatus::Recorded,
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Order not recorded in ledger");
                LedgerStatus::Failed(e.to_string())
            }
        };

        let sync_queued = self.sync.submit(order.clone());

        let print = match self.printer.print(&order, &self.catalog) {
            Ok(output) => PrintStatus::Printed(output),
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Receipt dispatch failed");
                PrintStatus::Failed(e.to_string())
            }
        };

        info!(
            order_id = %order.id,
            total = %order.total,
            payment = %order.payment_method(),
            gift = order.is_gift,
            "Order finalized"
        );
        self.last_order = Some(order.clone());

        Ok(Finalized {
            order,
            ledger,
            print,
            sync_queued,
        })
    }

    // -- after the sale ------------------------------------------------------

    pub fn last_order(&self) -> Option<&Order> {
        self.last_order.as_ref()
    }

    pub fn reprint_last(&self) -> Result<PrintOutput, RegisterError> {
        let order = self.last_order.as_ref().ok_or(RegisterError::NothingToReprint)?;
        Ok(self.printer.print(order, &self.catalog)?)
    }

    pub fn reprint(&self, order_id: &str) -> Result<PrintOutput, RegisterError> {
        let order = self
            .ledger
            .get(order_id)?
            .ok_or_else(|| RegisterError::UnknownOrder(order_id.to_string()))?;
        Ok(self.printer.print(&order, &self.catalog)?)
    }

    pub fn orders(&self, pending_only: bool) -> Result<Vec<Order>, RegisterError> {
        let orders = if pending_only {
            self.ledger.pending()?
        } else {
            self.ledger.load_all()?
        };
        Ok(orders)
    }

    pub fn unsynced_count(&self) -> Result<usize, RegisterError> {
        Ok(self.ledger.count_unsynced()?)
    }

    /// Queue every pending order for another push. Returns how many were
    /// queued. Only runs when the seller asks for it.
    pub fn resync_pending(&self) -> Result<usize, RegisterError> {
        let pending = self.ledger.pending()?;
        let mut queued = 0;
        for order in pending {
            if self.sync.submit(order) {
                queued += 1;
            }
        }
        info!(queued, "Pending orders resubmitted for sync");
        Ok(queued)
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    /// Wait for queued pushes to settle, then stop the sync worker.
    pub async fn shutdown(self) -> SyncStats {
        self.sync.shutdown().await
    }
}
