//! Event session: who is selling, at which event, since when.
//!
//! Established once per working session and copied into every order. The
//! last session is kept in the settings store so the next launch can offer
//! to continue it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{self, DbState, StorageError};

const SESSION_CATEGORY: &str = "session";
const SESSION_KEY: &str = "event";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("seller name is required")]
    MissingSeller,
    #[error("event name is required")]
    MissingEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSession {
    pub seller: String,
    pub event_name: String,
    pub started_at: DateTime<Utc>,
}

impl EventSession {
    /// New session starting now. Both names are trimmed and must be non-empty.
    pub fn start(seller: &str, event_name: &str) -> Result<Self, SessionError> {
        Self::start_at(seller, event_name, Utc::now())
    }

    pub fn start_at(
        seller: &str,
        event_name: &str,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let seller = seller.trim();
        let event_name = event_name.trim();
        if seller.is_empty() {
            return Err(SessionError::MissingSeller);
        }
        if event_name.is_empty() {
            return Err(SessionError::MissingEvent);
        }
        Ok(Self {
            seller: seller.to_string(),
            event_name: event_name.to_string(),
            started_at,
        })
    }
}

/// Persist the session as the default for the next launch.
pub fn save(db: &DbState, session: &EventSession) -> Result<(), StorageError> {
    let raw = serde_json::to_string(session)?;
    let conn = db.lock()?;
    db::set_setting(&conn, SESSION_CATEGORY, SESSION_KEY, &raw)?;
    info!(seller = %session.seller, event = %session.event_name, "Event session saved");
    Ok(())
}

/// Load the stored session, if any. An unreadable record is logged and
/// treated as absent.
pub fn load(db: &DbState) -> Result<Option<EventSession>, StorageError> {
    let raw = {
        let conn = db.lock()?;
        db::get_setting(&conn, SESSION_CATEGORY, SESSION_KEY)?
    };
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<EventSession>(&raw) {
        Ok(session) => Ok(Some(session)),
        Err(e) => {
            warn!(error = %e, "Stored event session is unreadable, ignoring");
            Ok(None)
        }
    }
}

/// Forget the stored session (logout).
pub fn clear(db: &DbState) -> Result<(), StorageError> {
    let conn = db.lock()?;
    db::delete_setting(&conn, SESSION_CATEGORY, SESSION_KEY)?;
    info!("Event session cleared");
    Ok(())
}
