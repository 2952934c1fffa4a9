//! Run report.
//!
//! Summary of one purchase run: how many tickets were bought against the
//! target, which offers they came from, and the per-offer errors seen on the
//! way.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::liquidity::ConversionReceipt;
use crate::types::{short_id, RunOutcome};

/// Errors shown in a report before the rest are summarised as a count.
pub const DEFAULT_ERROR_LIMIT: usize = 5;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchasedTicket {
    pub ticket: String,
    pub offer_txid: String,
    /// Purchase transaction; absent when the node returned no txid.
    pub txid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferError {
    pub offer_txid: String,
    pub ticket: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub target: u32,
    pub bought: u32,
    pub outcome: RunOutcome,
    pub dry_run: bool,
    pub purchased: Vec<PurchasedTicket>,
    pub errors: Vec<OfferError>,
    /// `takeoffer` submissions, including rejected ones.
    pub attempts: u32,
    pub conversion: Option<ConversionReceipt>,
    /// Set when a fatal error (or cancellation) stopped the loop early.
    pub aborted: Option<String>,
}

impl RunReport {
    /// The first `limit` errors and how many more there were.
    pub fn error_summary(&self, limit: usize) -> (&[OfferError], usize) {
        let shown = self.errors.len().min(limit);
        (&self.errors[..shown], self.errors.len() - shown)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            outcome = %self.outcome,
            bought = self.bought,
            target = self.target,
            attempts = self.attempts,
            errors = self.errors.len(),
            dry_run = self.dry_run,
            secs = self.duration().num_seconds(),
            "Purchase run finished"
        );

        let (shown, remaining) = self.error_summary(DEFAULT_ERROR_LIMIT);
        for e in shown {
            warn!(offer = short_id(&e.offer_txid, 16), ticket = %e.ticket, error = %e.message, "Offer failed");
        }
        if remaining > 0 {
            warn!(remaining, "Further offer errors not shown");
        }
        if let Some(reason) = &self.aborted {
            warn!(reason = %reason, "Run stopped early");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
