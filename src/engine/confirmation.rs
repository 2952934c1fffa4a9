//! Confirmation gate.
//!
//! Blocks until a transaction reaches a minimum confirmation count. The
//! orchestrator passes every purchase through here before submitting the
//! next one, because each purchase spends outputs created by the previous.

use std::time::Duration;

use tracing::{debug, info};

use super::wait::Waiter;
use crate::node::NodeClient;
use crate::types::{short_id, BuyerError, Result};

#[derive(Clone)]
pub struct ConfirmationGate {
    node: NodeClient,
    waiter: Waiter,
    interval: Duration,
}

impl ConfirmationGate {
    pub fn new(node: NodeClient, waiter: Waiter, interval: Duration) -> Self {
        Self {
            node,
            waiter,
            interval,
        }
    }

    /// Poll `gettransaction` until `txid` has at least `min_confirmations`.
    ///
    /// Returns the confirmation count seen. Fails with `Orphaned` when the
    /// node reports the -1 sentinel.
    pub async fn await_confirmation(&self, txid: &str, min_confirmations: i64) -> Result<i64> {
        info!(txid = short_id(txid, 16), min_confirmations, "Waiting for transaction to confirm");

        let mut wait = self
            .waiter
            .begin(format!("confirmation of {txid}"), self.interval);
        loop {
            let tx = self.node.get_transaction(txid).await?;
            if tx.confirmations >= min_confirmations {
                info!(
                    txid = short_id(txid, 16),
                    confirmations = tx.confirmations,
                    "Transaction confirmed"
                );
                return Ok(tx.confirmations);
            }
            if tx.is_orphaned() {
                return Err(BuyerError::Orphaned {
                    txid: txid.to_string(),
                });
            }
            debug!(
                txid = short_id(txid, 16),
                confirmations = tx.confirmations,
                waiting_for = min_confirmations,
                "Not yet confirmed"
            );
            wait.tick().await?;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
