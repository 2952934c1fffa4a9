//! Purchase orchestrator.
//!
//! Buys up to a requested number of tickets from a contended, changing pool
//! of sell offers. Liquidity is guaranteed once up front. Purchases are then
//! strictly serialised: each one spends outputs created by the previous, so
//! purchase k+1 is not submitted until purchase k has a confirmation.
//!
//! A node refusal classified as a rejection means the outputs are not
//! spendable yet; the offer goes back into the pool and the loop waits for
//! the last purchase (or a backoff) before trying it again. Any other
//! per-offer error is recorded and the offer is not retried.

use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::confirmation::ConfirmationGate;
use super::liquidity::{LiquidityGuarantor, LiquidityPlan};
use super::offers::OfferPool;
use super::report::{OfferError, PurchasedTicket, RunReport};
use super::wait::{PollIntervals, Waiter};
use crate::node::{NodeClient, TakeOfferRequest};
use crate::types::{
    short_id, AcquisitionAttempt, AttemptOutcome, BuyerError, Offer, Result, RunOutcome,
};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// The ticket market being bought from.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketMarket {
    /// Currency name offers are listed under and tickets are paid in.
    pub asset: String,
    /// Currency id delivered to the seller.
    pub currency_id: String,
    /// Parent namespace of the ticket identities.
    pub parent: String,
    pub ticket_price: Decimal,
}

/// One purchase run as requested by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRequest {
    pub address: String,
    pub change_address: String,
    pub quantity: u32,
    /// Build and sign purchases without broadcasting them.
    pub dry_run: bool,
}

impl PurchaseRequest {
    pub fn new(address: &str, quantity: u32) -> Self {
        Self {
            address: address.to_string(),
            change_address: address.to_string(),
            quantity,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct SubmittedTx {
    txid: String,
    confirmed: bool,
}

/// Everything the acquisition loop accumulates during one run.
#[derive(Debug, Default)]
struct RunState {
    attempted: HashSet<String>,
    purchased: Vec<PurchasedTicket>,
    errors: Vec<OfferError>,
    attempts: u32,
    last_tx: Option<SubmittedTx>,
}

impl RunState {
    fn bought(&self) -> u32 {
        self.purchased.len() as u32
    }

    fn record_error(&mut self, offer: &Offer, message: String) {
        self.errors.push(OfferError {
            offer_txid: offer.txid.clone(),
            ticket: offer.name.clone(),
            message,
        });
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct PurchaseOrchestrator {
    node: NodeClient,
    market: TicketMarket,
    liquidity: LiquidityGuarantor,
    gate: ConfirmationGate,
    waiter: Waiter,
    intervals: PollIntervals,
}

impl PurchaseOrchestrator {
    pub fn new(
        node: NodeClient,
        market: TicketMarket,
        liquidity: LiquidityGuarantor,
        gate: ConfirmationGate,
        waiter: Waiter,
        intervals: PollIntervals,
    ) -> Self {
        Self {
            node,
            market,
            liquidity,
            gate,
            waiter,
            intervals,
        }
    }

    /// Amount of the ticket currency needed for `quantity` tickets.
    pub fn required_funds(&self, quantity: u32) -> Decimal {
        self.market.ticket_price * Decimal::from(quantity)
    }

    /// Liquidity plan for a request, without moving funds.
    pub async fn plan(&self, request: &PurchaseRequest) -> Result<LiquidityPlan> {
        self.liquidity
            .plan(
                &request.address,
                &self.market.asset,
                self.required_funds(request.quantity),
            )
            .await
    }

    /// Run one purchase: fund, acquire, report.
    ///
    /// Fails only if funding fails. Errors inside the acquisition loop end
    /// the loop and are carried in `RunReport::aborted`.
    pub async fn run(&self, request: &PurchaseRequest) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            quantity = request.quantity,
            address = %request.address,
            dry_run = request.dry_run,
            "Starting purchase run"
        );

        let required = self.required_funds(request.quantity);
        let funding = self
            .liquidity
            .ensure_funding(&request.address, &self.market.asset, required)
            .await?;

        let mut state = RunState::default();
        let mut aborted = None;
        if let Err(e) = self.acquire_loop(request, &mut state).await {
            warn!(%run_id, error = %e, "Acquisition loop stopped");
            aborted = Some(e.to_string());
        } else if let Err(e) = self.await_final_confirmation(&mut state).await {
            warn!(%run_id, error = %e, "Final confirmation failed");
            aborted = Some(e.to_string());
        }

        let bought = state.bought();
        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            target: request.quantity,
            bought,
            outcome: RunOutcome::classify(bought, request.quantity),
            dry_run: request.dry_run,
            purchased: state.purchased,
            errors: state.errors,
            attempts: state.attempts,
            conversion: funding.conversion,
            aborted,
        };
        report.log();
        Ok(report)
    }

    async fn acquire_loop(&self, request: &PurchaseRequest, state: &mut RunState) -> Result<()> {
        let mut pool = OfferPool::new(self.node.clone(), &self.market.asset);

        while state.bought() < request.quantity {
            if self.waiter.is_cancelled() {
                return Err(BuyerError::Cancelled);
            }

            pool.refresh().await?;
            let Some(offer) = pool.next_unattempted(&state.attempted).cloned() else {
                info!(
                    bought = state.bought(),
                    target = request.quantity,
                    "No more offers available"
                );
                break;
            };

            state.attempted.insert(offer.txid.clone());
            state.attempts += 1;
            let attempt = self.attempt(&offer, request).await?;

            match attempt.outcome {
                AttemptOutcome::Bought { txid } => {
                    state.purchased.push(PurchasedTicket {
                        ticket: offer.name.clone(),
                        offer_txid: offer.txid.clone(),
                        txid: txid.clone(),
                    });
                    info!(
                        bought = state.bought(),
                        target = request.quantity,
                        ticket = %offer.name,
                        "Ticket purchased"
                    );

                    if request.dry_run {
                        continue;
                    }
                    let Some(txid) = txid else {
                        if state.bought() < request.quantity {
                            return Err(BuyerError::MissingTxid {
                                ticket: offer.name.clone(),
                            });
                        }
                        warn!(ticket = %offer.name, "Purchase returned no txid, cannot wait on it");
                        continue;
                    };
                    let mut submitted = SubmittedTx {
                        txid,
                        confirmed: false,
                    };
                    if state.bought() < request.quantity {
                        self.gate.await_confirmation(&submitted.txid, 1).await?;
                        submitted.confirmed = true;
                    }
                    state.last_tx = Some(submitted);
                }
                AttemptOutcome::Contended { message } => {
                    debug!(offer = %offer, error = %message, "Purchase rejected, outputs not spendable yet");
                    state.attempted.remove(&offer.txid);
                    self.wait_for_spendable(state).await?;
                }
                AttemptOutcome::Rejected { reason } => {
                    warn!(offer = %offer, reason = %reason, "Offer unusable");
                    state.record_error(&offer, reason);
                }
                AttemptOutcome::Error { message } => {
                    warn!(offer = %offer, error = %message, "Purchase failed");
                    state.record_error(&offer, message);
                }
            }
        }
        Ok(())
    }

    /// Take one offer and classify the outcome. Only fatal errors are
    /// returned as `Err`.
    pub async fn attempt(&self, offer: &Offer, request: &PurchaseRequest) -> Result<AcquisitionAttempt> {
        let outcome = match self.acquire(offer, request).await {
            Ok(txid) => AttemptOutcome::Bought { txid },
            Err(e) if e.is_rejection() => AttemptOutcome::Contended {
                message: e.to_string(),
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(BuyerError::InvalidOffer { reason, .. }) => AttemptOutcome::Rejected { reason },
            Err(e) => AttemptOutcome::Error {
                message: e.to_string(),
            },
        };
        Ok(AcquisitionAttempt {
            offer: offer.clone(),
            outcome,
        })
    }

    /// Submit `takeoffer` for one offer; returns the purchase txid if the
    /// node reported one.
    pub async fn acquire(&self, offer: &Offer, request: &PurchaseRequest) -> Result<Option<String>> {
        if offer.name.is_empty() {
            return Err(BuyerError::InvalidOffer {
                txid: offer.txid.clone(),
                reason: "offer has no ticket name".into(),
            });
        }
        let Some(identity_id) = offer.identity_id.clone() else {
            return Err(BuyerError::InvalidOffer {
                txid: offer.txid.clone(),
                reason: "offer has no identity id".into(),
            });
        };

        let take = TakeOfferRequest {
            from_address: request.address.clone(),
            change_address: request.change_address.clone(),
            offer_txid: offer.txid.clone(),
            identity_name: format!("{}@", offer.name),
            parent: self.market.parent.clone(),
            identity_id,
            deliver_currency: self.market.currency_id.clone(),
            deliver_amount: self.market.ticket_price,
            return_tx: request.dry_run,
        };

        debug!(offer = short_id(&offer.txid, 16), ticket = %offer.name, "Taking offer");
        let result = self.node.take_offer(&take).await?;
        Ok(result.txid)
    }

    /// After a rejection: wait for the last purchase to confirm, or sleep a
    /// backoff if there is none or it had already confirmed.
    async fn wait_for_spendable(&self, state: &mut RunState) -> Result<()> {
        if let Some(tx) = state.last_tx.as_mut() {
            let already_confirmed = tx.confirmed;
            info!(txid = short_id(&tx.txid, 16), "Waiting for previous purchase to confirm");
            self.gate.await_confirmation(&tx.txid, 1).await?;
            tx.confirmed = true;
            if !already_confirmed {
                return Ok(());
            }
        }
        info!(backoff_secs = self.intervals.rejection_backoff.as_secs_f64(), "Waiting for spendable outputs");
        self.waiter
            .sleep("spendable outputs", self.intervals.rejection_backoff)
            .await
    }

    async fn await_final_confirmation(&self, state: &mut RunState) -> Result<()> {
        match state.last_tx.as_mut() {
            Some(tx) if !tx.confirmed => {
                info!(txid = short_id(&tx.txid, 16), "Waiting for final confirmation");
                self.gate.await_confirmation(&tx.txid, 1).await?;
                tx.confirmed = true;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
