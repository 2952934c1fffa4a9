//! Liquidity guarantor.
//!
//! Makes sure the buyer's address holds enough of the ticket currency before
//! any purchase is attempted. A shortfall is bought with the reserve
//! currency through the cheapest converter, padded by a safety buffer, and
//! the guarantor then blocks until the converted funds show up.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use super::confirmation::ConfirmationGate;
use super::router::{ConverterRouter, AMOUNT_DP};
use super::wait::Waiter;
use crate::node::{ConversionOutput, NodeClient};
use crate::types::{short_id, BuyerError, ConversionRoute, OperationStatus, Result, Submission};

/// Default safety buffer on top of a deficit (1%).
pub const DEFAULT_BUFFER: Decimal = dec!(0.01);

// ---------------------------------------------------------------------------
// Plans and receipts
// ---------------------------------------------------------------------------

/// What `ensure` would do, computed without moving funds.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityPlan {
    pub currency: String,
    pub required: Decimal,
    pub balance: Decimal,
    pub deficit: Decimal,
    /// Deficit plus the safety buffer; zero when no conversion is needed.
    pub buffered: Decimal,
    pub buffer: Decimal,
    pub route: Option<ConversionRoute>,
}

impl LiquidityPlan {
    pub fn needs_conversion(&self) -> bool {
        self.route.is_some()
    }
}

/// A conversion that was submitted to cover a deficit.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReceipt {
    pub route: ConversionRoute,
    /// Operation id or transaction id returned by `sendcurrency`.
    pub submission_id: String,
    pub txid: Option<String>,
}

/// Outcome of `ensure_funding`.
#[derive(Debug, Clone, PartialEq)]
pub struct Funding {
    pub balance: Decimal,
    pub conversion: Option<ConversionReceipt>,
}

/// `(deficit, deficit × (1 + buffer))`. Negative buffers count as zero.
pub fn buffered_deficit(required: Decimal, balance: Decimal, buffer: Decimal) -> (Decimal, Decimal) {
    let deficit = (required - balance).max(Decimal::ZERO);
    if deficit.is_zero() {
        return (Decimal::ZERO, Decimal::ZERO);
    }
    let buffer = buffer.max(Decimal::ZERO);
    (deficit, (deficit * (Decimal::ONE + buffer)).round_dp(AMOUNT_DP))
}

// ---------------------------------------------------------------------------
// Guarantor
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct LiquidityGuarantor {
    node: NodeClient,
    router: ConverterRouter,
    gate: ConfirmationGate,
    waiter: Waiter,
    reserve_currency: String,
    buffer: Decimal,
    operation_interval: Duration,
    balance_interval: Duration,
}

impl LiquidityGuarantor {
    pub fn new(
        node: NodeClient,
        gate: ConfirmationGate,
        waiter: Waiter,
        reserve_currency: &str,
    ) -> Self {
        Self {
            router: ConverterRouter::new(node.clone()),
            node,
            gate,
            waiter,
            reserve_currency: reserve_currency.to_string(),
            buffer: DEFAULT_BUFFER,
            operation_interval: Duration::from_secs(3),
            balance_interval: Duration::from_secs(5),
        }
    }

    pub fn with_buffer(mut self, buffer: Decimal) -> Self {
        self.buffer = buffer.max(Decimal::ZERO);
        self
    }

    pub fn with_intervals(mut self, operation: Duration, balance: Duration) -> Self {
        self.operation_interval = operation;
        self.balance_interval = balance;
        self
    }

    /// Work out balance, deficit and route for `required` of `currency`.
    pub async fn plan(&self, address: &str, currency: &str, required: Decimal) -> Result<LiquidityPlan> {
        let balance = self.node.get_currency_balance(address, currency).await?;
        let (deficit, buffered) = buffered_deficit(required, balance, self.buffer);

        let route = if deficit > Decimal::ZERO {
            Some(
                self.router
                    .find_cheapest_route(&self.reserve_currency, currency, buffered)
                    .await?,
            )
        } else {
            None
        };

        Ok(LiquidityPlan {
            currency: currency.to_string(),
            required,
            balance,
            deficit,
            buffered,
            buffer: self.buffer,
            route,
        })
    }

    /// Ensure `address` holds at least `required` of `currency`; returns the
    /// balance once it does.
    pub async fn ensure(&self, address: &str, currency: &str, required: Decimal) -> Result<Decimal> {
        self.ensure_funding(address, currency, required)
            .await
            .map(|f| f.balance)
    }

    /// As `ensure`, also reporting the conversion that was made, if any.
    pub async fn ensure_funding(&self, address: &str, currency: &str, required: Decimal) -> Result<Funding> {
        let plan = self.plan(address, currency, required).await?;
        let Some(route) = plan.route else {
            info!(balance = %plan.balance, %required, currency, "Sufficient balance, no conversion needed");
            return Ok(Funding {
                balance: plan.balance,
                conversion: None,
            });
        };

        info!(
            balance = %plan.balance,
            deficit = %plan.deficit,
            buffered = %plan.buffered,
            source_amount = %route.source_amount,
            from = %route.from,
            via = %route.via,
            "Converting to cover deficit"
        );
        let receipt = self.convert(address, route).await?;
        let balance = self.await_balance(address, currency, required).await?;

        Ok(Funding {
            balance,
            conversion: Some(receipt),
        })
    }

    async fn convert(&self, address: &str, route: ConversionRoute) -> Result<ConversionReceipt> {
        let output = ConversionOutput {
            address: address.to_string(),
            amount: route.source_amount,
            currency: route.from.clone(),
            convert_to: route.to.clone(),
            via: route.via_for_request().map(str::to_string),
        };

        let submission = self.node.send_currency(address, &output).await?;
        info!(id = submission.id(), "Conversion submitted");

        let txid = match &submission {
            Submission::Operation(opid) => self.await_operation(opid).await?,
            Submission::Transaction(txid) => Some(txid.clone()),
        };

        match &txid {
            Some(txid) => {
                self.gate.await_confirmation(txid, 1).await?;
            }
            None => warn!(id = submission.id(), "Conversion finished without a txid, waiting on balance only"),
        }

        Ok(ConversionReceipt {
            route,
            submission_id: submission.id().to_string(),
            txid,
        })
    }

    /// Poll a wallet operation until it succeeds (returning its txid, if
    /// reported) or fails.
    async fn await_operation(&self, opid: &str) -> Result<Option<String>> {
        info!(opid = short_id(opid, 20), "Waiting for operation");
        let mut wait = self.waiter.begin(format!("operation {opid}"), self.operation_interval);
        loop {
            if let Some(op) = self.node.get_operation_status(opid).await? {
                match op.status {
                    OperationStatus::Success => {
                        let txid = op.txid.filter(|t| !t.is_empty());
                        info!(opid = short_id(opid, 20), txid = ?txid, "Operation succeeded");
                        return Ok(txid);
                    }
                    OperationStatus::Failed => {
                        return Err(BuyerError::ConversionFailed {
                            message: op.error.unwrap_or_else(|| "Operation failed".to_string()),
                        });
                    }
                    status => debug!(opid = short_id(opid, 20), %status, "Operation pending"),
                }
            }
            wait.tick().await?;
        }
    }

    /// Poll the balance until it reaches `required`. Unbounded unless the
    /// waiter carries a limit.
    async fn await_balance(&self, address: &str, currency: &str, required: Decimal) -> Result<Decimal> {
        info!(currency, %required, "Waiting for balance");
        let mut wait = self
            .waiter
            .begin(format!("{currency} balance >= {required}"), self.balance_interval);
        loop {
            let balance = self.node.get_currency_balance(address, currency).await?;
            if balance >= required {
                info!(currency, %balance, "Balance available");
                return Ok(balance);
            }
            debug!(currency, %balance, %required, "Balance still short");
            wait.tick().await?;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
