//! Typed access to the node's RPC methods.
//!
//! `NodeClient` wraps a `RemoteLedger` and turns each method we use into a
//! function with Rust-typed inputs and outputs (see `schema` for result
//! shapes). Soft-fail rules that belong to a single method (balances read as
//! zero, unknown transactions as unconfirmed) live here too.

pub mod schema;

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::rpc::{RemoteLedger, RpcCall, RpcError};
use crate::types::{BuyerError, Offer, Result, Submission, Transaction, WalletOperation};
use schema::{ConverterCandidate, IdentitySummary, NodeInfo};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// One `sendcurrency` output converting `currency` into `convert_to`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutput {
    pub address: String,
    pub amount: Decimal,
    pub currency: String,
    pub convert_to: String,
    pub via: Option<String>,
}

impl ConversionOutput {
    fn to_json(&self) -> Value {
        let mut obj = json!({
            "address": self.address,
            "amount": self.amount.round_dp(8),
            "currency": self.currency,
            "convertto": self.convert_to,
        });
        if let Some(via) = &self.via {
            obj["via"] = json!(via);
        }
        obj
    }
}

/// `takeoffer` request accepting a ticket identity offer.
#[derive(Debug, Clone, PartialEq)]
pub struct TakeOfferRequest {
    pub from_address: String,
    pub change_address: String,
    pub offer_txid: String,
    /// Name of the identity to be created, e.g. `3906000_1of32@`.
    pub identity_name: String,
    pub parent: String,
    pub identity_id: String,
    /// Currency id and amount paid for the identity.
    pub deliver_currency: String,
    pub deliver_amount: Decimal,
    /// Return the signed transaction instead of broadcasting it.
    pub return_tx: bool,
}

impl TakeOfferRequest {
    fn to_params(&self) -> Vec<Value> {
        let mut params = vec![
            json!(self.from_address),
            json!({
                "txid": self.offer_txid,
                "changeaddress": self.change_address,
                "deliver": {
                    "currency": self.deliver_currency,
                    "amount": self.deliver_amount,
                },
                "accept": {
                    "name": self.identity_name,
                    "parent": self.parent,
                    "primaryaddresses": [self.from_address],
                    "minimumsignatures": 1,
                    "identityid": self.identity_id,
                },
            }),
        ];
        if self.return_tx {
            params.push(json!(true));
        }
        params
    }
}

/// What `takeoffer` returned.
#[derive(Debug, Clone, PartialEq)]
pub struct TakeOfferResult {
    pub txid: Option<String>,
    pub raw: Value,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Typed node API over any `RemoteLedger`. Cheap to clone.
#[derive(Clone)]
pub struct NodeClient {
    ledger: Arc<dyn RemoteLedger>,
}

impl NodeClient {
    pub fn new(ledger: Arc<dyn RemoteLedger>) -> Self {
        Self { ledger }
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.ledger
            .call(method, params)
            .await
            .map_err(|e| BuyerError::rpc(method, e))
    }

    pub async fn get_info(&self) -> Result<NodeInfo> {
        let v = self.call("getinfo", vec![]).await?;
        serde_json::from_value(v).map_err(|e| BuyerError::Schema {
            method: "getinfo".into(),
            detail: e.to_string(),
        })
    }

    /// Live offers for `asset`, in node order.
    pub async fn get_offers(&self, asset: &str, include_expired: bool) -> Result<Vec<Offer>> {
        let v = self
            .call("getoffers", vec![json!(asset), json!(include_expired)])
            .await?;
        let entries = schema::extract_offer_list(v);
        let total = entries.len();
        let offers: Vec<Offer> = entries.into_iter().filter_map(schema::parse_offer).collect();
        if offers.len() < total {
            debug!(dropped = total - offers.len(), "Offers without txid ignored");
        }
        Ok(offers)
    }

    /// All currency balances held by `address`. Node faults read as an empty
    /// wallet; transport failures propagate.
    pub async fn get_currency_balances(&self, address: &str) -> Result<HashMap<String, Decimal>> {
        match self.call("getcurrencybalance", vec![json!(address)]).await {
            Ok(v) => Ok(schema::parse_balance_map(&v)),
            Err(BuyerError::Rpc { source, .. }) if !source.is_transport() => {
                warn!(address, error = %source, "Balance lookup failed, treating as empty");
                Ok(HashMap::new())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_currency_balance(&self, address: &str, currency: &str) -> Result<Decimal> {
        let balances = self.get_currency_balances(address).await?;
        Ok(schema::lookup_balance(&balances, currency))
    }

    /// Balances for many addresses in one batch round trip, in input order.
    pub async fn batch_currency_balances(
        &self,
        addresses: &[String],
    ) -> Result<Vec<HashMap<String, Decimal>>> {
        let calls = addresses
            .iter()
            .map(|a| RpcCall::new("getcurrencybalance", vec![json!(a)]))
            .collect();
        let entries = self
            .ledger
            .batch_call(calls)
            .await
            .map_err(|e| BuyerError::rpc("getcurrencybalance", e))?;

        Ok(entries
            .into_iter()
            .map(|entry| match entry {
                Ok(v) => schema::parse_balance_map(&v),
                Err(e) => {
                    debug!(error = %e, "Batched balance lookup failed");
                    HashMap::new()
                }
            })
            .collect())
    }

    /// `(address, native balance)` for every wallet address.
    pub async fn list_address_groupings(&self) -> Result<Vec<(String, Decimal)>> {
        let v = self.call("listaddressgroupings", vec![]).await?;
        Ok(schema::parse_address_groupings(&v))
    }

    /// Converters able to deliver exactly `amount` of `to` from `from`.
    pub async fn get_currency_converters(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<Vec<ConverterCandidate>> {
        let query = json!({
            "fromcurrency": [{"currency": from}],
            "convertto": to,
            "amount": amount.round_dp(8),
        });
        let v = self
            .call("getcurrencyconverters", vec![json!(query.to_string())])
            .await?;
        Ok(schema::parse_converters(&v, from))
    }

    pub async fn send_currency(
        &self,
        from_address: &str,
        output: &ConversionOutput,
    ) -> Result<Submission> {
        let v = self
            .call("sendcurrency", vec![json!(from_address), json!([output.to_json()])])
            .await?;
        let id = schema::parse_submission_id(&v).ok_or_else(|| BuyerError::Schema {
            method: "sendcurrency".into(),
            detail: format!("no operation or transaction id in {v}"),
        })?;
        Ok(Submission::parse(&id))
    }

    /// Current state of a wallet operation; `None` while the node does not
    /// report it.
    pub async fn get_operation_status(&self, opid: &str) -> Result<Option<WalletOperation>> {
        let v = self
            .call("z_getoperationstatus", vec![json!([opid])])
            .await?;
        Ok(schema::parse_operation_status(&v))
    }

    /// Confirmation count of `txid`. A node fault (e.g. the wallet does not
    /// know the transaction yet) reads as zero confirmations.
    pub async fn get_transaction(&self, txid: &str) -> Result<Transaction> {
        let confirmations = match self.call("gettransaction", vec![json!(txid)]).await {
            Ok(v) => serde_json::from_value::<schema::RawTransaction>(v)
                .map(|t| t.confirmations)
                .unwrap_or(0),
            Err(BuyerError::Rpc { source: RpcError::Fault { message, .. }, .. }) => {
                debug!(txid, error = %message, "gettransaction fault, assuming unconfirmed");
                0
            }
            Err(e) => return Err(e),
        };
        Ok(Transaction {
            txid: txid.to_string(),
            confirmations,
        })
    }

    pub async fn take_offer(&self, request: &TakeOfferRequest) -> Result<TakeOfferResult> {
        let raw = self.call("takeoffer", request.to_params()).await?;
        Ok(TakeOfferResult {
            txid: schema::parse_take_offer_txid(&raw),
            raw,
        })
    }

    /// Raw identity record.
    pub async fn get_identity(&self, name: &str) -> Result<Value> {
        self.call("getidentity", vec![json!(name)]).await
    }

    /// Identities controlled by this wallet.
    pub async fn list_identities(&self) -> Result<Vec<IdentitySummary>> {
        let v = self.call("listidentities", vec![]).await?;
        Ok(schema::parse_identities(&v))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
