//! In-memory node for integration testing.
//!
//! Implements `RemoteLedger` over a small simulated wallet and marketplace:
//! offers, balances, converters, wallet operations and transaction
//! confirmations. Every call is logged so tests can assert on ordering.
//!
//! A purchase locks the wallet's spendable outputs until its transaction
//! has been seen confirmed; a `takeoffer` submitted while locked is
//! rejected the way the real node rejects it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use vlotto_buyer::rpc::{BatchEntry, RemoteLedger, RpcCall, RpcError};

pub const ASSET: &str = "vlotto";
pub const RESERVE: &str = "VRSC";
pub const ADDRESS: &str = "RBuyerAddress";

/// Scripted failure for one `takeoffer` on a given offer.
#[derive(Debug, Clone)]
pub enum TakeFailure {
    /// Node refuses the spend; the offer stays listed.
    Rejected,
    /// Any other node error; the offer is removed (taken by someone else).
    Taken,
    /// The purchase goes through but the result carries no txid.
    Untracked,
}

#[derive(Debug, Clone)]
struct ListedOffer {
    txid: String,
    name: Option<String>,
    identity_id: Option<String>,
}

#[derive(Default)]
struct FakeState {
    offers: Vec<ListedOffer>,
    balances: HashMap<String, Decimal>,
    /// Reserve per unit of asset quoted by the direct converter.
    rate: Decimal,
    last_quote: Decimal,
    confirmations: HashMap<String, i64>,
    /// Purchase whose outputs must confirm before the next spend.
    pending_spend: Option<String>,
    failures: HashMap<String, VecDeque<TakeFailure>>,
    purchases: u32,
    log: Vec<(String, Vec<Value>)>,
}

#[derive(Clone)]
pub struct FakeLedger {
    state: Arc<Mutex<FakeState>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        let state = FakeState {
            rate: dec!(2),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// List `count` offers named `{draw}_{i}of{count}`, in reverse order so
    /// tests see that selection sorts by name.
    pub fn with_offers(self, draw: u64, count: u32) -> Self {
        {
            let mut s = self.state.lock().unwrap();
            for i in (1..=count).rev() {
                s.offers.push(ListedOffer {
                    txid: format!("offer{i}"),
                    name: Some(format!("{draw}_{i}of{count}")),
                    identity_id: Some(format!("iTicket{i}")),
                });
            }
        }
        self
    }

    pub fn with_offer(self, txid: &str, name: Option<&str>, identity_id: Option<&str>) -> Self {
        self.state.lock().unwrap().offers.push(ListedOffer {
            txid: txid.to_string(),
            name: name.map(str::to_string),
            identity_id: identity_id.map(str::to_string),
        });
        self
    }

    pub fn with_balance(self, currency: &str, amount: Decimal) -> Self {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(currency.to_string(), amount);
        self
    }

    pub fn fail_take(self, offer_txid: &str, failures: &[TakeFailure]) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(offer_txid.to_string(), failures.iter().cloned().collect());
        self
    }

    pub fn balance(&self, currency: &str) -> Decimal {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(m, _)| m).collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|(m, _)| m == method).count()
    }

    pub fn listed(&self) -> usize {
        self.state.lock().unwrap().offers.len()
    }

    fn handle(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let mut s = self.state.lock().unwrap();
        s.log.push((method.to_string(), params.to_vec()));

        match method {
            "getinfo" => Ok(json!({"blocks": 1000, "connections": 8})),
            "getoffers" => {
                let entries: Vec<Value> = s
                    .offers
                    .iter()
                    .map(|o| {
                        json!({
                            "identityid": o.identity_id,
                            "offer": {"txid": o.txid, "offer": {"name": o.name}},
                        })
                    })
                    .collect();
                Ok(json!({ "currency_vlotto_for_id": entries }))
            }
            "getcurrencybalance" => {
                let map: serde_json::Map<String, Value> = s
                    .balances
                    .iter()
                    .map(|(k, v)| (k.clone(), json!(v)))
                    .collect();
                Ok(Value::Object(map))
            }
            "getcurrencyconverters" => {
                let query: Value = params
                    .first()
                    .and_then(Value::as_str)
                    .and_then(|q| serde_json::from_str(q).ok())
                    .ok_or_else(|| RpcError::fault("invalid query"))?;
                let amount = query["amount"].to_string().parse::<Decimal>().map_err(|_| RpcError::fault("bad amount"))?;
                s.last_quote = amount;
                let direct = amount * s.rate;
                Ok(json!([
                    {"fullyqualifiedname": "Bridge.vETH", "sourceamounts": {RESERVE: direct + dec!(1)}},
                    {"fullyqualifiedname": ASSET, "sourceamounts": {RESERVE: direct}},
                ]))
            }
            "sendcurrency" => {
                let spend = params[1][0]["amount"].to_string().parse::<Decimal>().map_err(|_| RpcError::fault("bad amount"))?;
                let reserve = s.balances.entry(RESERVE.to_string()).or_default();
                if *reserve < spend {
                    return Err(RpcError::fault("Insufficient funds"));
                }
                *reserve -= spend;
                Ok(json!("opid-swap"))
            }
            "z_getoperationstatus" => {
                // Completes on first query and lands the converted funds.
                if !s.confirmations.contains_key("swaptx") {
                    s.confirmations.insert("swaptx".into(), 0);
                    let quote = s.last_quote;
                    *s.balances.entry(ASSET.to_string()).or_default() += quote;
                }
                Ok(json!([{"id": "opid-swap", "status": "success", "result": {"txid": "swaptx"}}]))
            }
            "gettransaction" => {
                let txid = params[0].as_str().unwrap_or_default().to_string();
                let Some(confs) = s.confirmations.get_mut(&txid) else {
                    return Err(RpcError::fault("Invalid or non-wallet transaction id"));
                };
                // One block per poll.
                let seen = *confs;
                *confs += 1;
                if seen >= 1 && s.pending_spend.as_deref() == Some(txid.as_str()) {
                    s.pending_spend = None;
                }
                Ok(json!({"txid": txid, "confirmations": seen}))
            }
            "takeoffer" => self.take_offer(&mut s, params),
            "listidentities" => Ok(json!([])),
            "getidentity" => Err(RpcError::fault("Identity not found")),
            other => Err(RpcError::fault(format!("Method not found: {other}"))),
        }
    }

    fn take_offer(&self, s: &mut FakeState, params: &[Value]) -> Result<Value, RpcError> {
        let offer_txid = params[1]["txid"].as_str().unwrap_or_default().to_string();
        let dry_run = params.get(2) == Some(&json!(true));

        if let Some(failure) = s.failures.get_mut(&offer_txid).and_then(VecDeque::pop_front) {
            return match failure {
                TakeFailure::Rejected => Err(RpcError::fault("Transaction rejected: bad-txns-inputs-spent")),
                TakeFailure::Taken => {
                    s.offers.retain(|o| o.txid != offer_txid);
                    Err(RpcError::fault("Offer is no longer available"))
                }
                TakeFailure::Untracked => {
                    s.offers.retain(|o| o.txid != offer_txid);
                    *s.balances.entry(ASSET.to_string()).or_default() -= dec!(1);
                    s.purchases += 1;
                    Ok(json!({ "status": "submitted" }))
                }
            };
        }

        if !dry_run && s.pending_spend.is_some() {
            return Err(RpcError::fault("Transaction rejected: inputs not yet confirmed"));
        }

        let Some(pos) = s.offers.iter().position(|o| o.txid == offer_txid) else {
            return Err(RpcError::fault("Offer not found"));
        };

        s.purchases += 1;
        let txid = format!("purchase{}", s.purchases);
        if dry_run {
            // Signed hex; the first 64 characters stand in for the txid.
            return Ok(json!(format!("{:0<64}{}", txid, "deadbeef")));
        }

        s.offers.remove(pos);
        *s.balances.entry(ASSET.to_string()).or_default() -= dec!(1);
        s.confirmations.insert(txid.clone(), 0);
        s.pending_spend = Some(txid.clone());
        Ok(json!({ "txid": txid }))
    }
}

#[async_trait]
impl RemoteLedger for FakeLedger {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        self.handle(method, &params)
    }

    async fn batch_call(&self, calls: Vec<RpcCall>) -> Result<Vec<BatchEntry>, RpcError> {
        Ok(calls
            .iter()
            .map(|c| self.handle(&c.method, &c.params))
            .collect())
    }
}
