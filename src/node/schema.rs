//! Result schemas for the node RPC methods we consume.
//!
//! Every method gets an explicit shape with `#[serde(default)]` on the fields
//! the node may omit. Shapes that carry lists of loosely-typed entries are
//! parsed entry by entry so a single odd entry never poisons the whole set.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::types::{LedgerDrawState, Offer, OperationStatus, WalletOperation};

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

/// Read a JSON number or numeric string as a decimal.
pub fn value_to_decimal(v: &Value) -> Option<Decimal> {
    let text = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

// ---------------------------------------------------------------------------
// getinfo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub blocks: u64,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub connections: Option<u32>,
}

// ---------------------------------------------------------------------------
// getoffers
// ---------------------------------------------------------------------------

/// `{identityid, offer: {txid, offer: {name}}}`
#[derive(Debug, Default, Deserialize)]
struct RawOfferEntry {
    #[serde(default)]
    identityid: Option<String>,
    #[serde(default)]
    offer: Option<RawOffer>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOffer {
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    offer: Option<RawOfferBody>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOfferBody {
    #[serde(default)]
    name: Option<String>,
}

/// The offer list is either the result itself or the only array-valued
/// field of an object keyed by offer category.
pub fn extract_offer_list(result: Value) -> Vec<Value> {
    match result {
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut lists: Vec<Vec<Value>> = map
                .into_iter()
                .filter_map(|(_, v)| match v {
                    Value::Array(items) => Some(items),
                    _ => None,
                })
                .collect();
            if lists.len() == 1 {
                lists.remove(0)
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

/// Parse one offer entry. Entries without an offer txid cannot be taken and
/// yield `None`.
pub fn parse_offer(entry: Value) -> Option<Offer> {
    let raw: RawOfferEntry = serde_json::from_value(entry).ok()?;
    let offer = raw.offer?;
    let txid = offer.txid.filter(|t| !t.is_empty())?;
    let name = offer.offer.and_then(|b| b.name);
    Some(Offer::new(&txid, name.as_deref(), raw.identityid.as_deref()))
}

// ---------------------------------------------------------------------------
// getcurrencybalance
// ---------------------------------------------------------------------------

/// `{currency: amount}`; unparsable amounts are dropped.
pub fn parse_balance_map(result: &Value) -> HashMap<String, Decimal> {
    result
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| value_to_decimal(v).map(|d| (k.clone(), d)))
                .collect()
        })
        .unwrap_or_default()
}

/// Exact key first, then case-insensitive; absent means zero.
pub fn lookup_balance(balances: &HashMap<String, Decimal>, currency: &str) -> Decimal {
    if let Some(b) = balances.get(currency) {
        return *b;
    }
    balances
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(currency))
        .map(|(_, v)| *v)
        .unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// listaddressgroupings
// ---------------------------------------------------------------------------

/// `[[[address, amount, account?], ...], ...]`
pub fn parse_address_groupings(result: &Value) -> Vec<(String, Decimal)> {
    let mut out = Vec::new();
    let Some(groups) = result.as_array() else {
        return out;
    };
    for entry in groups.iter().filter_map(Value::as_array).flatten() {
        let Some(fields) = entry.as_array() else { continue };
        if fields.len() < 2 {
            continue;
        }
        let Some(address) = fields[0].as_str() else { continue };
        let amount = value_to_decimal(&fields[1]).unwrap_or(Decimal::ZERO);
        out.push((address.to_string(), amount));
    }
    out
}

// ---------------------------------------------------------------------------
// getcurrencyconverters
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawConverter {
    #[serde(default)]
    fullyqualifiedname: Option<String>,
    #[serde(default)]
    sourceamounts: Option<Map<String, Value>>,
}

/// One converter advertising the requested conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterCandidate {
    pub name: String,
    /// Positive source amount quoted for the requested output, if any.
    pub quoted: Option<Decimal>,
}

/// Parse the converter list in discovery order. Entries without a name or
/// a source-amount map are skipped.
///
/// The quote is the amount keyed by the source currency when the node keys
/// it that way, otherwise the first positive amount in the map.
pub fn parse_converters(result: &Value, from_currency: &str) -> Vec<ConverterCandidate> {
    let Some(items) = result.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| serde_json::from_value::<RawConverter>(item.clone()).ok())
        .filter_map(|raw| {
            let name = raw.fullyqualifiedname.filter(|n| !n.is_empty())?;
            let amounts = raw.sourceamounts.filter(|m| !m.is_empty())?;

            let positive = |v: &Value| value_to_decimal(v).filter(|d| *d > Decimal::ZERO);
            let keyed = amounts
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(from_currency))
                .and_then(|(_, v)| positive(v));
            let quoted = keyed.or_else(|| amounts.values().find_map(positive));

            Some(ConverterCandidate { name, quoted })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// sendcurrency / takeoffer
// ---------------------------------------------------------------------------

/// Id returned by a submission: a bare string or `{txid}`.
pub fn parse_submission_id(result: &Value) -> Option<String> {
    match result {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("txid").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Transaction id of a `takeoffer` result. A string result is either the
/// txid or, with `returntx`, the raw transaction hex whose first 64
/// characters are taken.
pub fn parse_take_offer_txid(result: &Value) -> Option<String> {
    match result {
        Value::String(s) => {
            let s = s.trim();
            (s.len() >= 64 && s.is_char_boundary(64)).then(|| s[..64].to_string())
        }
        Value::Object(map) => map.get("txid").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// z_getoperationstatus
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawOperation {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    result: Option<RawOperationResult>,
    #[serde(default)]
    error: Option<RawOperationError>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOperationResult {
    #[serde(default)]
    txid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOperationError {
    #[serde(default)]
    message: Option<String>,
}

/// First entry of the status list, or `None` if the node does not know the
/// operation (yet).
pub fn parse_operation_status(result: &Value) -> Option<WalletOperation> {
    let first = result.as_array()?.first()?.clone();
    let raw: RawOperation = serde_json::from_value(first).ok()?;
    Some(WalletOperation {
        id: raw.id,
        status: OperationStatus::parse(&raw.status),
        txid: raw.result.and_then(|r| r.txid),
        error: raw.error.and_then(|e| e.message),
    })
}

// ---------------------------------------------------------------------------
// gettransaction
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub confirmations: i64,
}

// ---------------------------------------------------------------------------
// listidentities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentitySummary {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent: String,
    #[serde(default)]
    pub primaryaddresses: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIdentityEntry {
    #[serde(default)]
    identity: Option<IdentitySummary>,
}

pub fn parse_identities(result: &Value) -> Vec<IdentitySummary> {
    result
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| serde_json::from_value::<RawIdentityEntry>(i.clone()).ok())
                .filter_map(|e| e.identity)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// getidentity (ledger draw state)
// ---------------------------------------------------------------------------

/// Find the lottery status message in `identity.contentmultimap` and read
/// the draw parameters out of it.
pub fn parse_draw_state(result: &Value) -> LedgerDrawState {
    let Some(multimap) = result
        .pointer("/identity/contentmultimap")
        .and_then(Value::as_object)
    else {
        return LedgerDrawState::default();
    };

    let messages = multimap
        .values()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_object)
        .flat_map(|entry| entry.values())
        .filter_map(|inner| inner.pointer("/objectdata/message").and_then(Value::as_str));

    for message in messages {
        if !message.starts_with('{') {
            continue;
        }
        if let Ok(data) = serde_json::from_str::<Value>(message) {
            return draw_state_from_message(&data);
        }
    }
    LedgerDrawState::default()
}

fn draw_state_from_message(data: &Value) -> LedgerDrawState {
    let u32_at = |p: &str| data.pointer(p).and_then(Value::as_u64).and_then(|n| u32::try_from(n).ok());
    LedgerDrawState {
        jackpot: data.pointer("/financialSummary/jackpotCurrent").and_then(value_to_decimal),
        required_matches: u32_at("/lotteryParameters/requiredMatches"),
        drawing_block: data.pointer("/lotteryParameters/drawingBlock").and_then(Value::as_u64),
        planned_tickets: u32_at("/ticketSummary/planned"),
        tickets_on_marketplace: u32_at("/ticketSummary/onMarketplace"),
        current_phase: data.get("currentPhase").and_then(Value::as_str).map(str::to_string),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
