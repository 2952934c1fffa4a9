//! Shared types for the ticket buyer.
//!
//! The data model used across the node wrappers, the engine components and
//! the console front end. Everything here is a snapshot value: offers,
//! operations and transactions are re-fetched from the node, never mutated.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rpc::RpcError;

// ---------------------------------------------------------------------------
// Tickets and offers
// ---------------------------------------------------------------------------

/// Ticket identity name, `{draw_block}_{index}of{total}` (e.g. `3906000_32of32`).
///
/// Parsing never fails: malformed parts are left as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketName {
    pub raw: String,
    pub draw_block: Option<u64>,
    pub index: Option<u32>,
    pub total: Option<u32>,
}

impl TicketName {
    pub fn parse(name: &str) -> Self {
        let mut parsed = TicketName {
            raw: name.to_string(),
            draw_block: None,
            index: None,
            total: None,
        };

        let Some((draw, rest)) = name.split_once('_') else {
            return parsed;
        };
        parsed.draw_block = draw.parse().ok();

        let parts: Vec<&str> = rest.split("of").collect();
        if let [index, total] = parts.as_slice() {
            if let (Ok(i), Ok(t)) = (index.parse(), total.parse()) {
                parsed.index = Some(i);
                parsed.total = Some(t);
            }
        }
        parsed
    }
}

impl fmt::Display for TicketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// One marketplace listing of a ticket identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Transaction id of the offer; the offer's unique key.
    pub txid: String,
    /// Ticket name; empty when the node omitted it.
    pub name: String,
    pub ticket: TicketName,
    /// Identity id the accepted identity must carry.
    pub identity_id: Option<String>,
}

impl Offer {
    pub fn new(txid: &str, name: Option<&str>, identity_id: Option<&str>) -> Self {
        let name = name.unwrap_or_default().to_string();
        Self {
            txid: txid.to_string(),
            ticket: TicketName::parse(&name),
            name,
            identity_id: identity_id.map(str::to_string),
        }
    }
}

impl fmt::Display for Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() { "<unnamed>" } else { &self.name };
        write!(f, "{name} ({})", short_id(&self.txid, 16))
    }
}

/// Truncate an id for display.
pub fn short_id(id: &str, len: usize) -> &str {
    match id.char_indices().nth(len) {
        Some((i, _)) => &id[..i],
        None => id,
    }
}

// ---------------------------------------------------------------------------
// Draw state
// ---------------------------------------------------------------------------

/// Lottery parameters published in the ledger identity's content store.
/// Every field is optional: missing or malformed data is not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerDrawState {
    pub jackpot: Option<Decimal>,
    pub required_matches: Option<u32>,
    pub drawing_block: Option<u64>,
    pub planned_tickets: Option<u32>,
    pub tickets_on_marketplace: Option<u32>,
    pub current_phase: Option<String>,
}

impl LedgerDrawState {
    /// Phase tag with underscores spelled out for display.
    pub fn phase_display(&self) -> Option<String> {
        self.current_phase
            .as_ref()
            .map(|p| p.replace('_', " ").replace("phase", "Phase "))
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Cheapest known way to obtain an exact amount of `to` by spending `from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRoute {
    pub from: String,
    pub to: String,
    /// Fully qualified name of the converter the quote came from.
    pub via: String,
    /// Source amount required, rounded to 8 decimal places.
    pub source_amount: Decimal,
    /// Exact destination amount the quote was requested for.
    pub destination_amount: Decimal,
}

impl ConversionRoute {
    /// The `via` tag to put on a conversion request. Omitted for direct
    /// conversions into the destination basket itself.
    pub fn via_for_request(&self) -> Option<&str> {
        (!self.via.eq_ignore_ascii_case(&self.to)).then_some(self.via.as_str())
    }
}

impl fmt::Display for ConversionRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} {} via {}",
            self.source_amount, self.from, self.destination_amount, self.to, self.via
        )
    }
}

// ---------------------------------------------------------------------------
// Wallet operations and transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Queued,
    Executing,
    Success,
    Failed,
    /// Any status string the node reports that we do not recognise.
    Other(String),
}

impl OperationStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "queued" => OperationStatus::Queued,
            "executing" => OperationStatus::Executing,
            "success" => OperationStatus::Success,
            "failed" => OperationStatus::Failed,
            other => OperationStatus::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Success | OperationStatus::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Queued => write!(f, "queued"),
            OperationStatus::Executing => write!(f, "executing"),
            OperationStatus::Success => write!(f, "success"),
            OperationStatus::Failed => write!(f, "failed"),
            OperationStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Asynchronous wallet job (`opid-...`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletOperation {
    pub id: String,
    pub status: OperationStatus,
    pub txid: Option<String>,
    pub error: Option<String>,
}

/// What a `sendcurrency` submission handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Operation(String),
    Transaction(String),
}

impl Submission {
    pub fn parse(id: &str) -> Self {
        if id.starts_with("opid-") {
            Submission::Operation(id.to_string())
        } else {
            Submission::Transaction(id.to_string())
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Submission::Operation(id) | Submission::Transaction(id) => id,
        }
    }
}

/// Confirmation count reported for orphaned or unknown transactions.
pub const ORPHANED_CONFIRMATIONS: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    pub confirmations: i64,
}

impl Transaction {
    pub fn is_orphaned(&self) -> bool {
        self.confirmations == ORPHANED_CONFIRMATIONS
    }
}

// ---------------------------------------------------------------------------
// Acquisition
// ---------------------------------------------------------------------------

/// Result of trying to take one offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Bought { txid: Option<String> },
    /// The node rejected the spend (typically our outputs still in use);
    /// the offer goes back into the pool.
    Contended { message: String },
    /// Offer unusable as listed (missing txid, name or identity id).
    Rejected { reason: String },
    /// Any other node error. The offer is not retried.
    Error { message: String },
}

impl AttemptOutcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttemptOutcome::Contended { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionAttempt {
    pub offer: Offer,
    pub outcome: AttemptOutcome,
}

/// Final status of a purchase run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Success,
    Partial,
    Failed,
}

impl RunOutcome {
    pub fn classify(bought: u32, target: u32) -> Self {
        if bought >= target && target > 0 {
            RunOutcome::Success
        } else if bought > 0 {
            RunOutcome::Partial
        } else {
            RunOutcome::Failed
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Success => write!(f, "SUCCESS"),
            RunOutcome::Partial => write!(f, "PARTIAL"),
            RunOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, BuyerError>;

/// Domain errors raised by the engine.
#[derive(Debug, thiserror::Error)]
pub enum BuyerError {
    #[error("{method}: {source}")]
    Rpc {
        method: String,
        #[source]
        source: RpcError,
    },

    #[error("Unexpected {method} response: {detail}")]
    Schema { method: String, detail: String },

    #[error("No usable converter route found for {from} -> {to}")]
    NoRouteFound { from: String, to: String },

    #[error("Conversion failed: {message}")]
    ConversionFailed { message: String },

    #[error("Transaction {txid} was orphaned (confirmations=-1)")]
    Orphaned { txid: String },

    #[error("Purchase of {ticket} returned no txid, cannot confirm it before the next purchase")]
    MissingTxid { ticket: String },

    #[error("Offer {txid} unusable: {reason}")]
    InvalidOffer { txid: String, reason: String },

    #[error("Timed out waiting for {0}")]
    TimedOut(String),

    #[error("Cancelled")]
    Cancelled,
}

impl BuyerError {
    pub fn rpc(method: &str, source: RpcError) -> Self {
        BuyerError::Rpc {
            method: method.to_string(),
            source,
        }
    }

    /// Whether the error is the node refusing a spend that may succeed once
    /// pending outputs confirm.
    ///
    /// The node has no dedicated error code for this, so the message text is
    /// matched. Only node faults qualify, never transport failures.
    pub fn is_rejection(&self) -> bool {
        match self {
            BuyerError::Rpc {
                source: RpcError::Fault { message, .. },
                ..
            } => is_rejection_message(message),
            _ => false,
        }
    }

    /// Transport failures and interruption abort the whole run.
    pub fn is_fatal(&self) -> bool {
        match self {
            BuyerError::Rpc { source, .. } => source.is_transport(),
            BuyerError::Orphaned { .. } | BuyerError::Cancelled | BuyerError::TimedOut(_) => true,
            _ => false,
        }
    }
}

pub fn is_rejection_message(message: &str) -> bool {
    message.to_lowercase().contains("rejected")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
