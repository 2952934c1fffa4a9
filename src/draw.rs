//! Draw information: the upcoming draw as published by the ledger identity,
//! merged with what is currently on the marketplace.

use rust_decimal::Decimal;
use tracing::warn;

use crate::engine::offers::OfferSummary;
use crate::node::schema::parse_draw_state;
use crate::node::NodeClient;
use crate::types::{BuyerError, LedgerDrawState, Result};

/// Rough block rate used for the time-to-draw estimate.
pub const BLOCKS_PER_MINUTE: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct DrawInfo {
    pub draw_block: u64,
    pub blocks_until: Option<i64>,
    pub total_tickets: Option<u32>,
    /// Offers listed for this draw.
    pub available: usize,
    pub jackpot: Option<Decimal>,
    pub required_matches: Option<u32>,
    pub phase: Option<String>,
    pub ticket_price: Decimal,
    pub offered: Vec<String>,
}

impl DrawInfo {
    pub fn eta(&self) -> Option<String> {
        self.blocks_until.map(eta_text)
    }
}

/// Read the ledger identity's draw state. Node faults and malformed content
/// yield an empty state.
pub async fn fetch_draw_state(node: &NodeClient, ledger_identity: &str) -> Result<LedgerDrawState> {
    match node.get_identity(ledger_identity).await {
        Ok(v) => Ok(parse_draw_state(&v)),
        Err(BuyerError::Rpc { source, .. }) if !source.is_transport() => {
            warn!(identity = ledger_identity, error = %source, "Ledger identity unavailable");
            Ok(LedgerDrawState::default())
        }
        Err(e) => Err(e),
    }
}

/// Combine the ledger state with the busiest draw on the marketplace.
/// `None` when no offer belongs to a draw.
pub fn assemble(
    height: u64,
    ledger: &LedgerDrawState,
    offers: &OfferSummary,
    ticket_price: Decimal,
) -> Option<DrawInfo> {
    let top = offers.draws.first()?;
    let draw_block = ledger.drawing_block.unwrap_or(top.draw_block);

    Some(DrawInfo {
        draw_block,
        blocks_until: blocks_until(draw_block, height),
        total_tickets: ledger.planned_tickets.or(top.total_tickets),
        available: top.count(),
        jackpot: ledger.jackpot,
        required_matches: ledger.required_matches,
        phase: ledger.phase_display(),
        ticket_price,
        offered: top.names.clone(),
    })
}

/// Blocks remaining until `draw_block`; negative once it has passed.
/// `None` when either height is unknown (zero).
pub fn blocks_until(draw_block: u64, height: u64) -> Option<i64> {
    if draw_block == 0 || height == 0 {
        return None;
    }
    Some(draw_block as i64 - height as i64)
}

/// `~1.5 hours` or `~42 minutes`.
pub fn eta_text(blocks: i64) -> String {
    let minutes = blocks / BLOCKS_PER_MINUTE;
    if minutes >= 60 {
        format!("~{:.1} hours", minutes as f64 / 60.0)
    } else {
        format!("~{minutes} minutes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::offers::summarize;
    use crate::rpc::{MockRemoteLedger, RpcError};
    use crate::types::Offer;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn test_eta_text() {
        assert_eq!(eta_text(90), "~1.5 hours");
        assert_eq!(eta_text(42), "~42 minutes");
        assert_eq!(eta_text(60), "~1.0 hours");
    }

    #[test]
    fn test_blocks_until() {
        assert_eq!(blocks_until(1000, 900), Some(100));
        assert_eq!(blocks_until(1000, 1010), Some(-10));
        assert_eq!(blocks_until(1000, 0), None);
    }

    #[test]
    fn test_assemble_prefers_ledger_values() {
        let offers = summarize(&[
            Offer::new("a", Some("500_1of8"), Some("i1")),
            Offer::new("b", Some("500_2of8"), Some("i2")),
        ]);
        let ledger = LedgerDrawState {
            drawing_block: Some(520),
            planned_tickets: Some(32),
            current_phase: Some("phase_2_sales".into()),
            ..Default::default()
        };
        let info = assemble(400, &ledger, &offers, dec!(1)).unwrap();
        assert_eq!(info.draw_block, 520);
        assert_eq!(info.blocks_until, Some(120));
        assert_eq!(info.eta().as_deref(), Some("~2.0 hours"));
        assert_eq!(info.total_tickets, Some(32));
        assert_eq!(info.available, 2);
        assert_eq!(info.phase.as_deref(), Some("Phase  2 sales"));

        let info = assemble(400, &LedgerDrawState::default(), &offers, dec!(1)).unwrap();
        assert_eq!(info.draw_block, 500);
        assert_eq!(info.total_tickets, Some(8));
    }

    #[test]
    fn test_assemble_without_offers() {
        let offers = summarize(&[]);
        assert!(assemble(1, &LedgerDrawState::default(), &offers, dec!(1)).is_none());
    }

    #[test]
    fn test_assemble_uses_real_draw_over_unnamed_offers() {
        let offers = summarize(&[
            Offer::new("a", Some("500_1of8"), Some("i1")),
            Offer::new("b", Some("promo1"), Some("i2")),
            Offer::new("c", Some("promo2"), Some("i3")),
        ]);
        let info = assemble(400, &LedgerDrawState::default(), &offers, dec!(1)).unwrap();
        assert_eq!(info.draw_block, 500);
        assert_eq!(info.available, 1);
        assert_eq!(info.offered, vec!["500_1of8"]);

        let garbage = summarize(&[
            Offer::new("b", Some("promo1"), Some("i2")),
            Offer::new("c", Some("promo2"), Some("i3")),
        ]);
        assert!(assemble(400, &LedgerDrawState::default(), &garbage, dec!(1)).is_none());
    }

    #[tokio::test]
    async fn test_missing_ledger_identity_is_empty() {
        let mut mock = MockRemoteLedger::new();
        mock.expect_call()
            .returning(|_, _| Err(RpcError::fault("Identity not found")));
        let node = NodeClient::new(Arc::new(mock));
        let state = fetch_draw_state(&node, "ledger.vlotto@").await.unwrap();
        assert_eq!(state, LedgerDrawState::default());
    }
}
