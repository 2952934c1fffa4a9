//! Converter router.
//!
//! Finds the cheapest way to obtain an exact amount of a currency. Quotes
//! are requested fresh on every call; conversion rates move between blocks.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::node::schema::ConverterCandidate;
use crate::node::NodeClient;
use crate::types::{BuyerError, ConversionRoute, Result};

/// Native precision of ledger amounts.
pub const AMOUNT_DP: u32 = 8;

#[derive(Clone)]
pub struct ConverterRouter {
    node: NodeClient,
}

impl ConverterRouter {
    pub fn new(node: NodeClient) -> Self {
        Self { node }
    }

    /// Route requiring the least `from` to deliver exactly `exact_output`
    /// of `to`.
    pub async fn find_cheapest_route(
        &self,
        from: &str,
        to: &str,
        exact_output: Decimal,
    ) -> Result<ConversionRoute> {
        let amount = exact_output.round_dp(AMOUNT_DP);
        let candidates = self.node.get_currency_converters(from, to, amount).await?;
        debug!(from, to, %amount, candidates = candidates.len(), "Converter candidates");

        let route = select_cheapest(from, to, amount, &candidates)?;
        info!(
            from,
            to,
            via = %route.via,
            source_amount = %route.source_amount,
            destination_amount = %route.destination_amount,
            "Cheapest conversion route"
        );
        Ok(route)
    }
}

/// Minimum quoted source amount; the first candidate wins ties.
pub fn select_cheapest(
    from: &str,
    to: &str,
    exact_output: Decimal,
    candidates: &[ConverterCandidate],
) -> Result<ConversionRoute> {
    let mut best: Option<(&ConverterCandidate, Decimal)> = None;
    for candidate in candidates {
        let Some(quoted) = candidate.quoted.filter(|q| *q > Decimal::ZERO) else {
            continue;
        };
        if best.map_or(true, |(_, b)| quoted < b) {
            best = Some((candidate, quoted));
        }
    }

    let (candidate, quoted) = best.ok_or_else(|| BuyerError::NoRouteFound {
        from: from.to_string(),
        to: to.to_string(),
    })?;

    Ok(ConversionRoute {
        from: from.to_string(),
        to: to.to_string(),
        via: candidate.name.clone(),
        source_amount: quoted.round_dp(AMOUNT_DP),
        destination_amount: exact_output,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
