//! Offer pool.
//!
//! Snapshot of the marketplace offers for the ticket asset. The pool is
//! re-fetched before every selection so offers taken by other buyers drop
//! out, and it is ordered by ticket name so selection is deterministic.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::node::NodeClient;
use crate::types::{Offer, Result};

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Offers are listed including expired ones.
const INCLUDE_EXPIRED: bool = true;

pub struct OfferPool {
    node: NodeClient,
    asset: String,
    offers: Vec<Offer>,
}

impl OfferPool {
    pub fn new(node: NodeClient, asset: &str) -> Self {
        Self {
            node,
            asset: asset.to_string(),
            offers: Vec::new(),
        }
    }

    /// Replace the snapshot with the node's current offers, sorted by name.
    pub async fn refresh(&mut self) -> Result<&[Offer]> {
        let mut offers = self.node.get_offers(&self.asset, INCLUDE_EXPIRED).await?;
        sort_offers(&mut offers);
        debug!(asset = %self.asset, count = offers.len(), "Offer pool refreshed");
        self.offers = offers;
        Ok(&self.offers)
    }

    /// First offer in the current snapshot not in `attempted`.
    pub fn next_unattempted(&self, attempted: &HashSet<String>) -> Option<&Offer> {
        select_next(&self.offers, attempted)
    }

    pub fn summarize(&self) -> OfferSummary {
        summarize(&self.offers)
    }
}

/// Ascending by ticket name; ties keep node order.
pub fn sort_offers(offers: &mut [Offer]) {
    offers.sort_by(|a, b| a.name.cmp(&b.name));
}

/// First offer whose txid is not in `attempted`.
pub fn select_next<'a>(offers: &'a [Offer], attempted: &HashSet<String>) -> Option<&'a Offer> {
    offers.iter().find(|o| !attempted.contains(&o.txid))
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Offers grouped by draw block.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferSummary {
    pub total: usize,
    pub draws: Vec<DrawGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawGroup {
    pub draw_block: u64,
    /// Ticket count per draw as encoded in the names (`..._{i}of{total}`).
    pub total_tickets: Option<u32>,
    pub names: Vec<String>,
}

impl DrawGroup {
    pub fn count(&self) -> usize {
        self.names.len()
    }
}

/// Group offers by draw, most offers first, then by draw block. Names
/// without a draw block (or block 0) count toward `total` only.
pub fn summarize(offers: &[Offer]) -> OfferSummary {
    let mut groups: BTreeMap<u64, DrawGroup> = BTreeMap::new();
    for offer in offers {
        let Some(draw_block) = offer.ticket.draw_block.filter(|b| *b > 0) else {
            continue;
        };
        let group = groups
            .entry(draw_block)
            .or_insert_with(|| DrawGroup {
                draw_block,
                total_tickets: None,
                names: Vec::new(),
            });
        if group.total_tickets.is_none() {
            group.total_tickets = offer.ticket.total;
        }
        group.names.push(offer.name.clone());
    }

    let mut draws: Vec<DrawGroup> = groups.into_values().collect();
    draws.sort_by(|a, b| b.count().cmp(&a.count()).then(a.draw_block.cmp(&b.draw_block)));

    info!(total = offers.len(), draws = draws.len(), "Offer summary");
    OfferSummary {
        total: offers.len(),
        draws,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
