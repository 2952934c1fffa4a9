//! Wallet views: funded addresses, per-address balances and owned tickets.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::node::schema::lookup_balance;
use crate::node::NodeClient;
use crate::types::{BuyerError, Result, TicketName};

#[derive(Debug, Clone, PartialEq)]
pub struct AddressBalance {
    pub address: String,
    pub reserve: Decimal,
    pub asset: Decimal,
}

#[derive(Clone)]
pub struct Wallet {
    node: NodeClient,
    reserve_currency: String,
    asset: String,
    asset_currency_id: String,
}

impl Wallet {
    pub fn new(node: NodeClient, reserve_currency: &str, asset: &str, asset_currency_id: &str) -> Self {
        Self {
            node,
            reserve_currency: reserve_currency.to_string(),
            asset: asset.to_string(),
            asset_currency_id: asset_currency_id.to_string(),
        }
    }

    /// Addresses holding at least `min_reserve` of the native reserve,
    /// richest first, with their asset balances fetched in one batch.
    pub async fn funded_addresses(&self, min_reserve: Decimal) -> Result<Vec<AddressBalance>> {
        let mut funded: Vec<(String, Decimal)> = self
            .node
            .list_address_groupings()
            .await?
            .into_iter()
            .filter(|(_, balance)| *balance >= min_reserve)
            .collect();
        funded.sort_by(|a, b| b.1.cmp(&a.1));

        let addresses: Vec<String> = funded.iter().map(|(a, _)| a.clone()).collect();
        let asset_balances = self.node.batch_currency_balances(&addresses).await?;

        Ok(funded
            .into_iter()
            .zip(asset_balances)
            .map(|((address, reserve), balances)| AddressBalance {
                address,
                reserve,
                asset: lookup_balance(&balances, &self.asset),
            })
            .collect())
    }

    /// Reserve and asset balance of one address.
    pub async fn balances(&self, address: &str) -> Result<AddressBalance> {
        let balances = self.node.get_currency_balances(address).await?;
        Ok(AddressBalance {
            address: address.to_string(),
            reserve: lookup_balance(&balances, &self.reserve_currency),
            asset: lookup_balance(&balances, &self.asset),
        })
    }

    /// Ticket identities controlled by this wallet, sorted by name.
    /// With `address`, only tickets whose primary addresses include it.
    pub async fn owned_tickets(&self, address: Option<&str>) -> Result<Vec<String>> {
        let identities = match self.node.list_identities().await {
            Ok(ids) => ids,
            Err(BuyerError::Rpc { source, .. }) if !source.is_transport() => {
                warn!(error = %source, "Identity listing failed, assuming no tickets");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut tickets: Vec<String> = identities
            .into_iter()
            .filter(|id| id.parent == self.asset_currency_id)
            .filter(|id| address.map_or(true, |a| id.primaryaddresses.iter().any(|p| p == a)))
            .map(|id| id.name)
            .collect();
        tickets.sort();
        debug!(count = tickets.len(), address = ?address, "Owned tickets");
        Ok(tickets)
    }
}

/// Tickets belonging to `draw_block`; all tickets when the draw is unknown.
pub fn tickets_for_draw(tickets: &[String], draw_block: Option<u64>) -> Vec<String> {
    match draw_block {
        Some(block) => tickets
            .iter()
            .filter(|t| TicketName::parse(t).draw_block == Some(block))
            .cloned()
            .collect(),
        None => tickets.to_vec(),
    }
}
