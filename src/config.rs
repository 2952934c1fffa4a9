//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! field has a default, so a missing file or a partial one is fine. RPC
//! credentials are normally discovered from the node's own config file
//! (see `credentials`); the `VLOTTO_RPC_*` variables override both.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::engine::{PollIntervals, TicketMarket};

/// Environment variable holding the buyer address.
pub const ADDRESS_ENV: &str = "VERUS_ADDRESS";
pub const RPC_URL_ENV: &str = "VLOTTO_RPC_URL";
pub const RPC_USER_ENV: &str = "VLOTTO_RPC_USER";
pub const RPC_PASSWORD_ENV: &str = "VLOTTO_RPC_PASSWORD";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub market: MarketConfig,
    pub buyer: BuyerConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NodeConfig {
    pub rpc_url: String,
    /// Explicit node config file; searched in the platform default
    /// locations when unset.
    pub conf_path: Option<String>,
    pub timeout_secs: u64,
    pub batch_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:27486/".into(),
            conf_path: None,
            timeout_secs: 60,
            batch_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketConfig {
    /// Currency the tickets are listed under and paid in.
    pub asset: String,
    pub currency_id: String,
    pub parent: String,
    /// Identity whose content map publishes the draw state.
    pub ledger_identity: String,
    pub reserve_currency: String,
    pub ticket_price: Decimal,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            asset: "vlotto".into(),
            currency_id: "iMLmoaN3SS8KdJwb7fG4WZxJMFrjJxHBfj".into(),
            parent: "vlotto".into(),
            ledger_identity: "ledger.vlotto@".into(),
            reserve_currency: "VRSC".into(),
            ticket_price: dec!(1),
        }
    }
}

impl MarketConfig {
    pub fn ticket_market(&self) -> TicketMarket {
        TicketMarket {
            asset: self.asset.clone(),
            currency_id: self.currency_id.clone(),
            parent: self.parent.clone(),
            ticket_price: self.ticket_price,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BuyerConfig {
    /// Safety margin added to a conversion, as a fraction (0.01 = 1%).
    pub buffer: Decimal,
    pub dry_run: bool,
    /// Addresses holding less reserve currency than this are not offered.
    pub min_reserve_balance: Decimal,
    /// Errors listed in the run summary before the rest are counted.
    pub error_display_limit: usize,
}

impl Default for BuyerConfig {
    fn default() -> Self {
        Self {
            buffer: dec!(0.01),
            dry_run: false,
            min_reserve_balance: dec!(0.001),
            error_display_limit: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub operation_secs: u64,
    pub confirmation_secs: u64,
    pub balance_secs: u64,
    pub rejection_backoff_secs: u64,
    /// Upper bound on any single wait; unbounded when unset.
    pub max_wait_secs: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            operation_secs: 3,
            confirmation_secs: 5,
            balance_secs: 5,
            rejection_backoff_secs: 5,
            max_wait_secs: None,
        }
    }
}

impl PollingConfig {
    pub fn intervals(&self) -> PollIntervals {
        PollIntervals {
            operation: Duration::from_secs(self.operation_secs),
            confirmation: Duration::from_secs(self.confirmation_secs),
            balance: Duration::from_secs(self.balance_secs),
            rejection_backoff: Duration::from_secs(self.rejection_backoff_secs),
        }
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise the built-in defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `VLOTTO_RPC_URL` over the configured node URL.
    pub fn apply_env(mut self) -> Self {
        if let Some(url) = env_nonempty(RPC_URL_ENV) {
            self.node.rpc_url = url;
        }
        self
    }

    /// Buyer address from the environment, if set.
    pub fn address_override() -> Option<String> {
        env_nonempty(ADDRESS_ENV)
    }
}

/// Read an environment variable, treating empty as unset.
pub fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
