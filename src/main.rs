//! vLotto ticket buyer
//!
//! Entry point. Loads configuration, initialises structured logging,
//! discovers node credentials, then runs the interactive buy flow until the
//! user stops asking for more tickets. Ctrl+C cancels any wait in progress;
//! a second Ctrl+C exits immediately.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use tracing::{info, warn};

use vlotto_buyer::config::{self, AppConfig};
use vlotto_buyer::console::Console;
use vlotto_buyer::credentials;
use vlotto_buyer::draw;
use vlotto_buyer::engine::{
    cancel_pair, CancelHandle, ConfirmationGate, LiquidityGuarantor, OfferPool,
    PurchaseOrchestrator, PurchaseRequest, Waiter,
};
use vlotto_buyer::node::NodeClient;
use vlotto_buyer::rpc::http::HttpLedger;
use vlotto_buyer::wallet::{self, Wallet};

type StdConsole = Console<std::io::StdinLock<'static>, std::io::Stdout>;

/// Everything one buy flow needs.
struct App {
    cfg: AppConfig,
    node: NodeClient,
    wallet: Wallet,
    orchestrator: PurchaseOrchestrator,
    waiter: Waiter,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load_or_default("config.toml")?.apply_env();
    init_logging();

    let mut console = Console::stdio();
    console.banner()?;
    info!(
        rpc_url = %cfg.node.rpc_url,
        asset = %cfg.market.asset,
        dry_run = cfg.buyer.dry_run,
        "vlotto-buyer starting up"
    );

    // -- Connect ---------------------------------------------------------

    let discovered = credentials::discover(&cfg.node);
    let creds = match discovered.complete() {
        Some(c) => c,
        None => {
            console.line("RPC credentials not found in config files.")?;
            console.line("Searched paths:")?;
            for p in &discovered.searched {
                console.line(&format!("  - {}", p.display()))?;
            }
            console.line("")?;
            let user = console.prompt("Enter RPC username", None)?;
            let password = rpassword::prompt_password("Enter RPC password: ")
                .context("Failed to read RPC password")?;
            match discovered.with_login(&user, password) {
                Some(c) => c,
                None => bail!("RPC credentials required"),
            }
        }
    };

    let ledger = HttpLedger::new(&creds.url, &creds.user, creds.password.clone())
        .context("Failed to create RPC client")?
        .with_timeouts(
            Duration::from_secs(cfg.node.timeout_secs),
            Duration::from_secs(cfg.node.batch_timeout_secs),
        );
    let node = NodeClient::new(Arc::new(ledger));

    // -- Cancellation ----------------------------------------------------

    let (handle, signal) = cancel_pair();
    tokio::spawn(watch_interrupts(handle));
    let waiter = Waiter::new(signal).with_limit(cfg.polling.max_wait());

    // -- Components ------------------------------------------------------

    let intervals = cfg.polling.intervals();
    let gate = ConfirmationGate::new(node.clone(), waiter.clone(), intervals.confirmation);
    let liquidity = LiquidityGuarantor::new(
        node.clone(),
        gate.clone(),
        waiter.clone(),
        &cfg.market.reserve_currency,
    )
    .with_buffer(cfg.buyer.buffer)
    .with_intervals(intervals.operation, intervals.balance);
    let orchestrator = PurchaseOrchestrator::new(
        node.clone(),
        cfg.market.ticket_market(),
        liquidity,
        gate,
        waiter.clone(),
        intervals,
    );
    let wallet = Wallet::new(
        node.clone(),
        &cfg.market.reserve_currency,
        &cfg.market.asset,
        &cfg.market.currency_id,
    );

    let app = App {
        cfg,
        node,
        wallet,
        orchestrator,
        waiter,
    };

    // -- Buy loop --------------------------------------------------------

    loop {
        if !buy_flow(&app, &mut console).await? {
            break;
        }
        if app.waiter.is_cancelled() {
            warn!("Interrupted, not starting another run");
            break;
        }
        if !console.confirm("Buy more tickets?", false)? {
            break;
        }
        console.line("\n")?;
    }

    info!("vlotto-buyer finished");
    Ok(())
}

/// One pass through draw info, address selection, order and purchase.
/// Returns `false` when there is nothing to buy or the user declined.
async fn buy_flow(app: &App, console: &mut StdConsole) -> Result<bool> {
    let market = &app.cfg.market;
    let reserve = market.reserve_currency.as_str();
    let asset = market.asset.as_str();

    let node_info = app.node.get_info().await.context("Failed to reach node")?;
    console.line(&format!("\nConnected to node | Current block: {}", node_info.blocks))?;

    // -- Draw information ------------------------------------------------

    let mut pool = OfferPool::new(app.node.clone(), asset);
    pool.refresh().await.context("Failed to fetch offers")?;
    let summary = pool.summarize();
    let ledger_state = draw::fetch_draw_state(&app.node, &market.ledger_identity).await?;

    let Some(draw_info) = draw::assemble(node_info.blocks, &ledger_state, &summary, market.ticket_price) else {
        console.section("DRAW INFORMATION")?;
        console.line("  No offers found in marketplace.")?;
        console.line("No tickets available to purchase.")?;
        return Ok(false);
    };
    let all_tickets = app.wallet.owned_tickets(None).await?;
    let draw_tickets = wallet::tickets_for_draw(&all_tickets, Some(draw_info.draw_block));
    console.show_draw(&draw_info, asset, &draw_tickets)?;

    // -- Address ---------------------------------------------------------

    console.section("SELECT ADDRESS")?;
    let address = match AppConfig::address_override() {
        Some(a) => {
            console.line(&format!("Using {} from {}", a, config::ADDRESS_ENV))?;
            a
        }
        None => {
            let funded = app.wallet.funded_addresses(app.cfg.buyer.min_reserve_balance).await?;
            console.choose_address(&funded, reserve, asset)?
        }
    };
    if address.is_empty() {
        bail!("An address is required");
    }

    let balances = app.wallet.balances(&address).await?;
    console.line(&format!("\nSelected address: {address}"))?;
    console.line(&format!("  {reserve} balance:   {:.8}", balances.reserve))?;
    console.line(&format!("  {asset} balance: {:.8}", balances.asset))?;

    // -- Order -----------------------------------------------------------

    console.section("BUY TICKETS")?;
    let affordable = if market.ticket_price > Decimal::ZERO {
        (balances.asset / market.ticket_price).floor()
    } else {
        Decimal::ZERO
    };
    console.line(&format!("\n  You can afford:    {affordable} tickets (with current {asset})"))?;
    console.line(&format!("  Available offers:  {} tickets", draw_info.available))?;
    console.line(&format!("  (If you need more {asset}, {reserve} is converted automatically)"))?;

    let Some(quantity) = console.ask_quantity()? else {
        bail!("Quantity must be a positive integer");
    };
    let request = PurchaseRequest::new(&address, quantity).dry_run(app.cfg.buyer.dry_run);

    let plan = app
        .orchestrator
        .plan(&request)
        .await
        .context("Failed to plan funding")?;
    console.show_order(quantity, market.ticket_price, &plan, balances.reserve, reserve)?;
    if !console.confirm("Confirm purchase?", true)? {
        console.line("Cancelled by user.")?;
        return Ok(false);
    }

    // -- Purchase --------------------------------------------------------

    console.line(&format!("\nBuying {quantity} tickets from {address}..."))?;
    let report = app.orchestrator.run(&request).await.context("Purchase run failed")?;
    console.show_result(&report, app.cfg.buyer.error_display_limit)?;

    // -- Holdings --------------------------------------------------------

    let balances = app.wallet.balances(&address).await?;
    let tickets = app.wallet.owned_tickets(Some(&address)).await?;
    console.show_holdings(&balances, &tickets, reserve, asset)?;

    Ok(true)
}

/// First Ctrl+C cancels waits; the second exits.
async fn watch_interrupts(handle: CancelHandle) {
    loop {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Ctrl+C handler unavailable");
            return;
        }
        if handle.is_cancelled() {
            std::process::exit(130);
        }
        warn!("Interrupt received, stopping at the next wait (Ctrl+C again to exit)");
        handle.cancel();
    }
}

/// Initialise the `tracing` subscriber. Logs go to stderr so they do not
/// interleave with the console views.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vlotto_buyer=info"));

    let json_logging = std::env::var("VLOTTO_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
