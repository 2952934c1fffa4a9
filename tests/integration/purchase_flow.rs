//! Purchase run integration tests.
//!
//! Drive the full orchestrator (funding, offer selection, acquisition,
//! confirmation) against the in-memory node and check outcomes and the
//! order of node calls.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use vlotto_buyer::engine::{
    cancel_pair, CancelSignal, ConfirmationGate, LiquidityGuarantor, PollIntervals,
    PurchaseOrchestrator, PurchaseRequest, TicketMarket, Waiter,
};
use vlotto_buyer::node::NodeClient;
use vlotto_buyer::types::RunOutcome;

use crate::fake_ledger::{FakeLedger, TakeFailure, ADDRESS, ASSET, RESERVE};

fn orchestrator(ledger: &FakeLedger, signal: CancelSignal) -> PurchaseOrchestrator {
    let node = NodeClient::new(Arc::new(ledger.clone()));
    let waiter = Waiter::new(signal).with_limit(Some(Duration::from_secs(10)));
    let intervals = PollIntervals::uniform(Duration::from_millis(1));
    let gate = ConfirmationGate::new(node.clone(), waiter.clone(), intervals.confirmation);
    let liquidity = LiquidityGuarantor::new(node.clone(), gate.clone(), waiter.clone(), RESERVE)
        .with_buffer(dec!(0.01))
        .with_intervals(intervals.operation, intervals.balance);
    let market = TicketMarket {
        asset: ASSET.into(),
        currency_id: "iMLmoaN3SS8KdJwb7fG4WZxJMFrjJxHBfj".into(),
        parent: ASSET.into(),
        ticket_price: dec!(1),
    };
    PurchaseOrchestrator::new(node, market, liquidity, gate, waiter, intervals)
}

/// Offer txids passed to `takeoffer`, in call order.
fn take_order(ledger: &FakeLedger) -> Vec<String> {
    ledger
        .calls()
        .iter()
        .filter(|(m, _)| m == "takeoffer")
        .map(|(_, p)| p[1]["txid"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn confirmed_polls(calls: &[(String, Vec<Value>)], txid: &str) -> Vec<usize> {
    calls
        .iter()
        .enumerate()
        .filter(|(_, (m, p))| m == "gettransaction" && p[0] == txid)
        .map(|(i, _)| i)
        .collect()
}

#[tokio::test]
async fn test_buys_requested_quantity_in_name_order() {
    let ledger = FakeLedger::new()
        .with_offers(3906000, 5)
        .with_balance(ASSET, dec!(5));
    let orch = orchestrator(&ledger, CancelSignal::never());

    let report = orch.run(&PurchaseRequest::new(ADDRESS, 3)).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.bought, 3);
    let tickets: Vec<&str> = report.purchased.iter().map(|p| p.ticket.as_str()).collect();
    assert_eq!(tickets, vec!["3906000_1of5", "3906000_2of5", "3906000_3of5"]);
    assert!(report.errors.is_empty());
    assert!(report.aborted.is_none());
    assert_eq!(ledger.listed(), 2);
}

#[tokio::test]
async fn test_funded_wallet_makes_no_conversion_calls() {
    let ledger = FakeLedger::new()
        .with_offers(100, 3)
        .with_balance(ASSET, dec!(3));
    let report = orchestrator(&ledger, CancelSignal::never())
        .run(&PurchaseRequest::new(ADDRESS, 2))
        .await
        .unwrap();

    assert!(report.conversion.is_none());
    assert_eq!(ledger.count("getcurrencyconverters"), 0);
    assert_eq!(ledger.count("sendcurrency"), 0);
    assert_eq!(ledger.count("z_getoperationstatus"), 0);
}

#[tokio::test]
async fn test_each_purchase_waits_for_previous_confirmation() {
    let ledger = FakeLedger::new()
        .with_offers(100, 4)
        .with_balance(ASSET, dec!(4));
    let report = orchestrator(&ledger, CancelSignal::never())
        .run(&PurchaseRequest::new(ADDRESS, 4))
        .await
        .unwrap();
    assert_eq!(report.bought, 4);

    // The fake rejects any spend before the previous purchase confirms, so
    // four clean takes mean the gate held every time.
    assert_eq!(ledger.count("takeoffer"), 4);

    let calls = ledger.calls();
    let takes: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, (m, _))| m == "takeoffer")
        .map(|(i, _)| i)
        .collect();
    for k in 1..takes.len() {
        let prev_tx = format!("purchase{k}");
        let polls = confirmed_polls(&calls, &prev_tx);
        assert!(
            polls.iter().any(|&i| i > takes[k - 1] && i < takes[k]),
            "purchase {} was submitted before {prev_tx} was polled",
            k + 1
        );
    }

    // The last purchase is awaited before the run returns.
    let last = confirmed_polls(&calls, "purchase4");
    assert!(last.iter().any(|&i| i > takes[3]));
}

#[tokio::test]
async fn test_converts_buffered_deficit_before_buying() {
    let ledger = FakeLedger::new()
        .with_offers(200, 3)
        .with_balance(RESERVE, dec!(100));
    let report = orchestrator(&ledger, CancelSignal::never())
        .run(&PurchaseRequest::new(ADDRESS, 2))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    let conversion = report.conversion.as_ref().unwrap();
    assert_eq!(conversion.route.destination_amount, dec!(2.02));
    assert_eq!(conversion.route.via, ASSET);
    assert_eq!(conversion.route.source_amount, dec!(4.04));
    assert_eq!(conversion.txid.as_deref(), Some("swaptx"));

    // 2.02 credited, two tickets spent.
    assert_eq!(ledger.balance(ASSET), dec!(0.02));
    assert_eq!(ledger.balance(RESERVE), dec!(95.96));

    // Funding completes before the first purchase.
    let methods = ledger.methods();
    let swap = methods.iter().position(|m| m == "sendcurrency").unwrap();
    let first_take = methods.iter().position(|m| m == "takeoffer").unwrap();
    assert!(swap < first_take);
    assert_eq!(ledger.count("sendcurrency"), 1);
}

#[tokio::test]
async fn test_rejection_waits_then_retries_same_offer() {
    let ledger = FakeLedger::new()
        .with_offers(300, 3)
        .with_balance(ASSET, dec!(3))
        .fail_take("offer2", &[TakeFailure::Rejected]);
    let report = orchestrator(&ledger, CancelSignal::never())
        .run(&PurchaseRequest::new(ADDRESS, 2))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert!(report.errors.is_empty());
    assert_eq!(take_order(&ledger), vec!["offer1", "offer2", "offer2"]);
    assert_eq!(report.attempts, 3);

    // The prior purchase is checked between the rejection and the retry.
    let calls = ledger.calls();
    let takes: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, (m, _))| m == "takeoffer")
        .map(|(i, _)| i)
        .collect();
    let polls = confirmed_polls(&calls, "purchase1");
    assert!(polls.iter().any(|&i| i > takes[1] && i < takes[2]));
}

#[tokio::test]
async fn test_first_rejection_backs_off_then_retries() {
    let ledger = FakeLedger::new()
        .with_offers(350, 2)
        .with_balance(ASSET, dec!(2))
        .fail_take("offer1", &[TakeFailure::Rejected]);
    let report = orchestrator(&ledger, CancelSignal::never())
        .run(&PurchaseRequest::new(ADDRESS, 1))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert!(report.errors.is_empty());
    assert_eq!(report.purchased[0].offer_txid, "offer1");
    assert_eq!(take_order(&ledger), vec!["offer1", "offer1"]);

    // Nothing to wait on yet, so the retry follows a plain backoff.
    let methods = ledger.methods();
    let takes: Vec<usize> = methods
        .iter()
        .enumerate()
        .filter(|(_, m)| *m == "takeoffer")
        .map(|(i, _)| i)
        .collect();
    assert!(!methods[takes[0]..takes[1]].iter().any(|m| m == "gettransaction"));
}

#[tokio::test]
async fn test_purchase_without_txid_stops_the_run() {
    let ledger = FakeLedger::new()
        .with_offers(360, 3)
        .with_balance(ASSET, dec!(3))
        .fail_take("offer1", &[TakeFailure::Untracked]);
    let report = orchestrator(&ledger, CancelSignal::never())
        .run(&PurchaseRequest::new(ADDRESS, 3))
        .await
        .unwrap();

    // The ticket was bought, but nothing else may be submitted unconfirmed.
    assert_eq!(report.bought, 1);
    assert_eq!(report.outcome, RunOutcome::Partial);
    assert!(report.aborted.as_deref().unwrap_or_default().contains("no txid"));
    assert_eq!(ledger.count("takeoffer"), 1);
}

#[tokio::test]
async fn test_failed_offer_is_recorded_and_not_retried() {
    let ledger = FakeLedger::new()
        .with_offers(400, 3)
        .with_balance(ASSET, dec!(3))
        .fail_take("offer1", &[TakeFailure::Taken]);
    let report = orchestrator(&ledger, CancelSignal::never())
        .run(&PurchaseRequest::new(ADDRESS, 2))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].offer_txid, "offer1");
    assert_eq!(take_order(&ledger), vec!["offer1", "offer2", "offer3"]);
}

#[tokio::test]
async fn test_no_offer_is_bought_twice() {
    let ledger = FakeLedger::new()
        .with_offers(500, 6)
        .with_balance(ASSET, dec!(6))
        .fail_take("offer3", &[TakeFailure::Rejected, TakeFailure::Rejected]);
    let report = orchestrator(&ledger, CancelSignal::never())
        .run(&PurchaseRequest::new(ADDRESS, 6))
        .await
        .unwrap();

    let unique: HashSet<&str> = report.purchased.iter().map(|p| p.offer_txid.as_str()).collect();
    assert_eq!(unique.len(), report.purchased.len());
    assert_eq!(report.bought, 6);
}

#[tokio::test]
async fn test_pool_exhaustion_is_partial() {
    let ledger = FakeLedger::new()
        .with_offers(600, 2)
        .with_balance(ASSET, dec!(5));
    let report = orchestrator(&ledger, CancelSignal::never())
        .run(&PurchaseRequest::new(ADDRESS, 5))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Partial);
    assert_eq!(report.bought, 2);
    assert!(report.aborted.is_none());
}

#[tokio::test]
async fn test_empty_pool_is_failed_without_error() {
    let ledger = FakeLedger::new().with_balance(ASSET, dec!(1));
    let report = orchestrator(&ledger, CancelSignal::never())
        .run(&PurchaseRequest::new(ADDRESS, 1))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.bought, 0);
    assert!(report.aborted.is_none());
    assert_eq!(ledger.count("takeoffer"), 0);
}

#[tokio::test]
async fn test_unusable_offer_is_skipped_without_node_call() {
    let ledger = FakeLedger::new()
        .with_offers(700, 2)
        .with_offer("broken", Some("700_0of2"), None)
        .with_balance(ASSET, dec!(2));
    let report = orchestrator(&ledger, CancelSignal::never())
        .run(&PurchaseRequest::new(ADDRESS, 2))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].offer_txid, "broken");
    assert!(!take_order(&ledger).contains(&"broken".to_string()));
}

#[tokio::test]
async fn test_dry_run_signs_without_broadcast() {
    let ledger = FakeLedger::new()
        .with_offers(800, 3)
        .with_balance(ASSET, dec!(3));
    let report = orchestrator(&ledger, CancelSignal::never())
        .run(&PurchaseRequest::new(ADDRESS, 2).dry_run(true))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert!(report.dry_run);
    assert_eq!(ledger.count("gettransaction"), 0);
    assert_eq!(ledger.listed(), 3);
    assert_eq!(ledger.balance(ASSET), dec!(3));
    let txid = report.purchased[0].txid.clone().unwrap();
    assert_eq!(txid.len(), 64);
    assert!(txid.starts_with("purchase1"));
}

#[tokio::test]
async fn test_cancelled_run_stops_before_buying() {
    let ledger = FakeLedger::new()
        .with_offers(900, 2)
        .with_balance(ASSET, dec!(2));
    let (handle, signal) = cancel_pair();
    handle.cancel();

    let report = orchestrator(&ledger, signal)
        .run(&PurchaseRequest::new(ADDRESS, 2))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.aborted.as_deref(), Some("Cancelled"));
    assert_eq!(ledger.count("takeoffer"), 0);
}

#[tokio::test]
async fn test_plan_reports_without_moving_funds() {
    let ledger = FakeLedger::new()
        .with_offers(1000, 2)
        .with_balance(ASSET, dec!(0.5))
        .with_balance(RESERVE, dec!(10));
    let orch = orchestrator(&ledger, CancelSignal::never());

    let plan = orch.plan(&PurchaseRequest::new(ADDRESS, 2)).await.unwrap();
    assert_eq!(plan.deficit, dec!(1.5));
    assert_eq!(plan.buffered, dec!(1.515));
    assert!(plan.needs_conversion());
    assert_eq!(ledger.count("sendcurrency"), 0);
    assert_eq!(ledger.balance(RESERVE), dec!(10));
    assert_eq!(orch.required_funds(2), Decimal::from(2));
}
