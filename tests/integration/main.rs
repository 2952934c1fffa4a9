//! Integration tests against an in-memory node.

mod fake_ledger;
mod purchase_flow;
