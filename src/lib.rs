//! vLotto ticket buyer
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod console;
pub mod credentials;
pub mod draw;
pub mod engine;
pub mod node;
pub mod rpc;
pub mod types;
pub mod wallet;
