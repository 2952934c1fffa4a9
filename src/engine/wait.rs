//! Fixed-interval polling with cancellation.
//!
//! Every blocking wait in the engine (operation completion, confirmations,
//! balances, rejection backoff) sleeps through a `Wait`. A wait is
//! unbounded by default; it ends early when the shared `CancelSignal`
//! fires, or with `TimedOut` once an opt-in deadline has passed.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::types::{BuyerError, Result};

// ---------------------------------------------------------------------------
// Intervals
// ---------------------------------------------------------------------------

/// Poll intervals for the different things the engine waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub operation: Duration,
    pub confirmation: Duration,
    pub balance: Duration,
    pub rejection_backoff: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            operation: Duration::from_secs(3),
            confirmation: Duration::from_secs(5),
            balance: Duration::from_secs(5),
            rejection_backoff: Duration::from_secs(5),
        }
    }
}

impl PollIntervals {
    /// Same interval everywhere (handy for tests).
    pub fn uniform(interval: Duration) -> Self {
        Self {
            operation: interval,
            confirmation: interval,
            balance: interval,
            rejection_backoff: interval,
        }
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Sending half: flips every `CancelSignal` cloned from the same pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiving half, cloned into every component that waits.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Pends forever if the handle was dropped
    /// without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Waiter
// ---------------------------------------------------------------------------

/// Factory for individual waits; carries the cancel signal and the optional
/// upper bound applied to each wait.
#[derive(Debug, Clone)]
pub struct Waiter {
    cancel: CancelSignal,
    limit: Option<Duration>,
}

impl Waiter {
    pub fn new(cancel: CancelSignal) -> Self {
        Self { cancel, limit: None }
    }

    /// Bound every wait started from this waiter.
    pub fn with_limit(mut self, limit: Option<Duration>) -> Self {
        self.limit = limit;
        self
    }

    pub fn begin(&self, what: impl Into<String>, interval: Duration) -> Wait {
        Wait {
            what: what.into(),
            interval,
            started: Instant::now(),
            limit: self.limit,
            cancel: self.cancel.clone(),
        }
    }

    /// One-off sleep, e.g. a backoff.
    pub async fn sleep(&self, what: &str, interval: Duration) -> Result<()> {
        self.begin(what, interval).tick().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A single polling wait in progress.
#[derive(Debug)]
pub struct Wait {
    what: String,
    interval: Duration,
    started: Instant,
    limit: Option<Duration>,
    cancel: CancelSignal,
}

impl Wait {
    /// Sleep one interval.
    pub async fn tick(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BuyerError::Cancelled);
        }

        tokio::select! {
            _ = tokio::time::sleep(self.interval) => {}
            _ = self.cancel.cancelled() => return Err(BuyerError::Cancelled),
        }

        match self.limit {
            Some(limit) if self.started.elapsed() >= limit => {
                Err(BuyerError::TimedOut(self.what.clone()))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
