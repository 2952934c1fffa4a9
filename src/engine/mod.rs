//! Core engine: fund, then acquire tickets one confirmation at a time.

pub mod confirmation;
pub mod liquidity;
pub mod offers;
pub mod orchestrator;
pub mod report;
pub mod router;
pub mod wait;

pub use confirmation::ConfirmationGate;
pub use liquidity::{ConversionReceipt, Funding, LiquidityGuarantor, LiquidityPlan};
pub use offers::{OfferPool, OfferSummary};
pub use orchestrator::{PurchaseOrchestrator, PurchaseRequest, TicketMarket};
pub use report::RunReport;
pub use router::ConverterRouter;
pub use wait::{cancel_pair, CancelHandle, CancelSignal, PollIntervals, Waiter};
