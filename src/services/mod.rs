//! Services module for orchestration logic

pub mod checkout;
pub mod payment_orchestrator;

pub use crate::services::checkout::{Checkout, CheckoutRegistry};
pub use crate::services::payment_orchestrator::PaymentOrchestrator;
