//! Payment provider layer: request model, error taxonomy, the two provider
//! adapters and their external collaborators.

pub mod error;
pub mod factory;
pub mod normalizer;
pub mod provider;
pub mod providers;
pub mod sdk;
pub mod settlement;
pub mod tokenizer;
pub mod types;
pub mod utils;
pub mod validation;
