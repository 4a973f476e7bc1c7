//! Payment orchestration core: one payment request in, one normalized
//! result out, across a card-tokenization processor and a redirect/approval
//! wallet processor.

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
