//! Personal Finance Assistant
//!
//! Retrieval-augmented retirement and benefits plans, plus:
//! - an investment coach (deterministic allocation, model commentary)
//! - a market insights feed over static market data
//! - an audit trail of every generation request
//!
//! PIPELINE:
//! PROFILE → RETRIEVE → PROMPT → GENERATE → RECONCILE

pub mod allocation;
pub mod api;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod error;
pub mod inference;
pub mod insights;
pub mod investment;
pub mod market;
pub mod models;
pub mod plan;
pub mod prompt;
pub mod reconcile;
pub mod retrieval;

pub use error::{AdvisorError, Result};

// Re-export common types
pub use config::AppConfig;
pub use models::*;
pub use plan::{PlanGenerator, PlanOutcome};
