//! Shared types and models for the ASB concessions fund
//!
//! This crate holds the domain types and pure calculations used by the
//! backend: menu items and recipes, lots, orders, sessions, losses and the
//! reimbursement ledger.

pub mod models;
pub mod money;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
