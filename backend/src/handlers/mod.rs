//! HTTP handlers
//!
//! Each handler checks the caller's permission, then hands off to a service.

pub mod account;
pub mod health;
pub mod inventory;
pub mod loss;
pub mod menu;
pub mod order;
pub mod program;
pub mod purchase;
pub mod reimbursement;
pub mod session;

pub use account::*;
pub use health::*;
pub use inventory::*;
pub use loss::*;
pub use menu::*;
pub use order::*;
pub use program::*;
pub use purchase::*;
pub use reimbursement::*;
pub use session::*;
