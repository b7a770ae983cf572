//! Domain models for the ASB concessions fund

mod account;
mod inventory;
mod loss;
mod menu_item;
mod order;
mod program;
mod purchase;
mod reimbursement;
mod session;

pub use account::*;
pub use inventory::*;
pub use loss::*;
pub use menu_item::*;
pub use order::*;
pub use program::*;
pub use purchase::*;
pub use reimbursement::*;
pub use session::*;
