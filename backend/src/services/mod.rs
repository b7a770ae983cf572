//! Business logic services for the concessions fund
//!
//! Functions taking a `&mut SqliteConnection` run inside the caller's
//! transaction. Service methods own their transactions and take the write
//! locks they need.

pub mod cash_accounts;
pub mod fifo;
pub mod inventory;
pub mod loss;
pub mod menu;
pub mod order;
pub mod program;
pub mod purchase;
pub mod reimbursement;
pub mod session;

pub use cash_accounts::CashAccounts;
pub use inventory::InventoryService;
pub use loss::LossService;
pub use menu::MenuService;
pub use order::OrderService;
pub use program::ProgramService;
pub use purchase::PurchaseService;
pub use reimbursement::ReimbursementService;
pub use session::SessionService;
