//! Reimbursement ledger models
//!
//! The ledger is append-only. What is still owed is always derived from
//! the entries, never stored.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    /// Cost of goods sold in a closed session
    CogsOwed,
    /// Loss charged against what is owed
    AsbLoss,
    ZelleReceived,
    CashappWithdrawal,
    CashboxReimbursement,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::CogsOwed => "cogs_owed",
            LedgerEntryType::AsbLoss => "asb_loss",
            LedgerEntryType::ZelleReceived => "zelle_received",
            LedgerEntryType::CashappWithdrawal => "cashapp_withdrawal",
            LedgerEntryType::CashboxReimbursement => "cashbox_reimbursement",
        }
    }

    /// Entries that pay down the amount owed
    pub fn is_payment(&self) -> bool {
        matches!(
            self,
            LedgerEntryType::ZelleReceived
                | LedgerEntryType::CashappWithdrawal
                | LedgerEntryType::CashboxReimbursement
        )
    }
}

impl FromStr for LedgerEntryType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cogs_owed" => Ok(LedgerEntryType::CogsOwed),
            "asb_loss" => Ok(LedgerEntryType::AsbLoss),
            "zelle_received" => Ok(LedgerEntryType::ZelleReceived),
            "cashapp_withdrawal" => Ok(LedgerEntryType::CashappWithdrawal),
            "cashbox_reimbursement" => Ok(LedgerEntryType::CashboxReimbursement),
            other => Err(UnknownVariant::new("ledger entry type", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReimbursementEntry {
    pub id: i64,
    pub entry_type: LedgerEntryType,
    pub amount: Decimal,
    pub session_id: Option<i64>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Derived position of the reimbursement ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReimbursementSummary {
    pub total_cogs_owed: Decimal,
    pub total_asb_losses: Decimal,
    pub gross_owed: Decimal,
    pub zelle_received: Decimal,
    pub cashapp_withdrawals: Decimal,
    pub cashbox_reimbursements: Decimal,
    pub received: Decimal,
    /// Not clamped; negative means more was received than owed
    pub remaining: Decimal,
    pub fully_reimbursed: bool,
}

impl ReimbursementSummary {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (LedgerEntryType, Decimal)>,
    {
        let mut summary = ReimbursementSummary::default();
        for (entry_type, amount) in entries {
            match entry_type {
                LedgerEntryType::CogsOwed => summary.total_cogs_owed += amount,
                LedgerEntryType::AsbLoss => summary.total_asb_losses += amount,
                LedgerEntryType::ZelleReceived => summary.zelle_received += amount,
                LedgerEntryType::CashappWithdrawal => summary.cashapp_withdrawals += amount,
                LedgerEntryType::CashboxReimbursement => summary.cashbox_reimbursements += amount,
            }
        }

        summary.gross_owed = summary.total_cogs_owed - summary.total_asb_losses;
        summary.received =
            summary.zelle_received + summary.cashapp_withdrawals + summary.cashbox_reimbursements;
        summary.remaining = summary.gross_owed - summary.received;
        summary.fully_reimbursed = summary.remaining <= Decimal::ZERO;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_arithmetic() {
        let summary = ReimbursementSummary::from_entries([
            (LedgerEntryType::CogsOwed, Decimal::from(60)),
            (LedgerEntryType::CogsOwed, Decimal::from(40)),
            (LedgerEntryType::AsbLoss, Decimal::from(10)),
            (LedgerEntryType::ZelleReceived, Decimal::from(30)),
            (LedgerEntryType::CashappWithdrawal, Decimal::from(20)),
        ]);

        assert_eq!(summary.gross_owed, Decimal::from(90));
        assert_eq!(summary.received, Decimal::from(50));
        assert_eq!(summary.remaining, Decimal::from(40));
        assert!(!summary.fully_reimbursed);
    }

    #[test]
    fn test_overpaid_ledger_is_not_clamped() {
        let summary = ReimbursementSummary::from_entries([
            (LedgerEntryType::CogsOwed, Decimal::from(10)),
            (LedgerEntryType::CashboxReimbursement, Decimal::from(15)),
        ]);
        assert_eq!(summary.remaining, Decimal::from(-5));
        assert!(summary.fully_reimbursed);
    }

    #[test]
    fn test_empty_ledger() {
        let summary = ReimbursementSummary::from_entries(std::iter::empty());
        assert_eq!(summary.remaining, Decimal::ZERO);
        assert!(summary.fully_reimbursed);
    }

    #[test]
    fn test_payment_entries() {
        assert!(LedgerEntryType::ZelleReceived.is_payment());
        assert!(!LedgerEntryType::CogsOwed.is_payment());
        assert!(!LedgerEntryType::AsbLoss.is_payment());
    }
}
