//! Recorded shortfalls and their settlement

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    CashDiscrepancy,
    InventoryDiscrepancy,
    Spoilage,
    Theft,
    Other,
}

impl LossType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LossType::CashDiscrepancy => "cash_discrepancy",
            LossType::InventoryDiscrepancy => "inventory_discrepancy",
            LossType::Spoilage => "spoilage",
            LossType::Theft => "theft",
            LossType::Other => "other",
        }
    }
}

impl FromStr for LossType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash_discrepancy" => Ok(LossType::CashDiscrepancy),
            "inventory_discrepancy" => Ok(LossType::InventoryDiscrepancy),
            "spoilage" => Ok(LossType::Spoilage),
            "theft" => Ok(LossType::Theft),
            "other" => Ok(LossType::Other),
            other => Err(UnknownVariant::new("loss type", other)),
        }
    }
}

/// Who absorbs a settled loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementTarget {
    /// The activities fund writes it off
    Asb,
    /// Debited from the program balance
    Program,
    /// Deducted from what the fund owes in reimbursements
    Reimbursement,
}

impl SettlementTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementTarget::Asb => "asb",
            SettlementTarget::Program => "program",
            SettlementTarget::Reimbursement => "reimbursement",
        }
    }
}

impl FromStr for SettlementTarget {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asb" => Ok(SettlementTarget::Asb),
            "program" => Ok(SettlementTarget::Program),
            "reimbursement" => Ok(SettlementTarget::Reimbursement),
            other => Err(UnknownVariant::new("settlement target", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loss {
    pub id: i64,
    pub loss_type: LossType,
    pub amount: Decimal,
    pub description: Option<String>,
    pub session_id: Option<i64>,
    pub program_id: Option<i64>,
    pub menu_item_id: Option<i64>,
    pub settled_against: Option<SettlementTarget>,
    pub settled_at: Option<DateTime<Utc>>,
    pub settled_by: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Loss {
    pub fn is_settled(&self) -> bool {
        self.settled_against.is_some()
    }
}
