//! Inventory lots, audit transactions and counts

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::money::round_precise;
use crate::types::UnknownVariant;

/// Kind of quantity change recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Sale,
    Purchase,
    StockUpdate,
    Lost,
    Wasted,
    Donated,
    CountAdjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Sale => "sale",
            TransactionType::Purchase => "purchase",
            TransactionType::StockUpdate => "stock_update",
            TransactionType::Lost => "lost",
            TransactionType::Wasted => "wasted",
            TransactionType::Donated => "donated",
            TransactionType::CountAdjustment => "count_adjustment",
        }
    }
}

impl FromStr for TransactionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sale" => Ok(TransactionType::Sale),
            "purchase" => Ok(TransactionType::Purchase),
            "stock_update" => Ok(TransactionType::StockUpdate),
            "lost" => Ok(TransactionType::Lost),
            "wasted" => Ok(TransactionType::Wasted),
            "donated" => Ok(TransactionType::Donated),
            "count_adjustment" => Ok(TransactionType::CountAdjustment),
            other => Err(UnknownVariant::new("transaction type", other)),
        }
    }
}

/// Manual adjustment reasons accepted by the adjust endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    Lost,
    Wasted,
    Donated,
    CountAdjustment,
}

impl AdjustmentType {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            AdjustmentType::Lost => TransactionType::Lost,
            AdjustmentType::Wasted => TransactionType::Wasted,
            AdjustmentType::Donated => TransactionType::Donated,
            AdjustmentType::CountAdjustment => TransactionType::CountAdjustment,
        }
    }
}

/// A batch of stock received at one cost on one date
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryLot {
    pub id: i64,
    pub menu_item_id: i64,
    pub purchase_id: Option<i64>,
    pub quantity_original: Decimal,
    pub quantity_remaining: Decimal,
    pub unit_cost: Decimal,
    /// False for unreceipted stock that cannot be charged back
    pub is_reimbursable: bool,
    pub purchase_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl InventoryLot {
    pub fn is_open(&self) -> bool {
        self.quantity_remaining > Decimal::ZERO
    }

    pub fn quantity_consumed(&self) -> Decimal {
        self.quantity_original - self.quantity_remaining
    }
}

/// Immutable audit row for one change to an item's on-hand quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryTransaction {
    pub id: i64,
    pub menu_item_id: i64,
    pub transaction_type: TransactionType,
    /// Signed; equals the on-hand delta it records
    pub quantity_change: Decimal,
    pub unit_cost_at_time: Decimal,
    pub is_reimbursable: bool,
    pub reference_type: Option<String>,
    pub reference_id: Option<i64>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cost of stock taken from lots, oldest first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotDeduction {
    /// Always `reimbursable_cost + non_reimbursable_cost`
    pub total_cost: Decimal,
    pub reimbursable_cost: Decimal,
    pub non_reimbursable_cost: Decimal,
    pub quantity_deducted: Decimal,
    /// Requested quantity that no open lot could cover
    pub shortfall: Decimal,
}

impl LotDeduction {
    /// Average cost per deducted unit, if anything was deducted
    pub fn blended_unit_cost(&self) -> Option<Decimal> {
        if self.quantity_deducted.is_zero() {
            None
        } else {
            Some(round_precise(self.total_cost / self.quantity_deducted))
        }
    }

    pub fn has_shortfall(&self) -> bool {
        self.shortfall > Decimal::ZERO
    }

    /// Combine the deductions of several items (e.g. recipe components)
    pub fn combine(self, other: LotDeduction) -> LotDeduction {
        LotDeduction {
            total_cost: self.total_cost + other.total_cost,
            reimbursable_cost: self.reimbursable_cost + other.reimbursable_cost,
            non_reimbursable_cost: self.non_reimbursable_cost + other.non_reimbursable_cost,
            quantity_deducted: self.quantity_deducted + other.quantity_deducted,
            shortfall: self.shortfall + other.shortfall,
        }
    }
}

/// Audit row for one counted item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryCount {
    pub id: i64,
    pub menu_item_id: i64,
    pub expected_quantity: Decimal,
    pub actual_quantity: Decimal,
    /// actual - expected
    pub discrepancy: Decimal,
    pub counted_by: Option<String>,
    pub counted_at: DateTime<Utc>,
}

/// Item whose open lots no longer add up to its on-hand quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotDrift {
    pub menu_item_id: i64,
    pub name: String,
    pub quantity_on_hand: Decimal,
    pub lot_quantity: Decimal,
    /// on-hand minus lot quantity; positive means lots under-track stock
    pub drift: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_transaction_type_tags() {
        assert_eq!(TransactionType::StockUpdate.as_str(), "stock_update");
        assert_eq!(
            TransactionType::from_str("count_adjustment").unwrap(),
            TransactionType::CountAdjustment
        );
        assert!(TransactionType::from_str("transfer").is_err());
    }

    #[test]
    fn test_adjustment_maps_to_transaction_type() {
        assert_eq!(AdjustmentType::Wasted.transaction_type(), TransactionType::Wasted);
        assert_eq!(AdjustmentType::Donated.transaction_type(), TransactionType::Donated);
    }

    #[test]
    fn test_blended_unit_cost() {
        let deduction = LotDeduction {
            total_cost: dec("3.50"),
            reimbursable_cost: dec("2.00"),
            non_reimbursable_cost: dec("1.50"),
            quantity_deducted: dec("3"),
            shortfall: Decimal::ZERO,
        };
        assert_eq!(deduction.blended_unit_cost(), Some(dec("1.1667")));
        assert_eq!(LotDeduction::default().blended_unit_cost(), None);
    }

    #[test]
    fn test_combine_sums_every_field() {
        let a = LotDeduction {
            total_cost: dec("1"),
            reimbursable_cost: dec("1"),
            non_reimbursable_cost: dec("0"),
            quantity_deducted: dec("2"),
            shortfall: dec("0"),
        };
        let b = LotDeduction {
            total_cost: dec("2"),
            reimbursable_cost: dec("0"),
            non_reimbursable_cost: dec("2"),
            quantity_deducted: dec("1"),
            shortfall: dec("1"),
        };
        let c = a.combine(b);
        assert_eq!(c.total_cost, dec("3"));
        assert_eq!(c.reimbursable_cost + c.non_reimbursable_cost, c.total_cost);
        assert_eq!(c.quantity_deducted, dec("3"));
        assert!(c.has_shortfall());
    }
}
