//! Point-of-sale order models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::money::round_money;
use crate::types::UnknownVariant;

/// How an order was paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Cashapp,
    Zelle,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Cashapp => "cashapp",
            PaymentMethod::Zelle => "zelle",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "cashapp" => Ok(PaymentMethod::Cashapp),
            "zelle" => Ok(PaymentMethod::Zelle),
            other => Err(UnknownVariant::new("payment method", other)),
        }
    }
}

/// A completed sale
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub session_id: i64,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
    pub amount_tendered: Option<Decimal>,
    pub change_given: Decimal,
    pub payment_method: PaymentMethod,
    pub is_comp: bool,
    pub cogs_total: Decimal,
    pub cogs_reimbursable: Decimal,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<OrderItem>,
}

/// One line of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub menu_item_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    /// Lot cost of this line including expanded recipe components
    pub cogs: Decimal,
    pub cogs_reimbursable: Decimal,
}

/// Response returned to the register after a sale
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_id: i64,
    pub subtotal: Decimal,
    pub final_total: Decimal,
    pub cogs: Decimal,
    pub cogs_reimbursable: Decimal,
    pub change_given: Decimal,
    /// Items whose lots could not cover the sale
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stock_warnings: Vec<i64>,
}

/// Money side of an order before any stock moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
}

/// Price an order from `(quantity, unit_price)` lines
///
/// Comps collect nothing. Otherwise the discount is capped at the subtotal.
pub fn price_order(
    lines: &[(Decimal, Decimal)],
    discount_amount: Decimal,
    is_comp: bool,
) -> OrderTotals {
    let subtotal = round_money(lines.iter().map(|(qty, price)| qty * price).sum());
    let discount_amount = round_money(discount_amount.max(Decimal::ZERO).min(subtotal));
    let final_total = if is_comp {
        Decimal::ZERO
    } else {
        subtotal - discount_amount
    };

    OrderTotals {
        subtotal,
        discount_amount,
        final_total,
    }
}

/// Change owed for a cash order; `None` when the tender is short
pub fn change_due(final_total: Decimal, amount_tendered: Decimal) -> Option<Decimal> {
    let change = round_money(amount_tendered - final_total);
    if change < Decimal::ZERO {
        None
    } else {
        Some(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_price_order_with_discount() {
        let totals = price_order(&[(dec("2"), dec("3.50")), (dec("1"), dec("2"))], dec("1"), false);
        assert_eq!(totals.subtotal, dec("9"));
        assert_eq!(totals.discount_amount, dec("1"));
        assert_eq!(totals.final_total, dec("8"));
    }

    #[test]
    fn test_discount_capped_at_subtotal() {
        let totals = price_order(&[(dec("1"), dec("2"))], dec("5"), false);
        assert_eq!(totals.final_total, Decimal::ZERO);
    }

    #[test]
    fn test_comp_order_is_free() {
        let totals = price_order(&[(dec("3"), dec("1.25"))], Decimal::ZERO, true);
        assert_eq!(totals.subtotal, dec("3.75"));
        assert_eq!(totals.final_total, Decimal::ZERO);
    }

    #[test]
    fn test_change_due() {
        assert_eq!(change_due(dec("12"), dec("20")), Some(dec("8")));
        assert_eq!(change_due(dec("12"), dec("12")), Some(Decimal::ZERO));
        assert_eq!(change_due(dec("12"), dec("10")), None);
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(PaymentMethod::from_str("cashapp").unwrap(), PaymentMethod::Cashapp);
        assert!(PaymentMethod::from_str("venmo").is_err());
    }
}
