//! Receipted purchases and cost allocation

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{round_money, round_precise};
use super::InventoryLot;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: i64,
    pub vendor: String,
    pub purchase_date: NaiveDate,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub delivery_fee: Decimal,
    pub other_fees: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lots: Vec<InventoryLot>,
}

/// Landed cost of one purchase line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandedLine {
    pub allocated_total: Decimal,
    pub unit_cost: Decimal,
}

/// Spread tax and fees over purchase lines
///
/// Extras are shared in proportion to line totals, or by quantity when every
/// line total is zero. The last line absorbs rounding so the allocated totals
/// add up to subtotal plus extras exactly.
pub fn allocate_landed_cost(lines: &[(Decimal, Decimal)], extras: Decimal) -> Vec<LandedLine> {
    if lines.is_empty() {
        return Vec::new();
    }

    let subtotal: Decimal = lines.iter().map(|(_, total)| *total).sum();
    let total_quantity: Decimal = lines.iter().map(|(qty, _)| *qty).sum();
    let grand_total = round_money(subtotal + extras);

    let mut allocated = Decimal::ZERO;
    let last = lines.len() - 1;

    lines
        .iter()
        .enumerate()
        .map(|(idx, (quantity, line_total))| {
            let share = if idx == last {
                grand_total - allocated
            } else {
                let weight = if subtotal > Decimal::ZERO {
                    line_total / subtotal
                } else if total_quantity > Decimal::ZERO {
                    quantity / total_quantity
                } else {
                    Decimal::ZERO
                };
                round_money(line_total + extras * weight)
            };
            allocated += share;

            let unit_cost = if quantity.is_zero() {
                Decimal::ZERO
            } else {
                round_precise(share / quantity)
            };
            LandedLine {
                allocated_total: share,
                unit_cost,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_no_extras_keeps_line_cost() {
        let landed = allocate_landed_cost(&[(dec("24"), dec("12"))], Decimal::ZERO);
        assert_eq!(landed[0].unit_cost, dec("0.5"));
        assert_eq!(landed[0].allocated_total, dec("12"));
    }

    #[test]
    fn test_extras_split_by_line_total() {
        let landed = allocate_landed_cost(
            &[(dec("10"), dec("30")), (dec("5"), dec("10"))],
            dec("4"),
        );
        assert_eq!(landed[0].allocated_total, dec("33"));
        assert_eq!(landed[1].allocated_total, dec("11"));
        assert_eq!(landed[0].unit_cost, dec("3.3"));
        assert_eq!(landed[1].unit_cost, dec("2.2"));
    }

    #[test]
    fn test_allocation_sums_to_grand_total() {
        let landed = allocate_landed_cost(
            &[(dec("3"), dec("1")), (dec("3"), dec("1")), (dec("3"), dec("1"))],
            dec("1"),
        );
        let total: Decimal = landed.iter().map(|l| l.allocated_total).sum();
        assert_eq!(total, dec("4"));
    }

    #[test]
    fn test_free_lines_split_by_quantity() {
        let landed = allocate_landed_cost(
            &[(dec("1"), dec("0")), (dec("3"), dec("0"))],
            dec("8"),
        );
        assert_eq!(landed[0].allocated_total, dec("2"));
        assert_eq!(landed[1].allocated_total, dec("6"));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn lines_strategy() -> impl Strategy<Value = Vec<(Decimal, Decimal)>> {
            // (quantity, line total in cents)
            prop::collection::vec((1u32..500, 0u32..100_000), 1..6).prop_map(|raw| {
                raw.into_iter()
                    .map(|(qty, cents)| (Decimal::from(qty), Decimal::new(i64::from(cents), 2)))
                    .collect()
            })
        }

        proptest! {
            /// Property: lines always add up to the receipt total
            #[test]
            fn prop_allocation_matches_receipt(
                lines in lines_strategy(),
                extras_cents in 0u32..5_000,
            ) {
                let extras = Decimal::new(i64::from(extras_cents), 2);
                let landed = allocate_landed_cost(&lines, extras);
                let subtotal: Decimal = lines.iter().map(|(_, total)| *total).sum();

                prop_assert_eq!(landed.len(), lines.len());
                let allocated: Decimal = landed.iter().map(|l| l.allocated_total).sum();
                prop_assert_eq!(allocated, subtotal + extras);
            }
        }
    }
}
