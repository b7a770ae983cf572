//! Concession session models and close-out arithmetic

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::PaymentMethod;
use crate::money::round_money;
use crate::types::UnknownVariant;

/// Lifecycle state of a concession session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Active,
    Closed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Active => "active",
            SessionStatus::Closed => "closed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Closed | SessionStatus::Cancelled)
    }

    /// Orders may only be rung up before the drawer is closed
    pub fn accepts_orders(&self) -> bool {
        matches!(self, SessionStatus::Created | SessionStatus::Active)
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Created, SessionStatus::Active)
                | (SessionStatus::Active, SessionStatus::Closed)
                | (SessionStatus::Created, SessionStatus::Cancelled)
                | (SessionStatus::Active, SessionStatus::Cancelled)
        )
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(SessionStatus::Created),
            "active" => Ok(SessionStatus::Active),
            "closed" => Ok(SessionStatus::Closed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(UnknownVariant::new("session status", other)),
        }
    }
}

/// Count of each bill and coin in the drawer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CashDenominations {
    pub hundreds: u32,
    pub fifties: u32,
    pub twenties: u32,
    pub tens: u32,
    pub fives: u32,
    pub ones: u32,
    pub quarters: u32,
    pub dimes: u32,
    pub nickels: u32,
    pub pennies: u32,
}

impl CashDenominations {
    /// Sum of counts times face value
    pub fn total(&self) -> Decimal {
        let cents: u64 = [
            (self.hundreds, 10_000u64),
            (self.fifties, 5_000),
            (self.twenties, 2_000),
            (self.tens, 1_000),
            (self.fives, 500),
            (self.ones, 100),
            (self.quarters, 25),
            (self.dimes, 10),
            (self.nickels, 5),
            (self.pennies, 1),
        ]
        .iter()
        .map(|(count, face_cents)| u64::from(*count) * face_cents)
        .sum();

        Decimal::new(cents as i64, 2)
    }
}

/// One operating period of a concession stand
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcessionSession {
    pub id: i64,
    pub name: String,
    pub program_id: i64,
    pub status: SessionStatus,
    pub start_denominations: CashDenominations,
    pub start_total: Decimal,
    pub end_denominations: Option<CashDenominations>,
    /// Physical cash counted at close
    pub end_total: Option<Decimal>,
    /// Revenue minus COGS, set at close
    pub profit: Option<Decimal>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub closed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Revenue by payment method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueBreakdown {
    pub cash: Decimal,
    pub cashapp: Decimal,
    pub zelle: Decimal,
    pub total: Decimal,
}

impl RevenueBreakdown {
    /// Sum order totals by payment method
    pub fn from_orders<I>(orders: I) -> Self
    where
        I: IntoIterator<Item = (PaymentMethod, Decimal)>,
    {
        let mut breakdown = RevenueBreakdown::default();
        for (method, amount) in orders {
            match method {
                PaymentMethod::Cash => breakdown.cash += amount,
                PaymentMethod::Cashapp => breakdown.cashapp += amount,
                PaymentMethod::Zelle => breakdown.zelle += amount,
            }
            breakdown.total += amount;
        }
        breakdown
    }
}

/// Cost of goods sold during a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub cogs: Decimal,
    pub cogs_reimbursable: Decimal,
}

/// Ledger amounts posted by a close
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReimbursementPosting {
    pub cogs_owed: Decimal,
}

/// Financial result of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBreakdown {
    pub revenue: RevenueBreakdown,
    pub costs: CostBreakdown,
    pub profit: Decimal,
    pub reimbursement: ReimbursementPosting,
}

impl SessionBreakdown {
    pub fn new(revenue: RevenueBreakdown, costs: CostBreakdown) -> Self {
        Self {
            revenue,
            costs,
            profit: round_money(revenue.total - costs.cogs),
            reimbursement: ReimbursementPosting {
                cogs_owed: costs.cogs,
            },
        }
    }
}

/// Drawer count compared with what the drawer should hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashReconciliation {
    pub expected: Decimal,
    pub actual: Decimal,
    /// actual - expected; negative means the drawer is short
    pub discrepancy: Decimal,
}

impl CashReconciliation {
    pub fn compute(start_total: Decimal, cash_revenue: Decimal, actual: Decimal) -> Self {
        let expected = round_money(start_total + cash_revenue);
        Self {
            expected,
            actual,
            discrepancy: round_money(actual - expected),
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.discrepancy.is_zero()
    }
}

/// Result of closing a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCloseResult {
    pub session: ConcessionSession,
    pub breakdown: SessionBreakdown,
    pub cash_reconciliation: CashReconciliation,
}

/// Live figures for a session that has not necessarily closed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: i64,
    pub status: SessionStatus,
    pub order_count: i64,
    pub breakdown: SessionBreakdown,
    pub expected_cash_in_drawer: Decimal,
}
