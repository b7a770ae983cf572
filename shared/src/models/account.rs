//! Cash accounts held outside a session drawer

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashAccountKind {
    /// Physical cashbox kept between sessions
    Cashbox,
    /// CashApp business account receiving mobile payments
    Cashapp,
}

impl CashAccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashAccountKind::Cashbox => "cashbox",
            CashAccountKind::Cashapp => "cashapp",
        }
    }
}

impl FromStr for CashAccountKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cashbox" => Ok(CashAccountKind::Cashbox),
            "cashapp" => Ok(CashAccountKind::Cashapp),
            other => Err(UnknownVariant::new("cash account", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashAccount {
    pub account: CashAccountKind,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Both accounts as one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashAccountsSnapshot {
    pub cashbox: CashAccount,
    pub cashapp: CashAccount,
}
