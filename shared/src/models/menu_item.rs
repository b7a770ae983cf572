//! Menu item and recipe models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::money::round_money;
use crate::types::UnknownVariant;

/// Storage tag for a menu item's kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Sellable,
    Composite,
    Ingredient,
    BulkIngredient,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Sellable => "sellable",
            ItemType::Composite => "composite",
            ItemType::Ingredient => "ingredient",
            ItemType::BulkIngredient => "bulk_ingredient",
        }
    }
}

impl FromStr for ItemType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sellable" => Ok(ItemType::Sellable),
            "composite" => Ok(ItemType::Composite),
            "ingredient" => Ok(ItemType::Ingredient),
            "bulk_ingredient" => Ok(ItemType::BulkIngredient),
            other => Err(UnknownVariant::new("item type", other)),
        }
    }
}

/// One line of a composite item's recipe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecipeComponent {
    pub component_id: i64,
    pub component_name: String,
    /// Units of the component consumed per unit of the composite
    pub quantity_per_unit: Decimal,
}

/// Partial-container tracking for bulk ingredients
///
/// `quantity_on_hand` of a bulk ingredient counts containers, so a value of
/// 2.25 means two sealed containers and one at 25%.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub is_liquid: bool,
    /// Servings in a full container, informational
    pub units_per_container: Option<Decimal>,
    /// Fill level of the open container, 0-100
    pub fill_percentage: Decimal,
}

impl ContainerInfo {
    /// Fill level of the open container implied by a container count
    pub fn fill_for_quantity(quantity_on_hand: Decimal) -> Decimal {
        if quantity_on_hand <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let partial = quantity_on_hand.fract();
        if partial.is_zero() {
            Decimal::ONE_HUNDRED
        } else {
            round_money(partial * Decimal::ONE_HUNDRED)
        }
    }
}

/// What a menu item is, and therefore how stock is deducted when it sells
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "itemType", rename_all = "snake_case")]
pub enum ItemKind {
    /// Sold as-is from its own stock
    Sellable,
    /// Sold, but stock is taken from its components
    Composite { components: Vec<RecipeComponent> },
    /// Only consumed through recipes
    Ingredient,
    /// Ingredient stocked in containers that are used up gradually
    BulkIngredient { container: ContainerInfo },
}

impl ItemKind {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemKind::Sellable => ItemType::Sellable,
            ItemKind::Composite { .. } => ItemType::Composite,
            ItemKind::Ingredient => ItemType::Ingredient,
            ItemKind::BulkIngredient { .. } => ItemType::BulkIngredient,
        }
    }

    /// Whether the item can appear on an order
    pub fn is_sellable(&self) -> bool {
        matches!(self, ItemKind::Sellable | ItemKind::Composite { .. })
    }
}

/// A menu item or ingredient
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    /// Sale price; absent for ingredients and category placeholders
    pub price: Option<Decimal>,
    /// Cost of the most recent lot. Display valuation only; sales are
    /// costed from lots.
    pub unit_cost: Decimal,
    /// Authoritative stock level, may be negative after oversells
    pub quantity_on_hand: Decimal,
    #[serde(flatten)]
    pub kind: ItemKind,
    pub is_active: bool,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub last_verified_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MenuItem {
    /// Last-in unit cost used for display and loss valuation
    pub fn display_unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    /// On-hand stock valued at the display unit cost
    pub fn display_stock_value(&self) -> Decimal {
        round_money(self.quantity_on_hand.max(Decimal::ZERO) * self.unit_cost)
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity_on_hand <= Decimal::ZERO
    }
}
