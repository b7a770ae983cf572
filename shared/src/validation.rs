//! Validation utilities shared by request inputs
//!
//! The `validate_*` functions plug into `#[validate(custom = "...")]` on
//! request structs; the `check_*` functions are plain domain checks.

use std::borrow::Cow;

use rust_decimal::Decimal;
use validator::ValidationError;

use crate::models::{ItemKind, RecipeComponent};
use crate::money::round_money;

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

// ============================================================================
// Field validators
// ============================================================================

/// Quantities and unit counts must be greater than zero
pub fn validate_positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        Err(error("positive", "must be greater than zero"))
    }
}

/// Money moved or owed must still be at least a cent once rounded
pub fn validate_positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if round_money(*value) > Decimal::ZERO {
        Ok(())
    } else {
        Err(error("positive_amount", "must be at least 0.01"))
    }
}

/// Money amounts must not be negative
pub fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO {
        Ok(())
    } else {
        Err(error("non_negative", "must not be negative"))
    }
}

/// Signed adjustments must actually change something
pub fn validate_non_zero(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_zero() {
        Err(error("non_zero", "must not be zero"))
    } else {
        Ok(())
    }
}

/// Fill levels are percentages
pub fn validate_percentage(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO && *value <= Decimal::ONE_HUNDRED {
        Ok(())
    } else {
        Err(error("percentage", "must be between 0 and 100"))
    }
}

/// Names must contain something other than whitespace
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(error("not_blank", "must not be blank"))
    } else {
        Ok(())
    }
}

// ============================================================================
// Domain checks
// ============================================================================

/// A sellable item needs a price; an ingredient must not carry one
pub fn check_price_for_kind(kind: &ItemKind, price: Option<Decimal>) -> Result<(), &'static str> {
    match (kind.is_sellable(), price) {
        (true, None) => Err("Sellable items require a price"),
        (true, Some(p)) if p < Decimal::ZERO => Err("Price must not be negative"),
        (false, Some(_)) => Err("Ingredients cannot have a sale price"),
        _ => Ok(()),
    }
}

/// A recipe must not list the composite itself or the same component twice
pub fn check_recipe(composite_id: i64, components: &[RecipeComponent]) -> Result<(), &'static str> {
    let mut seen = std::collections::HashSet::new();
    for component in components {
        if component.component_id == composite_id {
            return Err("A composite item cannot contain itself");
        }
        if component.quantity_per_unit <= Decimal::ZERO {
            return Err("Component quantities must be greater than zero");
        }
        if !seen.insert(component.component_id) {
            return Err("Each component may appear only once");
        }
    }
    Ok(())
}
