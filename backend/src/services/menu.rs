//! Menu items, ingredients and composite recipes

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::money::{money_to_f64, precise_to_f64, to_decimal, to_decimal_opt};
use shared::validation::{check_price_for_kind, check_recipe, validate_not_blank, validate_positive};
use shared::{ContainerInfo, ItemKind, ItemType, MenuItem, RecipeComponent};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Menu service for items and recipes
#[derive(Clone)]
pub struct MenuService {
    db: SqlitePool,
}

/// Input for creating a menu item
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMenuItemInput {
    #[validate(custom = "validate_not_blank")]
    pub name: String,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub item_type: ItemType,
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub is_liquid: bool,
    #[validate(custom = "validate_positive")]
    pub units_per_container: Option<Decimal>,
    #[validate]
    #[serde(default)]
    pub components: Vec<ComponentInput>,
}

/// Input for updating a menu item
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMenuItemInput {
    #[validate(custom = "validate_not_blank")]
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub is_active: Option<bool>,
    pub is_liquid: Option<bool>,
    #[validate(custom = "validate_positive")]
    pub units_per_container: Option<Decimal>,
}

/// One recipe line
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInput {
    pub component_id: i64,
    #[validate(custom = "validate_positive")]
    pub quantity_per_unit: Decimal,
}

/// Filter for listing menu items
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuFilter {
    pub item_type: Option<ItemType>,
    pub category: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, FromRow)]
pub(crate) struct MenuItemRow {
    id: i64,
    name: String,
    category: Option<String>,
    price: Option<f64>,
    unit_cost: f64,
    quantity_on_hand: f64,
    item_type: String,
    is_liquid: bool,
    units_per_container: Option<f64>,
    fill_percentage: f64,
    is_active: bool,
    last_verified_at: Option<DateTime<Utc>>,
    last_verified_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MenuItemRow {
    fn into_item(self, components: Vec<RecipeComponent>) -> AppResult<MenuItem> {
        let item_type: ItemType = self.item_type.parse()?;
        let kind = build_kind(
            item_type,
            components,
            ContainerInfo {
                is_liquid: self.is_liquid,
                units_per_container: to_decimal_opt(self.units_per_container),
                fill_percentage: to_decimal(self.fill_percentage),
            },
        );

        Ok(MenuItem {
            id: self.id,
            name: self.name,
            category: self.category,
            price: to_decimal_opt(self.price),
            unit_cost: to_decimal(self.unit_cost),
            quantity_on_hand: to_decimal(self.quantity_on_hand),
            kind,
            is_active: self.is_active,
            last_verified_at: self.last_verified_at,
            last_verified_by: self.last_verified_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ComponentRow {
    composite_id: i64,
    component_id: i64,
    component_name: String,
    quantity_per_unit: f64,
}

impl From<ComponentRow> for RecipeComponent {
    fn from(row: ComponentRow) -> Self {
        Self {
            component_id: row.component_id,
            component_name: row.component_name,
            quantity_per_unit: to_decimal(row.quantity_per_unit),
        }
    }
}

const ITEM_COLUMNS: &str = r#"
    id, name, category, price, unit_cost, quantity_on_hand, item_type, is_liquid,
    units_per_container, fill_percentage, is_active, last_verified_at, last_verified_by,
    created_at, updated_at
"#;

fn build_kind(item_type: ItemType, components: Vec<RecipeComponent>, container: ContainerInfo) -> ItemKind {
    match item_type {
        ItemType::Sellable => ItemKind::Sellable,
        ItemType::Composite => ItemKind::Composite { components },
        ItemType::Ingredient => ItemKind::Ingredient,
        ItemType::BulkIngredient => ItemKind::BulkIngredient { container },
    }
}

/// Load one item, with its recipe if it is a composite
pub async fn load_item(conn: &mut SqliteConnection, id: i64) -> AppResult<MenuItem> {
    let row = sqlx::query_as::<_, MenuItemRow>(&format!(
        "SELECT {} FROM menu_items WHERE id = ?",
        ITEM_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(format!("Menu item {}", id)))?;

    let components = if row.item_type == ItemType::Composite.as_str() {
        load_components(conn, id).await?
    } else {
        Vec::new()
    };

    row.into_item(components)
}

/// Recipe lines for a composite, ordered by component name
pub async fn load_components(
    conn: &mut SqliteConnection,
    composite_id: i64,
) -> AppResult<Vec<RecipeComponent>> {
    let rows = sqlx::query_as::<_, ComponentRow>(
        r#"
        SELECT c.composite_id, c.component_id, m.name AS component_name, c.quantity_per_unit
        FROM menu_item_components c
        JOIN menu_items m ON m.id = c.component_id
        WHERE c.composite_id = ?
        ORDER BY m.name, c.component_id
        "#,
    )
    .bind(composite_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Replace a composite's recipe
///
/// Rejects components that do not exist, and any component whose own recipe
/// leads back to the composite.
pub async fn replace_components(
    conn: &mut SqliteConnection,
    composite_id: i64,
    input: &[ComponentInput],
) -> AppResult<Vec<RecipeComponent>> {
    let mut components = Vec::with_capacity(input.len());
    for line in input {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM menu_items WHERE id = ?")
            .bind(line.component_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Menu item {}", line.component_id)))?;
        components.push(RecipeComponent {
            component_id: line.component_id,
            component_name: name,
            quantity_per_unit: line.quantity_per_unit,
        });
    }

    check_recipe(composite_id, &components).map_err(|msg| AppError::validation("components", msg))?;

    for component in &components {
        if recipe_reaches(conn, component.component_id, composite_id).await? {
            return Err(AppError::validation(
                "components",
                format!("{} already contains this item", component.component_name),
            ));
        }
    }

    sqlx::query("DELETE FROM menu_item_components WHERE composite_id = ?")
        .bind(composite_id)
        .execute(&mut *conn)
        .await?;

    for component in &components {
        sqlx::query(
            "INSERT INTO menu_item_components (composite_id, component_id, quantity_per_unit) VALUES (?, ?, ?)",
        )
        .bind(composite_id)
        .bind(component.component_id)
        .bind(precise_to_f64(component.quantity_per_unit))
        .execute(&mut *conn)
        .await?;
    }

    load_components(conn, composite_id).await
}

/// Whether `target` appears anywhere in the recipe tree under `start`
async fn recipe_reaches(conn: &mut SqliteConnection, start: i64, target: i64) -> AppResult<bool> {
    let mut stack = vec![start];
    let mut visited = HashSet::new();

    while let Some(id) = stack.pop() {
        if id == target {
            return Ok(true);
        }
        if !visited.insert(id) {
            continue;
        }
        let children = sqlx::query_scalar::<_, i64>(
            "SELECT component_id FROM menu_item_components WHERE composite_id = ?",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
        stack.extend(children);
    }

    Ok(false)
}

impl MenuService {
    /// Create a new MenuService instance
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a menu item, and its recipe for composites
    pub async fn create_item(&self, input: CreateMenuItemInput) -> AppResult<MenuItem> {
        input.validate()?;

        let kind = build_kind(
            input.item_type,
            Vec::new(),
            ContainerInfo {
                is_liquid: input.is_liquid,
                units_per_container: input.units_per_container,
                fill_percentage: Decimal::ONE_HUNDRED,
            },
        );
        check_price_for_kind(&kind, input.price).map_err(|msg| AppError::validation("price", msg))?;

        if !input.components.is_empty() && input.item_type != ItemType::Composite {
            return Err(AppError::validation(
                "components",
                "Only composite items can have components",
            ));
        }
        if input.unit_cost.is_some_and(|c| c < Decimal::ZERO) {
            return Err(AppError::validation("unitCost", "Unit cost must not be negative"));
        }

        let mut tx = self.db.begin().await?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO menu_items (
                name, category, price, unit_cost, item_type, is_liquid, units_per_container
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(input.name.trim())
        .bind(&input.category)
        .bind(input.price.map(money_to_f64))
        .bind(precise_to_f64(input.unit_cost.unwrap_or_default()))
        .bind(input.item_type.as_str())
        .bind(input.is_liquid)
        .bind(input.units_per_container.map(precise_to_f64))
        .fetch_one(&mut *tx)
        .await?;

        if !input.components.is_empty() {
            replace_components(&mut tx, id, &input.components).await?;
        }

        let item = load_item(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(menu_item_id = id, item_type = input.item_type.as_str(), "Menu item created");
        Ok(item)
    }

    /// Get a menu item by id
    pub async fn get_item(&self, id: i64) -> AppResult<MenuItem> {
        let mut conn = self.db.acquire().await?;
        load_item(&mut conn, id).await
    }

    /// List menu items with their recipes
    pub async fn list_items(&self, filter: MenuFilter) -> AppResult<Vec<MenuItem>> {
        let rows = sqlx::query_as::<_, MenuItemRow>(&format!(
            r#"
            SELECT {}
            FROM menu_items
            WHERE (? OR is_active = 1)
              AND (? IS NULL OR item_type = ?)
              AND (? IS NULL OR category = ?)
            ORDER BY category, name, id
            "#,
            ITEM_COLUMNS
        ))
        .bind(filter.include_inactive)
        .bind(filter.item_type.map(|t| t.as_str()))
        .bind(filter.item_type.map(|t| t.as_str()))
        .bind(&filter.category)
        .bind(&filter.category)
        .fetch_all(&self.db)
        .await?;

        let component_rows = sqlx::query_as::<_, ComponentRow>(
            r#"
            SELECT c.composite_id, c.component_id, m.name AS component_name, c.quantity_per_unit
            FROM menu_item_components c
            JOIN menu_items m ON m.id = c.component_id
            ORDER BY m.name, c.component_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut recipes: HashMap<i64, Vec<RecipeComponent>> = HashMap::new();
        for row in component_rows {
            recipes.entry(row.composite_id).or_default().push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let components = recipes.remove(&row.id).unwrap_or_default();
                row.into_item(components)
            })
            .collect()
    }

    /// Update display fields of a menu item
    pub async fn update_item(&self, id: i64, input: UpdateMenuItemInput) -> AppResult<MenuItem> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let current = load_item(&mut tx, id).await?;

        if let Some(price) = input.price {
            check_price_for_kind(&current.kind, Some(price))
                .map_err(|msg| AppError::validation("price", msg))?;
        }

        sqlx::query(
            r#"
            UPDATE menu_items SET
                name = COALESCE(?, name),
                category = COALESCE(?, category),
                price = COALESCE(?, price),
                is_active = COALESCE(?, is_active),
                is_liquid = COALESCE(?, is_liquid),
                units_per_container = COALESCE(?, units_per_container),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?
            "#,
        )
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.category)
        .bind(input.price.map(money_to_f64))
        .bind(input.is_active)
        .bind(input.is_liquid)
        .bind(input.units_per_container.map(precise_to_f64))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let item = load_item(&mut tx, id).await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Set the recipe of a composite item
    pub async fn set_components(&self, id: i64, input: Vec<ComponentInput>) -> AppResult<MenuItem> {
        for line in &input {
            line.validate()?;
        }

        let mut tx = self.db.begin().await?;
        let item = load_item(&mut tx, id).await?;
        if item.kind.item_type() != ItemType::Composite {
            return Err(AppError::validation(
                "components",
                format!("{} is not a composite item", item.name),
            ));
        }

        replace_components(&mut tx, id, &input).await?;
        let item = load_item(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(menu_item_id = id, components = input.len(), "Recipe updated");
        Ok(item)
    }
}
