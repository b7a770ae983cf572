//! Inventory mutation tests
//!
//! Tests for stock movements including:
//! - Every on-hand change leaves exactly one audit row
//! - Recipe expansion for composite items
//! - Physical counts, shrinkage losses and bulk fill levels
//! - Lot drift reporting

mod common;

use asb_concessions::error::AppError;
use asb_concessions::services::inventory::{
    AddStockInput, AdjustInventoryInput, CountLine, RecordCountInput, TransactionFilter,
};
use asb_concessions::services::loss::LossFilter;
use asb_concessions::services::menu::CreateMenuItemInput;
use asb_concessions::services::{InventoryService, LossService, MenuService};
use common::*;
use rust_decimal::Decimal;
use shared::{
    AdjustmentType, CashDenominations, ItemKind, ItemType, LossType, Pagination, PaymentMethod,
    TransactionType,
};

fn count(menu_item_id: i64, actual: &str) -> CountLine {
    CountLine {
        menu_item_id,
        actual_quantity: dec(actual),
        expected_quantity: None,
        fill_percentage: None,
    }
}

fn adjustment(change: &str, adjustment_type: AdjustmentType) -> AdjustInventoryInput {
    AdjustInventoryInput {
        quantity_change: dec(change),
        adjustment_type,
        notes: None,
    }
}

// ============================================================================
// Audit Trail
// ============================================================================

#[tokio::test]
async fn test_every_movement_is_audited() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Band").await;
    let hot_dog = create_item(&pool, "Hot dog", ItemType::Sellable, Some("3.00")).await;
    let inventory = InventoryService::new(pool.clone(), locks.clone());

    buy(&pool, &locks, hot_dog.id, "10", "0.50", "2024-09-01").await;

    inventory
        .add_stock(
            hot_dog.id,
            AddStockInput {
                quantity: dec("2"),
                unit_cost: None,
                purchase_date: None,
                notes: Some("Donated by boosters".to_string()),
            },
            ACTOR,
        )
        .await
        .unwrap();

    let session = create_session(&pool, &locks, program.id, CashDenominations::default()).await;
    sell(&pool, &locks, session.id, hot_dog.id, "3", "3.00", PaymentMethod::Cash).await;

    inventory
        .adjust(hot_dog.id, adjustment("-1", AdjustmentType::Wasted), ACTOR)
        .await
        .unwrap();

    let results = inventory
        .record_counts(
            RecordCountInput {
                counts: vec![count(hot_dog.id, "7")],
                counted_by: Some("Mr. Okafor".to_string()),
            },
            ACTOR,
        )
        .await
        .unwrap();
    assert_eq!(results[0].quantity_change, dec("-1"));

    let stock = on_hand(&pool, hot_dog.id).await;
    assert_eq!(stock, dec("7"));
    assert_eq!(transaction_total(&pool, hot_dog.id).await, stock);
    assert_eq!(transaction_count(&pool, hot_dog.id).await, 5);

    let types: Vec<TransactionType> = inventory
        .list_transactions(
            TransactionFilter {
                menu_item_id: Some(hot_dog.id),
                transaction_type: None,
            },
            Pagination::default(),
        )
        .await
        .unwrap()
        .into_iter()
        .rev()
        .map(|t| t.transaction_type)
        .collect();
    assert_eq!(
        types,
        vec![
            TransactionType::Purchase,
            TransactionType::StockUpdate,
            TransactionType::Sale,
            TransactionType::Wasted,
            TransactionType::CountAdjustment,
        ]
    );
}

#[tokio::test]
async fn test_adjust_below_zero_is_rejected() {
    let pool = test_pool().await;
    let locks = locks();
    let pretzel = create_item(&pool, "Pretzel", ItemType::Sellable, Some("2.50")).await;
    buy(&pool, &locks, pretzel.id, "2", "0.80", "2024-09-01").await;

    let err = InventoryService::new(pool.clone(), locks.clone())
        .adjust(pretzel.id, adjustment("-3", AdjustmentType::Lost), ACTOR)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::StateConflict(_)));
    assert_eq!(on_hand(&pool, pretzel.id).await, dec("2"));
    assert_eq!(transaction_count(&pool, pretzel.id).await, 1);
}

#[tokio::test]
async fn test_only_count_adjustments_may_add_stock() {
    let pool = test_pool().await;
    let locks = locks();
    let popcorn = create_item(&pool, "Popcorn", ItemType::Sellable, Some("2.00")).await;

    let err = InventoryService::new(pool.clone(), locks.clone())
        .adjust(popcorn.id, adjustment("4", AdjustmentType::Donated), ACTOR)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation { .. }));
    assert_eq!(transaction_count(&pool, popcorn.id).await, 0);
}

// ============================================================================
// Recipes
// ============================================================================

#[tokio::test]
async fn test_composite_sale_deducts_components() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Robotics").await;
    let bun = create_item(&pool, "Bun", ItemType::Ingredient, None).await;
    let patty = create_item(&pool, "Patty", ItemType::Ingredient, None).await;
    let burger =
        create_composite(&pool, "Burger", "5.00", &[(bun.id, "1"), (patty.id, "1")]).await;
    let double = create_composite(
        &pool,
        "Double burger",
        "7.00",
        &[(burger.id, "1"), (patty.id, "1")],
    )
    .await;

    buy(&pool, &locks, bun.id, "10", "0.30", "2024-09-01").await;
    buy(&pool, &locks, patty.id, "10", "1.20", "2024-09-01").await;

    let session = create_session(&pool, &locks, program.id, CashDenominations::default()).await;
    let receipt =
        sell(&pool, &locks, session.id, burger.id, "2", "5.00", PaymentMethod::Cash).await;
    assert_eq!(receipt.cogs, dec("3.00"));
    assert_eq!(receipt.cogs_reimbursable, dec("3.00"));
    assert!(receipt.stock_warnings.is_empty());

    let receipt =
        sell(&pool, &locks, session.id, double.id, "1", "7.00", PaymentMethod::Cash).await;
    // bun + 2 patties
    assert_eq!(receipt.cogs, dec("2.70"));

    assert_eq!(on_hand(&pool, bun.id).await, dec("7"));
    assert_eq!(on_hand(&pool, patty.id).await, dec("6"));
    // Patty reached twice through the double is one row
    assert_eq!(transaction_count(&pool, patty.id).await, 3);
    assert_eq!(transaction_count(&pool, burger.id).await, 0);
    assert_eq!(transaction_count(&pool, double.id).await, 0);
    assert_eq!(on_hand(&pool, burger.id).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_composite_without_recipe_deducts_itself() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Drama").await;
    let combo = create_composite(&pool, "Mystery combo", "4.00", &[]).await;
    buy(&pool, &locks, combo.id, "5", "1.00", "2024-09-01").await;

    let session = create_session(&pool, &locks, program.id, CashDenominations::default()).await;
    let receipt =
        sell(&pool, &locks, session.id, combo.id, "1", "4.00", PaymentMethod::Cash).await;

    assert_eq!(receipt.cogs, dec("1.00"));
    assert_eq!(on_hand(&pool, combo.id).await, dec("4"));
}

#[tokio::test]
async fn test_overselling_warns_and_goes_negative() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Choir").await;
    let cookie = create_item(&pool, "Cookie", ItemType::Sellable, Some("1.00")).await;
    buy(&pool, &locks, cookie.id, "1", "0.40", "2024-09-01").await;

    let session = create_session(&pool, &locks, program.id, CashDenominations::default()).await;
    let receipt =
        sell(&pool, &locks, session.id, cookie.id, "2", "1.00", PaymentMethod::Cash).await;

    assert_eq!(receipt.stock_warnings, vec![cookie.id]);
    assert_eq!(receipt.cogs, dec("0.40"));
    assert_eq!(on_hand(&pool, cookie.id).await, dec("-1"));
    assert_eq!(transaction_total(&pool, cookie.id).await, dec("-1"));
}

// ============================================================================
// Counts
// ============================================================================

#[tokio::test]
async fn test_count_shortage_creates_loss() {
    let pool = test_pool().await;
    let locks = locks();
    let gum = create_item(&pool, "Gum", ItemType::Sellable, Some("0.50")).await;
    let mints = create_item(&pool, "Mints", ItemType::Sellable, Some("0.50")).await;
    buy(&pool, &locks, gum.id, "10", "0.20", "2024-09-01").await;
    buy(&pool, &locks, mints.id, "4", "0.10", "2024-09-01").await;

    let results = InventoryService::new(pool.clone(), locks.clone())
        .record_counts(
            RecordCountInput {
                counts: vec![count(gum.id, "7"), count(mints.id, "6")],
                counted_by: None,
            },
            ACTOR,
        )
        .await
        .unwrap();

    let gum_result = &results[0];
    assert_eq!(gum_result.discrepancy, dec("-3"));
    assert_eq!(gum_result.loss_amount, Some(dec("0.60")));
    assert!(gum_result.loss_id.is_some());

    // Found more than expected: stock goes up, no loss
    let mints_result = &results[1];
    assert_eq!(mints_result.discrepancy, dec("2"));
    assert!(mints_result.loss_id.is_none());
    assert_eq!(on_hand(&pool, mints.id).await, dec("6"));

    let losses = LossService::new(pool.clone(), common::locks())
        .list(LossFilter::default())
        .await
        .unwrap();
    assert_eq!(losses.len(), 1);
    assert_eq!(losses[0].loss_type, LossType::InventoryDiscrepancy);
    assert_eq!(losses[0].menu_item_id, Some(gum.id));
    assert!(!losses[0].is_settled());

    let item = MenuService::new(pool.clone()).get_item(gum.id).await.unwrap();
    assert_eq!(item.last_verified_by.as_deref(), Some(ACTOR));
    assert!(item.last_verified_at.is_some());
}

#[tokio::test]
async fn test_count_rejects_duplicate_items() {
    let pool = test_pool().await;
    let locks = locks();
    let gum = create_item(&pool, "Gum", ItemType::Sellable, Some("0.50")).await;

    let err = InventoryService::new(pool.clone(), locks.clone())
        .record_counts(
            RecordCountInput {
                counts: vec![count(gum.id, "1"), count(gum.id, "2")],
                counted_by: None,
            },
            ACTOR,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "counts"));
}

#[tokio::test]
async fn test_bulk_fill_tracks_partial_container() {
    let pool = test_pool().await;
    let locks = locks();
    let menu = MenuService::new(pool.clone());
    let cheese = menu
        .create_item(CreateMenuItemInput {
            name: "Nacho cheese".to_string(),
            category: Some("Bulk".to_string()),
            price: None,
            item_type: ItemType::BulkIngredient,
            unit_cost: None,
            is_liquid: true,
            units_per_container: Some(dec("40")),
            components: Vec::new(),
        })
        .await
        .unwrap();
    buy(&pool, &locks, cheese.id, "3", "12.00", "2024-09-01").await;

    let inventory = InventoryService::new(pool.clone(), locks.clone());
    inventory
        .adjust(cheese.id, adjustment("-0.25", AdjustmentType::Wasted), ACTOR)
        .await
        .unwrap();

    let fill = |item: shared::MenuItem| match item.kind {
        ItemKind::BulkIngredient { container } => container.fill_percentage,
        other => panic!("expected bulk ingredient, got {:?}", other),
    };
    assert_eq!(fill(menu.get_item(cheese.id).await.unwrap()), dec("75"));

    // A counted fill level overrides the derived one
    inventory
        .record_counts(
            RecordCountInput {
                counts: vec![CountLine {
                    fill_percentage: Some(dec("60")),
                    ..count(cheese.id, "2.5")
                }],
                counted_by: None,
            },
            ACTOR,
        )
        .await
        .unwrap();
    assert_eq!(fill(menu.get_item(cheese.id).await.unwrap()), dec("60"));
    assert_eq!(on_hand(&pool, cheese.id).await, dec("2.5"));
}

// ============================================================================
// Drift
// ============================================================================

#[tokio::test]
async fn test_drift_report_lists_untracked_stock() {
    let pool = test_pool().await;
    let locks = locks();
    let tracked = create_item(&pool, "Nachos", ItemType::Sellable, Some("3.00")).await;
    let drifted = create_item(&pool, "Gatorade", ItemType::Sellable, Some("2.00")).await;
    buy(&pool, &locks, tracked.id, "4", "1.00", "2024-09-01").await;
    buy(&pool, &locks, drifted.id, "2", "0.90", "2024-09-01").await;

    sqlx::query("UPDATE menu_items SET quantity_on_hand = 5 WHERE id = ?")
        .bind(drifted.id)
        .execute(&pool)
        .await
        .unwrap();

    let drift = InventoryService::new(pool.clone(), locks.clone())
        .lot_drift()
        .await
        .unwrap();

    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].menu_item_id, drifted.id);
    assert_eq!(drift[0].lot_quantity, dec("2"));
    assert_eq!(drift[0].drift, dec("3"));
}
