//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::SqlitePool;

use asb_concessions::config::{DatabaseConfig, JwtConfig, ServerConfig};
use asb_concessions::services::menu::{ComponentInput, CreateMenuItemInput};
use asb_concessions::services::order::{CreateOrderInput, OrderLineInput};
use asb_concessions::services::program::CreateProgramInput;
use asb_concessions::services::purchase::{CreatePurchaseInput, PurchaseLineInput};
use asb_concessions::services::session::CreateSessionInput;
use asb_concessions::services::{
    MenuService, OrderService, ProgramService, PurchaseService, SessionService,
};
use asb_concessions::{db, AppState, Config, WriteLocks};
use shared::{
    CashDenominations, ConcessionSession, ItemType, MenuItem, OrderReceipt, PaymentMethod, Program,
    Purchase,
};

pub const ACTOR: &str = "Test Treasurer";
pub const JWT_SECRET: &str = "test-secret";

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub async fn test_pool() -> SqlitePool {
    db::connect_in_memory().await.expect("in-memory database")
}

/// File-backed WAL database with several connections, for tests that
/// need writers to actually overlap. Keep the `TempDir` alive.
pub async fn file_pool() -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = DatabaseConfig {
        path: dir.path().join("concessions.db").to_string_lossy().into_owned(),
        max_connections: 4,
        busy_timeout_ms: 5_000,
    };
    let pool = db::connect(&config).await.expect("file database");
    (dir, pool)
}

pub fn locks() -> Arc<WriteLocks> {
    Arc::new(WriteLocks::default())
}

pub fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        log_format: "pretty".to_string(),
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            request_timeout_secs: 30,
        },
        database: DatabaseConfig {
            path: ":memory:".to_string(),
            max_connections: 1,
            busy_timeout_ms: 5_000,
        },
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            issuer: None,
        },
    }
}

pub async fn test_state() -> AppState {
    AppState::new(test_pool().await, test_config())
}

pub async fn create_program(pool: &SqlitePool, name: &str) -> Program {
    ProgramService::new(pool.clone())
        .create(CreateProgramInput {
            name: name.to_string(),
            description: None,
        })
        .await
        .unwrap()
}

pub async fn create_item(
    pool: &SqlitePool,
    name: &str,
    item_type: ItemType,
    price: Option<&str>,
) -> MenuItem {
    MenuService::new(pool.clone())
        .create_item(CreateMenuItemInput {
            name: name.to_string(),
            category: None,
            price: price.map(dec),
            item_type,
            unit_cost: None,
            is_liquid: false,
            units_per_container: None,
            components: Vec::new(),
        })
        .await
        .unwrap()
}

pub async fn create_composite(
    pool: &SqlitePool,
    name: &str,
    price: &str,
    components: &[(i64, &str)],
) -> MenuItem {
    MenuService::new(pool.clone())
        .create_item(CreateMenuItemInput {
            name: name.to_string(),
            category: None,
            price: Some(dec(price)),
            item_type: ItemType::Composite,
            unit_cost: None,
            is_liquid: false,
            units_per_container: None,
            components: components
                .iter()
                .map(|(id, qty)| ComponentInput {
                    component_id: *id,
                    quantity_per_unit: dec(qty),
                })
                .collect(),
        })
        .await
        .unwrap()
}

/// Buy `quantity` units at `unit_cost` each on `purchase_date`, with no fees
pub async fn buy(
    pool: &SqlitePool,
    locks: &Arc<WriteLocks>,
    menu_item_id: i64,
    quantity: &str,
    unit_cost: &str,
    purchase_date: &str,
) -> Purchase {
    let qty = dec(quantity);
    PurchaseService::new(pool.clone(), locks.clone())
        .create(
            CreatePurchaseInput {
                vendor: "Costco".to_string(),
                purchase_date: Some(date(purchase_date)),
                items: vec![PurchaseLineInput {
                    menu_item_id,
                    quantity: qty,
                    line_total: qty * dec(unit_cost),
                }],
                tax: Decimal::ZERO,
                delivery_fee: Decimal::ZERO,
                other_fees: Decimal::ZERO,
                notes: None,
            },
            ACTOR,
        )
        .await
        .unwrap()
}

pub async fn create_session(
    pool: &SqlitePool,
    locks: &Arc<WriteLocks>,
    program_id: i64,
    start: CashDenominations,
) -> ConcessionSession {
    SessionService::new(pool.clone(), locks.clone())
        .create(
            CreateSessionInput {
                name: "Friday football".to_string(),
                program_id,
                start_denominations: start,
                notes: None,
            },
            ACTOR,
        )
        .await
        .unwrap()
}

/// Sum of an item's audit rows
pub async fn transaction_total(pool: &SqlitePool, menu_item_id: i64) -> Decimal {
    let total: Option<f64> = sqlx::query_scalar(
        "SELECT SUM(quantity_change) FROM inventory_transactions WHERE menu_item_id = ?",
    )
    .bind(menu_item_id)
    .fetch_one(pool)
    .await
    .unwrap();
    shared::money::to_decimal(total.unwrap_or_default())
}

pub async fn transaction_count(pool: &SqlitePool, menu_item_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM inventory_transactions WHERE menu_item_id = ?")
        .bind(menu_item_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn on_hand(pool: &SqlitePool, menu_item_id: i64) -> Decimal {
    let qty: f64 = sqlx::query_scalar("SELECT quantity_on_hand FROM menu_items WHERE id = ?")
        .bind(menu_item_id)
        .fetch_one(pool)
        .await
        .unwrap();
    shared::money::to_decimal(qty)
}

/// Ring up one line on a session, paid with `method`
pub async fn sell(
    pool: &SqlitePool,
    locks: &Arc<WriteLocks>,
    session_id: i64,
    menu_item_id: i64,
    quantity: &str,
    unit_price: &str,
    method: PaymentMethod,
) -> OrderReceipt {
    let total = dec(quantity) * dec(unit_price);
    OrderService::new(pool.clone(), locks.clone())
        .create(
            CreateOrderInput {
                session_id,
                items: vec![OrderLineInput {
                    menu_item_id,
                    quantity: dec(quantity),
                    unit_price: dec(unit_price),
                }],
                payment_method: method,
                amount_tendered: (method == PaymentMethod::Cash).then_some(total),
                discount_amount: Decimal::ZERO,
                is_comp: false,
            },
            ACTOR,
        )
        .await
        .unwrap()
}
