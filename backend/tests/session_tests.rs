//! Session lifecycle tests
//!
//! Tests for concession sessions including:
//! - Closing a session posts COGS and credits the program in one step
//! - A failed close leaves nothing behind
//! - Status transitions and order acceptance

mod common;

use asb_concessions::error::AppError;
use asb_concessions::services::loss::{CreateLossInput, SettleLossInput};
use asb_concessions::services::order::{CreateOrderInput, OrderLineInput};
use asb_concessions::services::session::CloseSessionInput;
use asb_concessions::services::{
    CashAccounts, LossService, OrderService, ProgramService, ReimbursementService, SessionService,
};
use common::*;
use rust_decimal::Decimal;
use shared::{CashDenominations, ItemType, LossType, PaymentMethod, SessionStatus, SettlementTarget};

fn close_input(actual: &str) -> CloseSessionInput {
    CloseSessionInput {
        actual_cash_count: dec(actual),
        closed_by: Some("Ms. Rivera".to_string()),
        ending_denominations: None,
    }
}

/// Starting drawer of a single fifty
fn fifty() -> CashDenominations {
    CashDenominations {
        fifties: 1,
        ..Default::default()
    }
}

// ============================================================================
// Close
// ============================================================================

#[tokio::test]
async fn test_close_settles_session() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Class of 2026").await;
    let pizza = create_item(&pool, "Pizza slice", ItemType::Sellable, Some("12.00")).await;
    let nachos = create_item(&pool, "Nachos", ItemType::Sellable, Some("8.00")).await;
    buy(&pool, &locks, pizza.id, "1", "5.00", "2024-09-01").await;
    buy(&pool, &locks, nachos.id, "1", "3.00", "2024-09-01").await;

    let session = create_session(&pool, &locks, program.id, fifty()).await;
    assert_eq!(session.start_total, dec("50"));
    assert_eq!(session.status, SessionStatus::Created);

    sell(&pool, &locks, session.id, pizza.id, "1", "12.00", PaymentMethod::Cash).await;
    sell(&pool, &locks, session.id, nachos.id, "1", "8.00", PaymentMethod::Cashapp).await;

    let sessions = SessionService::new(pool.clone(), locks.clone());
    let summary = sessions.summary(session.id).await.unwrap();
    assert_eq!(summary.status, SessionStatus::Active);
    assert_eq!(summary.order_count, 2);
    assert_eq!(summary.expected_cash_in_drawer, dec("62"));

    let result = sessions
        .close(session.id, close_input("62.00"), ACTOR)
        .await
        .unwrap();

    assert_eq!(result.session.status, SessionStatus::Closed);
    assert_eq!(result.session.closed_by.as_deref(), Some("Ms. Rivera"));
    assert_eq!(result.session.end_total, Some(dec("62")));
    assert_eq!(result.session.profit, Some(dec("12")));
    assert!(result.session.closed_at.is_some());

    assert_eq!(result.breakdown.revenue.cash, dec("12"));
    assert_eq!(result.breakdown.revenue.cashapp, dec("8"));
    assert_eq!(result.breakdown.revenue.total, dec("20"));
    assert_eq!(result.breakdown.costs.cogs, dec("8"));
    assert_eq!(result.breakdown.profit, dec("12"));
    assert_eq!(result.breakdown.reimbursement.cogs_owed, dec("8"));

    assert_eq!(result.cash_reconciliation.expected, dec("62"));
    assert_eq!(result.cash_reconciliation.discrepancy, Decimal::ZERO);

    let program = ProgramService::new(pool.clone()).get(program.id).await.unwrap();
    assert_eq!(program.balance, dec("12"));

    let summary = ReimbursementService::new(pool.clone()).summary().await.unwrap();
    assert_eq!(summary.total_cogs_owed, dec("8"));
    assert_eq!(summary.remaining, dec("8"));

    let accounts = CashAccounts::new(pool.clone(), locks.clone())
        .snapshot()
        .await
        .unwrap();
    assert_eq!(accounts.cashapp.balance, dec("8"));
    assert_eq!(accounts.cashbox.balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_short_drawer_reports_discrepancy() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Yearbook").await;
    let water = create_item(&pool, "Water", ItemType::Sellable, Some("2.00")).await;
    buy(&pool, &locks, water.id, "5", "0.50", "2024-09-01").await;

    let session = create_session(&pool, &locks, program.id, fifty()).await;
    sell(&pool, &locks, session.id, water.id, "5", "2.00", PaymentMethod::Cash).await;

    let result = SessionService::new(pool.clone(), locks.clone())
        .close(session.id, close_input("58.75"), ACTOR)
        .await
        .unwrap();

    assert_eq!(result.cash_reconciliation.expected, dec("60"));
    assert_eq!(result.cash_reconciliation.discrepancy, dec("-1.25"));
    assert!(!result.cash_reconciliation.is_balanced());
    // The shortage is reported, not posted
    assert_eq!(result.breakdown.profit, dec("7.50"));
}

#[tokio::test]
async fn test_losing_session_debits_program() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Chess club").await;
    let brownie = create_item(&pool, "Brownie", ItemType::Sellable, Some("1.00")).await;
    buy(&pool, &locks, brownie.id, "2", "1.50", "2024-09-01").await;

    let session = create_session(&pool, &locks, program.id, CashDenominations::default()).await;
    sell(&pool, &locks, session.id, brownie.id, "2", "1.00", PaymentMethod::Cash).await;

    let result = SessionService::new(pool.clone(), locks.clone())
        .close(session.id, close_input("2.00"), ACTOR)
        .await
        .unwrap();

    assert_eq!(result.breakdown.profit, dec("-1"));
    let program = ProgramService::new(pool.clone()).get(program.id).await.unwrap();
    assert_eq!(program.balance, dec("-1"));
}

#[tokio::test]
async fn test_empty_session_posts_no_ledger_entry() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Debate").await;
    let session = create_session(&pool, &locks, program.id, fifty()).await;

    let sessions = SessionService::new(pool.clone(), locks.clone());
    sessions.start(session.id).await.unwrap();
    let result = sessions
        .close(session.id, close_input("50"), ACTOR)
        .await
        .unwrap();

    assert_eq!(result.breakdown.profit, Decimal::ZERO);
    let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reimbursement_entries")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(entries, 0);
}

#[tokio::test]
async fn test_failed_close_rolls_back() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Key club").await;
    let soda = create_item(&pool, "Soda", ItemType::Sellable, Some("2.00")).await;
    buy(&pool, &locks, soda.id, "3", "0.60", "2024-09-01").await;

    let session = create_session(&pool, &locks, program.id, CashDenominations::default()).await;
    sell(&pool, &locks, session.id, soda.id, "3", "2.00", PaymentMethod::Cash).await;

    // Make the program credit fail after the ledger entry is written
    sqlx::query(
        r#"
        CREATE TRIGGER fail_program_credit
        BEFORE UPDATE OF balance ON programs
        BEGIN
            SELECT RAISE(ABORT, 'program ledger unavailable');
        END
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let sessions = SessionService::new(pool.clone(), locks.clone());
    let err = sessions
        .close(session.id, close_input("6.00"), ACTOR)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DatabaseError(_)));

    let session = sessions.get(session.id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Active);
    assert!(session.profit.is_none());

    let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reimbursement_entries")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(entries, 0);

    // Once the fault clears, the same session closes normally
    sqlx::query("DROP TRIGGER fail_program_credit")
        .execute(&pool)
        .await
        .unwrap();
    let result = sessions
        .close(session.id, close_input("6.00"), ACTOR)
        .await
        .unwrap();
    assert_eq!(result.breakdown.reimbursement.cogs_owed, dec("1.80"));
}

// ============================================================================
// Status Rules
// ============================================================================

#[tokio::test]
async fn test_close_requires_active_session() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "FBLA").await;
    let session = create_session(&pool, &locks, program.id, fifty()).await;
    let sessions = SessionService::new(pool.clone(), locks.clone());

    let err = sessions
        .close(session.id, close_input("50"), ACTOR)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));

    sessions.start(session.id).await.unwrap();
    sessions
        .close(session.id, close_input("50"), ACTOR)
        .await
        .unwrap();

    let err = sessions
        .close(session.id, close_input("50"), ACTOR)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));
}

#[tokio::test]
async fn test_cancelled_session_rejects_orders() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Art club").await;
    let chips = create_item(&pool, "Chips", ItemType::Sellable, Some("1.50")).await;
    buy(&pool, &locks, chips.id, "5", "0.50", "2024-09-01").await;

    let sessions = SessionService::new(pool.clone(), locks.clone());
    let session = create_session(&pool, &locks, program.id, fifty()).await;
    let cancelled = sessions.cancel(session.id, ACTOR).await.unwrap();
    assert_eq!(cancelled.status, SessionStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    let err = OrderService::new(pool.clone(), locks.clone())
        .create(
            CreateOrderInput {
                session_id: session.id,
                items: vec![OrderLineInput {
                    menu_item_id: chips.id,
                    quantity: dec("1"),
                    unit_price: dec("1.50"),
                }],
                payment_method: PaymentMethod::Zelle,
                amount_tendered: None,
                discount_amount: Decimal::ZERO,
                is_comp: false,
            },
            ACTOR,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));
    assert_eq!(on_hand(&pool, chips.id).await, dec("5"));

    assert!(matches!(
        sessions.start(session.id).await.unwrap_err(),
        AppError::StateConflict(_)
    ));
    assert!(matches!(
        sessions.cancel(session.id, ACTOR).await.unwrap_err(),
        AppError::StateConflict(_)
    ));
}

#[tokio::test]
async fn test_first_order_starts_session() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Orchestra").await;
    let candy = create_item(&pool, "Candy", ItemType::Sellable, Some("1.00")).await;
    buy(&pool, &locks, candy.id, "5", "0.30", "2024-09-01").await;

    let session = create_session(&pool, &locks, program.id, fifty()).await;
    assert!(session.started_at.is_none());

    sell(&pool, &locks, session.id, candy.id, "1", "1.00", PaymentMethod::Cash).await;

    let session = SessionService::new(pool.clone(), locks.clone())
        .get(session.id)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Active);
    assert!(session.started_at.is_some());
}

#[tokio::test]
async fn test_inactive_program_cannot_open_session() {
    let pool = test_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Old club").await;
    sqlx::query("UPDATE programs SET is_active = 0 WHERE id = ?")
        .bind(program.id)
        .execute(&pool)
        .await
        .unwrap();

    let err = SessionService::new(pool.clone(), locks.clone())
        .create(
            asb_concessions::services::session::CreateSessionInput {
                name: "Homecoming".to_string(),
                program_id: program.id,
                start_denominations: fifty(),
                notes: None,
            },
            ACTOR,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}

// ============================================================================
// Concurrent Writers
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_and_loss_settlement_do_not_collide() {
    let (_dir, pool) = file_pool().await;
    let locks = locks();
    let program = create_program(&pool, "Robotics").await;
    let cookie = create_item(&pool, "Cookie", ItemType::Sellable, Some("2.00")).await;
    buy(&pool, &locks, cookie.id, "10", "0.50", "2024-09-01").await;

    let session = create_session(&pool, &locks, program.id, CashDenominations::default()).await;
    sell(&pool, &locks, session.id, cookie.id, "4", "2.00", PaymentMethod::Cash).await;

    let losses = LossService::new(pool.clone(), locks.clone());
    let mut loss_ids = Vec::new();
    for _ in 0..3 {
        let loss = losses
            .create(
                CreateLossInput {
                    loss_type: LossType::CashDiscrepancy,
                    amount: dec("1.00"),
                    description: None,
                    session_id: None,
                    program_id: Some(program.id),
                    menu_item_id: None,
                },
                ACTOR,
            )
            .await
            .unwrap();
        loss_ids.push(loss.id);
    }

    let sessions = SessionService::new(pool.clone(), locks.clone());
    let close = tokio::spawn(async move { sessions.close(session.id, close_input("8.00"), ACTOR).await });
    let settles: Vec<_> = loss_ids
        .into_iter()
        .map(|id| {
            let losses = losses.clone();
            tokio::spawn(async move {
                losses
                    .settle(
                        id,
                        SettleLossInput {
                            settled_against: SettlementTarget::Program,
                            program_id: None,
                        },
                        ACTOR,
                    )
                    .await
            })
        })
        .collect();

    let closed = close.await.unwrap().unwrap();
    assert_eq!(closed.breakdown.profit, dec("6"));
    for handle in settles {
        assert!(handle.await.unwrap().is_ok());
    }

    // Profit 6 credited, three 1.00 losses debited
    let program = ProgramService::new(pool.clone()).get(program.id).await.unwrap();
    assert_eq!(program.balance, dec("3"));
}
