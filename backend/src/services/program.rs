//! Student programs and their balances

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::money::{money_to_f64, round_money, to_decimal};
use shared::validation::validate_not_blank;
use shared::Program;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Program service
#[derive(Clone)]
pub struct ProgramService {
    db: SqlitePool,
}

/// Input for creating a program
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProgramInput {
    #[validate(custom = "validate_not_blank")]
    pub name: String,
    pub description: Option<String>,
}

/// Input for updating a program
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgramInput {
    #[validate(custom = "validate_not_blank")]
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, FromRow)]
struct ProgramRow {
    id: i64,
    name: String,
    description: Option<String>,
    balance: f64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProgramRow> for Program {
    fn from(row: ProgramRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            balance: to_decimal(row.balance),
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(crate) async fn load_program(conn: &mut SqliteConnection, id: i64) -> AppResult<Program> {
    let row = sqlx::query_as::<_, ProgramRow>(
        "SELECT id, name, description, balance, is_active, created_at, updated_at FROM programs WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(format!("Program {}", id)))?;

    Ok(row.into())
}

/// Add `delta` to a program's balance; returns the new balance
///
/// A single `UPDATE` so the read and write cannot interleave with
/// another writer.
pub async fn adjust_balance(conn: &mut SqliteConnection, program_id: i64, delta: Decimal) -> AppResult<Decimal> {
    let balance = sqlx::query_scalar::<_, f64>(
        r#"
        UPDATE programs SET
            balance = ROUND(balance + ?, 2),
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ?
        RETURNING balance
        "#,
    )
    .bind(money_to_f64(round_money(delta)))
    .bind(program_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(format!("Program {}", program_id)))?;

    let balance = to_decimal(balance);
    tracing::debug!(program_id, delta = %delta, balance = %balance, "Program balance adjusted");
    Ok(balance)
}

impl ProgramService {
    /// Create a new ProgramService instance
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a program with a zero balance
    pub async fn create(&self, input: CreateProgramInput) -> AppResult<Program> {
        input.validate()?;

        let name = input.name.trim();
        let taken = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM programs WHERE name = ?)")
            .bind(name)
            .fetch_one(&self.db)
            .await?;
        if taken {
            return Err(AppError::validation("name", format!("Program '{}' already exists", name)));
        }

        let row = sqlx::query_as::<_, ProgramRow>(
            r#"
            INSERT INTO programs (name, description)
            VALUES (?, ?)
            RETURNING id, name, description, balance, is_active, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(&input.description)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(program_id = row.id, "Program created");
        Ok(row.into())
    }

    /// Get a program by id
    pub async fn get(&self, id: i64) -> AppResult<Program> {
        let mut conn = self.db.acquire().await?;
        load_program(&mut conn, id).await
    }

    /// List programs
    pub async fn list(&self, include_inactive: bool) -> AppResult<Vec<Program>> {
        let rows = sqlx::query_as::<_, ProgramRow>(
            r#"
            SELECT id, name, description, balance, is_active, created_at, updated_at
            FROM programs
            WHERE (? OR is_active = 1)
            ORDER BY name
            "#,
        )
        .bind(include_inactive)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Update a program's name, description or active flag
    pub async fn update(&self, id: i64, input: UpdateProgramInput) -> AppResult<Program> {
        input.validate()?;

        let row = sqlx::query_as::<_, ProgramRow>(
            r#"
            UPDATE programs SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                is_active = COALESCE(?, is_active),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?
            RETURNING id, name, description, balance, is_active, created_at, updated_at
            "#,
        )
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.description)
        .bind(input.is_active)
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Program {}", id)))?;

        Ok(row.into())
    }
}
