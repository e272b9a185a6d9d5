//! # Ticket Batches
//!
//! Durable records of raffle-number reservations. A batch is owned by exactly one user for
//! its whole life and is never deleted.
//!
//! - `create` always starts a batch as [`BatchStatus::Owed`]
//! - `set_status` reports the affected row count, 0 meaning no such batch
//! - Listings come back in insertion order
use rust_decimal::Decimal;
use sqlx::{FromRow, SqlitePool};

use crate::{
    error::AppError,
    models::{BatchWithOwner, TicketBatch},
    payments::BatchStatus,
};

#[derive(FromRow)]
struct BatchRow {
    id: i64,
    owner_id: i64,
    numbers: String,
    total_amount: String,
    status: String,
    payment_proof_ref: Option<String>,
}

#[derive(FromRow)]
struct BatchOwnerRow {
    #[sqlx(flatten)]
    batch: BatchRow,
    owner_name: String,
}

impl TryFrom<BatchRow> for TicketBatch {
    type Error = AppError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        let numbers = serde_json::from_str(&row.numbers).map_err(corrupt)?;
        let total_amount = row.total_amount.parse::<Decimal>().map_err(corrupt)?;

        Ok(TicketBatch {
            id: row.id,
            owner_id: row.owner_id,
            numbers,
            total_amount,
            status: row.status.parse()?,
            payment_proof_ref: row.payment_proof_ref,
        })
    }
}

fn corrupt<E>(e: E) -> AppError
where
    E: std::error::Error + Send + Sync + 'static,
{
    AppError::InternalError(Box::new(e))
}

/// Checks the amount is a non-negative whole number of cents and pins the scale, so `15`
/// is stored as `15.00`. Never rounds.
pub fn normalize_amount(amount: Decimal) -> Result<Decimal, AppError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AppError::validation("Total amount cannot be negative"));
    }

    if amount.normalize().scale() > 2 {
        return Err(AppError::validation("Total amount must have at most two decimals"));
    }

    let mut amount = amount.normalize();
    amount.rescale(2);
    Ok(amount)
}

pub async fn create(
    pool: &SqlitePool,
    owner_id: i64,
    numbers: &[u32],
    total_amount: Decimal,
) -> Result<i64, AppError> {
    if numbers.is_empty() {
        return Err(AppError::validation("At least one number is required"));
    }

    let total_amount = normalize_amount(total_amount)?;

    let owner: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

    if owner.is_none() {
        return Err(AppError::validation(format!("Unknown owner: {owner_id}")));
    }

    let numbers = serde_json::to_string(numbers).map_err(corrupt)?;

    let result = sqlx::query(
        "INSERT INTO ticket_batches (owner_id, numbers, total_amount, status) VALUES (?, ?, ?, ?)",
    )
    .bind(owner_id)
    .bind(numbers)
    .bind(total_amount.to_string())
    .bind(BatchStatus::Owed.as_str())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get(pool: &SqlitePool, batch_id: i64) -> Result<TicketBatch, AppError> {
    sqlx::query_as::<_, BatchRow>(
        "SELECT id, owner_id, numbers, total_amount, status, payment_proof_ref
         FROM ticket_batches WHERE id = ?",
    )
    .bind(batch_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Ticket batch"))?
    .try_into()
}

pub async fn list_by_owner(pool: &SqlitePool, owner_id: i64) -> Result<Vec<TicketBatch>, AppError> {
    sqlx::query_as::<_, BatchRow>(
        "SELECT id, owner_id, numbers, total_amount, status, payment_proof_ref
         FROM ticket_batches WHERE owner_id = ? ORDER BY id",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(TicketBatch::try_from)
    .collect()
}

/// Inner join, so a batch whose owner row is gone would not show up.
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<BatchWithOwner>, AppError> {
    sqlx::query_as::<_, BatchOwnerRow>(
        "SELECT b.id, b.owner_id, b.numbers, b.total_amount, b.status, b.payment_proof_ref,
                u.name AS owner_name
         FROM ticket_batches b
         JOIN users u ON b.owner_id = u.id
         ORDER BY b.id",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| -> Result<BatchWithOwner, AppError> {
        Ok(BatchWithOwner {
            batch: row.batch.try_into()?,
            owner_name: row.owner_name,
        })
    })
    .collect()
}

pub async fn set_status(
    pool: &SqlitePool,
    batch_id: i64,
    status: BatchStatus,
    proof_ref: Option<&str>,
) -> Result<u64, AppError> {
    let result = match proof_ref {
        Some(proof_ref) => {
            sqlx::query("UPDATE ticket_batches SET status = ?, payment_proof_ref = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(proof_ref)
                .bind(batch_id)
                .execute(pool)
                .await?
        }
        None => {
            sqlx::query("UPDATE ticket_batches SET status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(batch_id)
                .execute(pool)
                .await?
        }
    };

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::{create, get, list_all, list_by_owner, normalize_amount, set_status};
    use crate::{
        database::{memory_pool, seed_user},
        error::AppError,
        payments::BatchStatus,
    };

    fn amount(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_normalize_amount() {
        assert_eq!(normalize_amount(amount("15")).unwrap().to_string(), "15.00");
        assert_eq!(normalize_amount(amount("2.5")).unwrap().to_string(), "2.50");
        assert_eq!(normalize_amount(amount("3.1000")).unwrap().to_string(), "3.10");
        assert!(matches!(normalize_amount(amount("1.005")), Err(AppError::Validation(_))));
        assert!(matches!(normalize_amount(amount("-1")), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_never_rounds_amounts() {
        let pool = memory_pool().await;
        seed_user(&pool, 1, "Ana", "player").await;

        let result = create(&pool, 1, &[1], amount("1.005")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(list_by_owner(&pool, 1).await.unwrap().is_empty());

        let id = create(&pool, 1, &[1], amount("15")).await.unwrap();
        let stored = get(&pool, id).await.unwrap().total_amount;

        assert_eq!(stored, amount("15"));
        assert_eq!(stored.to_string(), "15.00");
    }

    #[tokio::test]
    async fn test_create_round_trip() {
        let pool = memory_pool().await;
        seed_user(&pool, 42, "Ana", "player").await;

        let id = create(&pool, 42, &[3, 7, 21], amount("15.00")).await.unwrap();
        let batch = get(&pool, id).await.unwrap();

        assert_eq!(batch.owner_id, 42);
        assert_eq!(batch.numbers, vec![3, 7, 21]);
        assert_eq!(batch.total_amount, amount("15.00"));
        assert_eq!(batch.status, BatchStatus::Owed);
        assert_eq!(batch.payment_proof_ref, None);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_numbers() {
        let pool = memory_pool().await;
        seed_user(&pool, 1, "Ana", "player").await;

        let result = create(&pool, 1, &[], amount("5")).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_owner() {
        let pool = memory_pool().await;

        let result = create(&pool, 99, &[1], amount("5")).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(list_all(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let pool = memory_pool().await;

        assert!(matches!(get(&pool, 7).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_by_owner_only_returns_own_batches() {
        let pool = memory_pool().await;
        seed_user(&pool, 1, "Ana", "player").await;
        seed_user(&pool, 2, "Luis", "player").await;

        let first = create(&pool, 1, &[1, 2], amount("10")).await.unwrap();
        create(&pool, 2, &[3], amount("5")).await.unwrap();
        let second = create(&pool, 1, &[4], amount("5")).await.unwrap();

        let batches = list_by_owner(&pool, 1).await.unwrap();
        let ids: Vec<i64> = batches.iter().map(|b| b.id).collect();

        assert_eq!(ids, vec![first, second]);
        assert!(batches.iter().all(|b| b.owner_id == 1));
        assert!(list_by_owner(&pool, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_all_attaches_owner_names() {
        let pool = memory_pool().await;
        seed_user(&pool, 1, "Ana", "player").await;
        seed_user(&pool, 2, "Luis", "player").await;

        create(&pool, 1, &[1], amount("5")).await.unwrap();
        create(&pool, 2, &[2], amount("5")).await.unwrap();
        create(&pool, 2, &[3], amount("5")).await.unwrap();

        let rows = list_all(&pool).await.unwrap();
        let names: Vec<(i64, &str)> = rows
            .iter()
            .map(|r| (r.batch.owner_id, r.owner_name.as_str()))
            .collect();

        assert_eq!(names, vec![(1, "Ana"), (2, "Luis"), (2, "Luis")]);
    }

    #[tokio::test]
    async fn test_set_status() {
        let pool = memory_pool().await;
        seed_user(&pool, 1, "Ana", "player").await;
        let id = create(&pool, 1, &[9], amount("5")).await.unwrap();

        assert_eq!(set_status(&pool, 12345, BatchStatus::Cancelled, None).await.unwrap(), 0);
        assert_eq!(
            set_status(&pool, id, BatchStatus::Cancelled, Some("proof_1.png")).await.unwrap(),
            1
        );

        let batch = get(&pool, id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Cancelled);
        assert_eq!(batch.payment_proof_ref.as_deref(), Some("proof_1.png"));
    }
}
