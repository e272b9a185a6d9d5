//! # Payments
//!
//! A batch has two states. `Owed` is where every batch starts, `Cancelled` means the
//! payment has been settled. The stored labels are kept as they are so existing rows stay
//! readable.
//!
//! ```text
//!            admin settle / proof intake
//!   Owed  ───────────────────────────────▶  Cancelled ─┐
//!                                              ▲       │ settle again: no-op
//!                                              └───────┘ proof again: replaces the image,
//!                                                        old file deleted
//! ```
//!
//! Nothing here checks amounts or double submissions, the caller is trusted. Two concurrent
//! settles both succeed and write the same terminal value.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::{batches, error::AppError, models::TicketBatch, uploads::ProofStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Owed,
    /// Settled.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    AdminSettle,
    ProofIntake,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Owed => "Owed",
            BatchStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_settled(self) -> bool {
        self == BatchStatus::Cancelled
    }

    pub fn apply(self, event: PaymentEvent) -> BatchStatus {
        match (self, event) {
            (BatchStatus::Owed, PaymentEvent::AdminSettle | PaymentEvent::ProofIntake) => {
                BatchStatus::Cancelled
            }
            (BatchStatus::Cancelled, _) => BatchStatus::Cancelled,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Owed" => Ok(BatchStatus::Owed),
            "Cancelled" => Ok(BatchStatus::Cancelled),
            other => Err(AppError::InternalError(
                format!("Unknown batch status: {other}").into(),
            )),
        }
    }
}

/// Administrative settle, no proof needed. Settling an already settled batch succeeds
/// without touching the row.
pub async fn settle(pool: &SqlitePool, batch_id: i64) -> Result<TicketBatch, AppError> {
    let batch = batches::get(pool, batch_id).await?;

    if batch.status.is_settled() {
        debug!("Batch {batch_id} already {}, nothing to do", batch.status);
        return Ok(batch);
    }

    let next = batch.status.apply(PaymentEvent::AdminSettle);

    if batches::set_status(pool, batch_id, next, None).await? == 0 {
        return Err(AppError::NotFound("Ticket batch"));
    }

    info!("Batch {batch_id} settled by administrator");

    Ok(TicketBatch {
        status: next,
        ..batch
    })
}

/// Stores the proof image, then records it on the batch while settling it. The file is
/// removed again if the record cannot be updated, and nothing is written at all for an
/// unknown batch. A proof it replaces is removed once the new one is recorded.
pub async fn intake(
    pool: &SqlitePool,
    proofs: &ProofStore,
    batch_id: i64,
    original_name: Option<&str>,
    bytes: &[u8],
) -> Result<String, AppError> {
    let batch = batches::get(pool, batch_id).await?;
    let next = batch.status.apply(PaymentEvent::ProofIntake);

    let name = proofs.save(original_name, bytes).await?;

    match batches::set_status(pool, batch_id, next, Some(&name)).await {
        Ok(0) => {
            proofs.remove(&name).await;
            Err(AppError::NotFound("Ticket batch"))
        }
        Ok(_) => {
            info!("Batch {batch_id} settled with proof {name}");

            if let Some(previous) = batch.payment_proof_ref.filter(|previous| *previous != name) {
                proofs.remove(&previous).await;
            }

            Ok(name)
        }
        Err(e) => {
            proofs.remove(&name).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::{BatchStatus, PaymentEvent, intake, settle};
    use crate::{
        batches,
        database::{memory_pool, seed_user},
        error::AppError,
        uploads::ProofStore,
    };

    #[test]
    fn test_transitions() {
        use BatchStatus::*;
        use PaymentEvent::*;

        assert_eq!(Owed.apply(AdminSettle), Cancelled);
        assert_eq!(Owed.apply(ProofIntake), Cancelled);
        assert_eq!(Cancelled.apply(AdminSettle), Cancelled);
        assert_eq!(Cancelled.apply(ProofIntake), Cancelled);
        assert!(!Owed.is_settled());
        assert!(Cancelled.is_settled());
    }

    #[test]
    fn test_status_labels() {
        for status in [BatchStatus::Owed, BatchStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<BatchStatus>().unwrap(), status);
        }

        assert!("Paid".parse::<BatchStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&BatchStatus::Cancelled).unwrap(),
            "\"Cancelled\""
        );
    }

    #[tokio::test]
    async fn test_reserve_then_settle_twice() {
        let pool = memory_pool().await;
        seed_user(&pool, 42, "Ana", "player").await;

        let amount = Decimal::from_str("15.00").unwrap();
        batches::create(&pool, 42, &[3, 7, 21], amount).await.unwrap();

        let listed = batches::list_by_owner(&pool, 42).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, BatchStatus::Owed);
        assert_eq!(listed[0].numbers, vec![3, 7, 21]);

        let id = listed[0].id;
        assert_eq!(settle(&pool, id).await.unwrap().status, BatchStatus::Cancelled);
        assert_eq!(settle(&pool, id).await.unwrap().status, BatchStatus::Cancelled);

        let batch = batches::get(&pool, id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Cancelled);
        assert_eq!(batch.payment_proof_ref, None);
    }

    #[tokio::test]
    async fn test_settle_missing_batch() {
        let pool = memory_pool().await;

        for _ in 0..2 {
            assert!(matches!(settle(&pool, 404).await, Err(AppError::NotFound(_))));
        }
    }

    #[tokio::test]
    async fn test_intake_attaches_proof() {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let proofs = ProofStore::open(dir.path()).await.unwrap();
        seed_user(&pool, 1, "Ana", "player").await;
        let id = batches::create(&pool, 1, &[5], Decimal::from(5)).await.unwrap();

        let name = intake(&pool, &proofs, id, Some("pago.png"), b"png").await.unwrap();

        let batch = batches::get(&pool, id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Cancelled);
        assert_eq!(batch.payment_proof_ref.as_deref(), Some(name.as_str()));
        assert!(dir.path().join(&name).exists());
    }

    #[tokio::test]
    async fn test_intake_removes_file_when_update_fails() {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let proofs = ProofStore::open(dir.path()).await.unwrap();
        seed_user(&pool, 1, "Ana", "player").await;
        let id = batches::create(&pool, 1, &[5], Decimal::from(5)).await.unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_updates BEFORE UPDATE ON ticket_batches
             BEGIN SELECT RAISE(ABORT, 'updates disabled'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = intake(&pool, &proofs, id, Some("pago.png"), b"png").await;

        assert!(matches!(result, Err(AppError::Storage(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let batch = batches::get(&pool, id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Owed);
        assert_eq!(batch.payment_proof_ref, None);
    }

    #[tokio::test]
    async fn test_intake_again_replaces_previous_file() {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let proofs = ProofStore::open(dir.path()).await.unwrap();
        seed_user(&pool, 1, "Ana", "player").await;
        let id = batches::create(&pool, 1, &[5], Decimal::from(5)).await.unwrap();

        let first = intake(&pool, &proofs, id, Some("first.png"), b"one").await.unwrap();
        let second = intake(&pool, &proofs, id, Some("second.jpg"), b"two").await.unwrap();

        let files: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();

        assert_eq!(files, vec![second.clone()]);
        assert!(!dir.path().join(&first).exists());

        let batch = batches::get(&pool, id).await.unwrap();
        assert_eq!(batch.payment_proof_ref, Some(second));
        assert_eq!(batch.status, BatchStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_intake_missing_batch_leaves_no_file() {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let proofs = ProofStore::open(dir.path()).await.unwrap();

        for _ in 0..2 {
            let result = intake(&pool, &proofs, 77, Some("pago.png"), b"png").await;
            assert!(matches!(result, Err(AppError::NotFound(_))));
        }

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
