//! `SqliteDatabase` is a concrete storage backend for the CRM payment engine.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the [`DepositGatewayDatabase`]
//! trait. Every state transition is a conditional update (`UPDATE … WHERE status = …`), so
//! concurrent callback deliveries for the same deposit serialize at the storage layer, not behind
//! an in-process lock.
use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;

use super::db::{deposits, ledger, new_pool};
use crate::{
    db_types::{CallbackEvidence, Deposit, DepositId, LedgerTransaction, NewDeposit},
    traits::{DepositGatewayDatabase, DepositGatewayError, TransitionOutcome},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl DepositGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_deposit(&self, deposit: NewDeposit) -> Result<(Deposit, bool), DepositGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let (deposit, inserted) = deposits::idempotent_insert(deposit, &mut conn).await?;
        if inserted {
            debug!("🗃️ Deposit [{}] for account {} has been saved", deposit.deposit_id, deposit.account_id);
        }
        Ok((deposit, inserted))
    }

    async fn fetch_deposit_by_reference(&self, reference: &str) -> Result<Option<Deposit>, DepositGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let deposit = deposits::fetch_deposit_by_reference(reference, &mut conn).await?;
        Ok(deposit)
    }

    async fn fetch_deposit(&self, deposit_id: &DepositId) -> Result<Option<Deposit>, DepositGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let deposit = deposits::fetch_deposit_by_deposit_id(deposit_id, &mut conn).await?;
        Ok(deposit)
    }

    /// In a single atomic transaction:
    /// * the deposit is conditionally moved from `Pending` to `Approved`, and
    /// * its ledger transaction is created (or fetched, if a previous delivery created it) with
    ///   the crediting marker `InFlight`.
    ///
    /// If the conditional update does not take effect, the current row is returned unchanged so
    /// the caller can classify the delivery as duplicate or conflicting.
    async fn approve_deposit(
        &self,
        deposit_id: &DepositId,
        evidence: &CallbackEvidence,
    ) -> Result<TransitionOutcome, DepositGatewayError> {
        let mut tx = self.pool.begin().await?;
        match deposits::approve(deposit_id, evidence, &mut tx).await? {
            Some(deposit) => {
                let amount = evidence.received_amount.unwrap_or(deposit.requested_amount);
                let entry = ledger::upsert_for_deposit(&deposit, amount, &mut tx).await?;
                tx.commit().await?;
                debug!(
                    "🗃️ Deposit [{}] approved. Ledger transaction #{} of {} {} is {}",
                    deposit.deposit_id, entry.id, entry.amount, entry.currency, entry.crediting
                );
                Ok(TransitionOutcome::Applied(deposit))
            },
            None => {
                let current = deposits::fetch_deposit_by_deposit_id(deposit_id, &mut tx)
                    .await?
                    .ok_or_else(|| DepositGatewayError::DepositNotFound(deposit_id.clone()))?;
                tx.commit().await?;
                trace!("🗃️ Deposit [{deposit_id}] not approved; it is already {}", current.status);
                Ok(TransitionOutcome::Unchanged(current))
            },
        }
    }

    async fn reject_deposit(
        &self,
        deposit_id: &DepositId,
        evidence: &CallbackEvidence,
    ) -> Result<TransitionOutcome, DepositGatewayError> {
        let mut conn = self.pool.acquire().await?;
        match deposits::reject(deposit_id, evidence, &mut conn).await? {
            Some(deposit) => {
                debug!("🗃️ Deposit [{}] rejected at {:?}", deposit.deposit_id, deposit.rejected_at);
                Ok(TransitionOutcome::Applied(deposit))
            },
            None => {
                let current = deposits::fetch_deposit_by_deposit_id(deposit_id, &mut conn)
                    .await?
                    .ok_or_else(|| DepositGatewayError::DepositNotFound(deposit_id.clone()))?;
                trace!("🗃️ Deposit [{deposit_id}] not rejected; it is already {}", current.status);
                Ok(TransitionOutcome::Unchanged(current))
            },
        }
    }

    /// In a single atomic transaction, the ledger's crediting marker is conditionally moved to
    /// `Done` (stamping `credited_at`) and the deposit is conditionally moved from `Approved` to
    /// `Completed` (stamping `processed_at`). Either both writes land or neither does.
    async fn complete_deposit(&self, deposit_id: &DepositId) -> Result<TransitionOutcome, DepositGatewayError> {
        let mut tx = self.pool.begin().await?;
        let entry = ledger::mark_credited(deposit_id, &mut tx).await?;
        match deposits::complete(deposit_id, &mut tx).await? {
            Some(deposit) => {
                tx.commit().await?;
                match entry {
                    Some(entry) => debug!(
                        "🗃️ Deposit [{}] completed. {} {} credited to account {}",
                        deposit.deposit_id, entry.amount, entry.currency, entry.account_id
                    ),
                    None => warn!(
                        "🗃️ Deposit [{}] completed, but its crediting marker was already Done. A previous \
                         completion attempt must have been interrupted.",
                        deposit.deposit_id
                    ),
                }
                Ok(TransitionOutcome::Applied(deposit))
            },
            None => {
                let current = deposits::fetch_deposit_by_deposit_id(deposit_id, &mut tx)
                    .await?
                    .ok_or_else(|| DepositGatewayError::DepositNotFound(deposit_id.clone()))?;
                // Nothing to commit: the marker CAS and the status CAS both found their work
                // already done (or the deposit never reached Approved).
                tx.rollback().await?;
                trace!("🗃️ Deposit [{deposit_id}] not completed; it is {}", current.status);
                Ok(TransitionOutcome::Unchanged(current))
            },
        }
    }

    async fn fetch_ledger_for_deposit(
        &self,
        deposit_id: &DepositId,
    ) -> Result<Option<LedgerTransaction>, DepositGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let entry = ledger::fetch_for_deposit(deposit_id, &mut conn).await?;
        Ok(entry)
    }

    async fn close(&mut self) -> Result<(), DepositGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}
