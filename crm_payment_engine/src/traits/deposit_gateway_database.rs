use thiserror::Error;

use crate::db_types::{CallbackEvidence, Deposit, DepositId, LedgerTransaction, NewDeposit, OrderId};

/// The result of a conditional (compare-and-swap) state transition.
///
/// `Applied` carries the freshly updated record. `Unchanged` carries the row as it currently
/// stands: either the transition had already happened (a duplicate delivery) or the row is in a
/// conflicting terminal state. Callers classify the two cases from the returned record; the
/// database never overwrites a state it was not asked to start from.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied(Deposit),
    Unchanged(Deposit),
}

impl TransitionOutcome {
    pub fn deposit(&self) -> &Deposit {
        match self {
            TransitionOutcome::Applied(d) | TransitionOutcome::Unchanged(d) => d,
        }
    }
}

/// This trait defines the storage behaviour required by the deposit reconciliation engine.
///
/// All mutation of deposit state, the transition timestamps and the crediting marker goes through
/// this contract; no other code path may write those fields. Every transition method is a
/// storage-level conditional update (the service runs as multiple replicas, so in-process locks
/// are not an option): the update only takes effect if the row is still in the expected starting
/// state, and the loser of a concurrent race gets `TransitionOutcome::Unchanged` back.
#[allow(async_fn_in_trait)]
pub trait DepositGatewayDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Stores a new deposit intent, as handed over by the (out-of-scope) creation path.
    /// This call is idempotent on the merchant order id.
    /// Returns `false` in the second element if the deposit already existed.
    async fn insert_deposit(&self, deposit: NewDeposit) -> Result<(Deposit, bool), DepositGatewayError>;

    /// Fetches a deposit by either of its external correlation ids (the gateway-assigned
    /// `cregis_id` or the merchant `order_id`). If the reference matches different deposits on the
    /// two columns, the `cregis_id` match wins.
    async fn fetch_deposit_by_reference(&self, reference: &str) -> Result<Option<Deposit>, DepositGatewayError>;

    /// Fetches a deposit by its public deposit id.
    async fn fetch_deposit(&self, deposit_id: &DepositId) -> Result<Option<Deposit>, DepositGatewayError>;

    /// Conditionally moves a `Pending` deposit to `Approved`, and in the same atomic transaction,
    /// creates the deposit's ledger transaction (idempotent upsert keyed by deposit id) with the
    /// crediting marker `InFlight`.
    ///
    /// Stamps `approved_at` and persists the callback-derived fields exactly once. The ledger
    /// amount is the received amount when the callback carried one, the requested amount
    /// otherwise.
    async fn approve_deposit(
        &self,
        deposit_id: &DepositId,
        evidence: &CallbackEvidence,
    ) -> Result<TransitionOutcome, DepositGatewayError>;

    /// Conditionally moves a `Pending` deposit to `Rejected`, stamping `rejected_at` and
    /// persisting the callback-derived fields. No ledger transaction is created.
    async fn reject_deposit(
        &self,
        deposit_id: &DepositId,
        evidence: &CallbackEvidence,
    ) -> Result<TransitionOutcome, DepositGatewayError>;

    /// Conditionally moves an `Approved` deposit to `Completed` after a confirmed balance credit.
    /// In the same atomic transaction the ledger row is marked `Done` / `Completed` and
    /// `credited_at` / `processed_at` are stamped.
    async fn complete_deposit(&self, deposit_id: &DepositId) -> Result<TransitionOutcome, DepositGatewayError>;

    /// Fetches the ledger transaction for a deposit, if one has been created.
    async fn fetch_ledger_for_deposit(
        &self,
        deposit_id: &DepositId,
    ) -> Result<Option<LedgerTransaction>, DepositGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), DepositGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum DepositGatewayError {
    #[error("We have an internal database error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Cannot insert deposit, since it already exists with order id {0}")]
    DepositAlreadyExists(OrderId),
    #[error("The requested deposit {0} does not exist")]
    DepositNotFound(DepositId),
    #[error("Deposit {0} has no ledger transaction, but one should have been created on approval")]
    LedgerMissing(DepositId),
}

impl From<sqlx::Error> for DepositGatewayError {
    fn from(e: sqlx::Error) -> Self {
        DepositGatewayError::DatabaseError(e.to_string())
    }
}
