use crm_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Deposit, DepositId, LedgerTransaction, WEBHOOK_ACTOR},
    traits::DepositGatewayError,
};

/// Creates the ledger transaction for a deposit, or returns the existing one. The UNIQUE
/// constraint on `deposit_id` makes this an idempotent upsert: a second insert for the same
/// deposit leaves the original row (and in particular its crediting marker) untouched.
pub async fn upsert_for_deposit(
    deposit: &Deposit,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<LedgerTransaction, DepositGatewayError> {
    let ledger = sqlx::query_as(
        r#"
            INSERT INTO ledger_transactions (deposit_id, account_id, amount, currency, status, tx_hash, credited_by)
            VALUES ($1, $2, $3, $4, 'Approved', $5, $6)
            ON CONFLICT (deposit_id) DO UPDATE SET updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(deposit.deposit_id.as_str())
    .bind(deposit.account_id.as_str())
    .bind(amount.value())
    .bind(deposit.currency.as_str())
    .bind(deposit.tx_hash.as_deref())
    .bind(WEBHOOK_ACTOR)
    .fetch_one(conn)
    .await?;
    Ok(ledger)
}

/// Conditionally marks the crediting side effect as delivered: the marker moves to `Done`, the
/// ledger status mirrors `Completed` and `credited_at` is stamped. Returns `None` if no ledger
/// row exists for the deposit or the marker was already `Done`.
pub(crate) async fn mark_credited(
    deposit_id: &DepositId,
    conn: &mut SqliteConnection,
) -> Result<Option<LedgerTransaction>, DepositGatewayError> {
    let result = sqlx::query_as(
        r#"
            UPDATE ledger_transactions SET
                crediting = 'Done',
                status = 'Completed',
                credited_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE deposit_id = $1 AND crediting <> 'Done'
            RETURNING *;
        "#,
    )
    .bind(deposit_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Fetches the ledger transaction for the given deposit, if any.
pub async fn fetch_for_deposit(
    deposit_id: &DepositId,
    conn: &mut SqliteConnection,
) -> Result<Option<LedgerTransaction>, DepositGatewayError> {
    let ledger = sqlx::query_as("SELECT * FROM ledger_transactions WHERE deposit_id = $1")
        .bind(deposit_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(ledger)
}
