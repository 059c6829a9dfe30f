use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CallbackEvidence, Deposit, DepositId, NewDeposit, OrderId},
    traits::DepositGatewayError,
};

/// Inserts the deposit into the database, returning `false` in the second element if a deposit
/// with the same merchant order id already exists.
pub async fn idempotent_insert(
    deposit: NewDeposit,
    conn: &mut SqliteConnection,
) -> Result<(Deposit, bool), DepositGatewayError> {
    let inserted = match fetch_deposit_by_order_id(&deposit.order_id, conn).await? {
        Some(deposit) => (deposit, false),
        None => {
            let deposit = insert_deposit(deposit, conn).await?;
            debug!("📝️ Deposit [{}] inserted with id {}", deposit.deposit_id, deposit.id);
            (deposit, true)
        },
    };
    Ok(inserted)
}

/// Inserts a new deposit using the given connection. This is not atomic on its own. You can embed
/// this call inside a transaction if you need atomicity, and pass `&mut *tx` as the connection
/// argument.
async fn insert_deposit(deposit: NewDeposit, conn: &mut SqliteConnection) -> Result<Deposit, DepositGatewayError> {
    let order_id = deposit.order_id.clone();
    let deposit = sqlx::query_as(
        r#"
            INSERT INTO deposits (
                deposit_id,
                account_id,
                order_id,
                cregis_id,
                requested_amount,
                currency,
                deposit_address,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(deposit.deposit_id)
    .bind(deposit.account_id)
    .bind(deposit.order_id)
    .bind(deposit.cregis_id)
    .bind(deposit.requested_amount.value())
    .bind(deposit.currency)
    .bind(deposit.deposit_address)
    .bind(deposit.expires_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            DepositGatewayError::DepositAlreadyExists(order_id)
        },
        _ => DepositGatewayError::from(e),
    })?;
    Ok(deposit)
}

/// Returns the deposit for the corresponding merchant `order_id`.
pub async fn fetch_deposit_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Deposit>, sqlx::Error> {
    let deposit = sqlx::query_as("SELECT * FROM deposits WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(deposit)
}

/// Returns the deposit for the corresponding public `deposit_id`.
pub async fn fetch_deposit_by_deposit_id(
    deposit_id: &DepositId,
    conn: &mut SqliteConnection,
) -> Result<Option<Deposit>, sqlx::Error> {
    let deposit = sqlx::query_as("SELECT * FROM deposits WHERE deposit_id = $1")
        .bind(deposit_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(deposit)
}

/// Returns the deposit matching the given external reference on either the gateway-assigned
/// `cregis_id` or the merchant `order_id`. If the reference matches different deposits on the two
/// columns, the one matching `cregis_id` is returned.
pub async fn fetch_deposit_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Deposit>, sqlx::Error> {
    let deposit =
        sqlx::query_as("SELECT * FROM deposits WHERE cregis_id = $1 OR order_id = $1 ORDER BY (cregis_id = $1) DESC LIMIT 1")
            .bind(reference)
            .fetch_optional(conn)
            .await?;
    Ok(deposit)
}

/// Conditionally transitions a `Pending` deposit to `Approved`, stamping `approved_at` and
/// persisting the callback-derived fields. Returns `None` if the deposit is not currently
/// `Pending` (a concurrent or duplicate delivery got there first).
pub(crate) async fn approve(
    deposit_id: &DepositId,
    evidence: &CallbackEvidence,
    conn: &mut SqliteConnection,
) -> Result<Option<Deposit>, DepositGatewayError> {
    let result = sqlx::query_as(
        r#"
            UPDATE deposits SET
                status = 'Approved',
                approved_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP,
                received_amount = $2,
                tx_hash = $3,
                from_address = $4,
                to_address = $5
            WHERE deposit_id = $1 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(deposit_id.as_str())
    .bind(evidence.received_amount.map(|a| a.value()))
    .bind(evidence.tx_hash.as_deref())
    .bind(evidence.from_address.as_deref())
    .bind(evidence.to_address.as_deref())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Conditionally transitions a `Pending` deposit to `Rejected`, stamping `rejected_at` and
/// persisting the callback-derived fields. Returns `None` if the deposit is not currently
/// `Pending`.
pub(crate) async fn reject(
    deposit_id: &DepositId,
    evidence: &CallbackEvidence,
    conn: &mut SqliteConnection,
) -> Result<Option<Deposit>, DepositGatewayError> {
    let result = sqlx::query_as(
        r#"
            UPDATE deposits SET
                status = 'Rejected',
                rejected_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP,
                received_amount = $2,
                tx_hash = $3,
                from_address = $4,
                to_address = $5
            WHERE deposit_id = $1 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(deposit_id.as_str())
    .bind(evidence.received_amount.map(|a| a.value()))
    .bind(evidence.tx_hash.as_deref())
    .bind(evidence.from_address.as_deref())
    .bind(evidence.to_address.as_deref())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Conditionally transitions an `Approved` deposit to `Completed`, stamping `processed_at`.
/// Returns `None` if the deposit is not currently `Approved`.
pub(crate) async fn complete(
    deposit_id: &DepositId,
    conn: &mut SqliteConnection,
) -> Result<Option<Deposit>, DepositGatewayError> {
    let result = sqlx::query_as(
        r#"
            UPDATE deposits SET
                status = 'Completed',
                processed_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE deposit_id = $1 AND status = 'Approved'
            RETURNING *;
        "#,
    )
    .bind(deposit_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}
