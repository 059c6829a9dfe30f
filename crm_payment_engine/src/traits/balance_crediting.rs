use crm_common::Money;
use thiserror::Error;

/// The downstream balance-crediting collaborator (the MT5 bridge in production).
///
/// The call is treated as fallible and non-idempotent: implementations must be given a stable
/// `idempotency_key` (the deposit id) so that a well-behaved downstream can de-duplicate retries.
/// The engine additionally gates every invocation on the ledger's crediting marker as defence in
/// depth, since downstream idempotency is not guaranteed.
///
/// Implementations must enforce a bounded timeout and report it as
/// [`CreditingError::Unavailable`].
#[allow(async_fn_in_trait)]
pub trait BalanceCrediting: Clone {
    /// Increase the balance of `account_id` by `amount`. Exactly-once delivery is the caller's
    /// problem; this call only promises to be safely retryable under the given idempotency key.
    async fn credit(
        &self,
        account_id: &str,
        amount: Money,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<(), CreditingError>;
}

#[derive(Debug, Clone, Error)]
pub enum CreditingError {
    /// The downstream system could not be reached, timed out, or failed transiently.
    /// Retrying later is safe and expected.
    #[error("The balance-crediting service is unavailable. {0}")]
    Unavailable(String),
    /// The downstream system refused the credit permanently. Retrying will not help;
    /// an operator has to look at this.
    #[error("The balance-crediting service rejected the credit. {0}")]
    Rejected(String),
}
