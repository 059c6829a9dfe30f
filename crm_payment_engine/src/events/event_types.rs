use std::fmt::Display;

use crm_common::Money;

use crate::db_types::{Deposit, DepositId};

/// Emitted once per deposit, when the balance credit has been confirmed and the deposit reaches
/// `Completed`.
#[derive(Debug, Clone)]
pub struct DepositCompletedEvent {
    pub deposit: Deposit,
}

impl DepositCompletedEvent {
    pub fn new(deposit: Deposit) -> Self {
        Self { deposit }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    /// Transient: the crediting call can and should be retried.
    Warning,
    /// Permanent downstream refusal: an operator has to intervene.
    Critical,
}

impl Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "WARNING"),
            AlertSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Emitted when the crediting side effect could not be confirmed. The deposit stays `Approved`
/// and its ledger marker stays `InFlight`; this event is the operator-facing signal that a
/// follow-up is needed.
#[derive(Debug, Clone)]
pub struct CreditingAlertEvent {
    pub deposit_id: DepositId,
    pub account_id: String,
    pub amount: Money,
    pub currency: String,
    pub severity: AlertSeverity,
    pub message: String,
}
