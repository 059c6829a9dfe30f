use std::sync::{Arc, Mutex};

use crm_common::Money;

use crate::traits::{BalanceCrediting, CreditingError};

/// A single invocation of the crediting client, as captured by [`RecordingCrediting`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditCall {
    pub account_id: String,
    pub amount: Money,
    pub currency: String,
    pub idempotency_key: String,
}

/// A programmable in-memory [`BalanceCrediting`] double. Every invocation is recorded (including
/// failing ones), and the next outcome can be switched between success and either failure mode.
#[derive(Clone, Default)]
pub struct RecordingCrediting {
    calls: Arc<Mutex<Vec<CreditCall>>>,
    failure: Arc<Mutex<Option<CreditingError>>>,
}

impl RecordingCrediting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `credit` call fail with the given error, until `succeed` is called.
    pub fn fail_with(&self, error: CreditingError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// Make subsequent `credit` calls succeed again.
    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<CreditCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl BalanceCrediting for RecordingCrediting {
    async fn credit(
        &self,
        account_id: &str,
        amount: Money,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<(), CreditingError> {
        self.calls.lock().unwrap().push(CreditCall {
            account_id: account_id.to_string(),
            amount,
            currency: currency.to_string(),
            idempotency_key: idempotency_key.to_string(),
        });
        match self.failure.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
