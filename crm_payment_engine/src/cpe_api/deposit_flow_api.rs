use std::fmt::Debug;

use crm_common::Secret;
use log::*;
use serde_json::Value;

use crate::{
    cpe_api::{deposit_objects::CallbackResolution, errors::CallbackError},
    cregis_types::{CregisCallback, SIGNATURE_FIELD},
    db_types::{CreditingStatus, Deposit, DepositId, DepositStatus, LedgerTransaction, NewDeposit},
    events::{AlertSeverity, CreditingAlertEvent, DepositCompletedEvent, EventProducers},
    helpers::{map_gateway_status, verify_callback_signature, CallbackOutcome},
    traits::{BalanceCrediting, CreditingError, DepositGatewayDatabase, DepositGatewayError, TransitionOutcome},
};

/// `DepositFlowApi` is the reconciliation engine: it is the only component that may drive a
/// deposit through its lifecycle in response to gateway callbacks, and the only caller of the
/// balance-crediting collaborator.
///
/// The flow for a callback is: verify the signature, resolve the deposit, map the gateway status,
/// apply the state transition under the storage-level compare-and-swap, and — on the success path
/// — invoke the crediting client, gated on the ledger's crediting marker. Every outcome other
/// than a signature failure is acknowledged to the gateway as a success, because the gateway
/// interprets anything else as "please redeliver".
pub struct DepositFlowApi<B, C> {
    db: B,
    crediting: C,
    callback_secret: Secret<String>,
    producers: EventProducers,
}

impl<B, C> Debug for DepositFlowApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DepositFlowApi")
    }
}

impl<B, C> DepositFlowApi<B, C> {
    pub fn new(db: B, crediting: C, callback_secret: Secret<String>, producers: EventProducers) -> Self {
        Self { db, crediting, callback_secret, producers }
    }
}

impl<B, C> DepositFlowApi<B, C>
where
    B: DepositGatewayDatabase,
    C: BalanceCrediting,
{
    /// Handle a raw callback payload from the payment gateway.
    ///
    /// The payload is taken as raw JSON because the signature covers every field the gateway
    /// sent, including vocabulary this version does not know about. Verification therefore
    /// happens against the raw object, and only then is the payload decoded into
    /// [`CregisCallback`] (ignoring unknown fields).
    ///
    /// Returns `Err(CallbackError::InvalidSignature)` without touching the database, so the
    /// response cannot leak whether a given external id exists.
    pub async fn handle_callback(&self, payload: Value) -> Result<CallbackResolution, CallbackError> {
        let provided = payload.get(SIGNATURE_FIELD).and_then(Value::as_str).unwrap_or_default();
        if !verify_callback_signature(&payload, provided, self.callback_secret.reveal()) {
            warn!("🔄️🔐️ Rejected a gateway callback with a missing or invalid signature");
            return Err(CallbackError::InvalidSignature);
        }
        let callback: CregisCallback =
            serde_json::from_value(payload).map_err(|e| CallbackError::MalformedPayload(e.to_string()))?;
        let Some(deposit) = self.lookup_deposit(&callback).await? else {
            let reference = callback.reference_label();
            warn!(
                "🔄️📦️ Callback for unknown deposit reference [{reference}]. Acknowledging so the gateway stops \
                 redelivering, but this needs investigation."
            );
            return Ok(CallbackResolution::NotFound { reference });
        };
        let status = callback.status.clone().unwrap_or_default();
        match map_gateway_status(&status) {
            CallbackOutcome::Indeterminate => {
                info!(
                    "🔄️📦️ Deposit [{}]: callback carried unmapped gateway status '{status}'. No action taken.",
                    deposit.deposit_id
                );
                Ok(CallbackResolution::Unrecognized { status })
            },
            CallbackOutcome::Failure => self.apply_failure(deposit, &callback, &status).await,
            CallbackOutcome::Success => self.apply_success(deposit, &callback).await,
        }
    }

    /// Register a new deposit intent on behalf of the creation path. Idempotent on the merchant
    /// order id.
    pub async fn register_deposit(&self, deposit: NewDeposit) -> Result<(Deposit, bool), CallbackError> {
        let (deposit, inserted) = self.db.insert_deposit(deposit).await?;
        if inserted {
            debug!("🔄️📦️ Deposit [{}] registered for account {}", deposit.deposit_id, deposit.account_id);
        } else {
            debug!("🔄️📦️ Deposit {} already registered as [{}]", deposit.order_id, deposit.deposit_id);
        }
        Ok((deposit, inserted))
    }

    /// Operator-driven recovery for a deposit stuck in `Approved` with the crediting marker
    /// `InFlight` (the downstream was unavailable, or the process died mid-flight). Runs the same
    /// gated crediting step a follow-up callback would.
    pub async fn retry_crediting(&self, deposit_id: &DepositId) -> Result<CallbackResolution, CallbackError> {
        let Some(deposit) = self.db.fetch_deposit(deposit_id).await? else {
            return Ok(CallbackResolution::NotFound { reference: deposit_id.to_string() });
        };
        match deposit.status {
            DepositStatus::Approved => self.run_crediting(deposit).await,
            DepositStatus::Completed => {
                info!("🔄️💰️ Crediting retry requested for deposit [{deposit_id}], but it is already complete.");
                Ok(CallbackResolution::Duplicate { deposit_id: deposit.deposit_id, status: deposit.status })
            },
            status => {
                warn!("🔄️💰️ Crediting retry requested for deposit [{deposit_id}], but it is {status}. Nothing to credit.");
                Ok(CallbackResolution::Conflict { deposit_id: deposit.deposit_id, status })
            },
        }
    }

    pub async fn fetch_deposit(&self, deposit_id: &DepositId) -> Result<Option<Deposit>, CallbackError> {
        Ok(self.db.fetch_deposit(deposit_id).await?)
    }

    async fn lookup_deposit(&self, callback: &CregisCallback) -> Result<Option<Deposit>, CallbackError> {
        for reference in callback.references() {
            if let Some(deposit) = self.db.fetch_deposit_by_reference(reference).await? {
                trace!("🔄️📦️ Callback reference [{reference}] resolved to deposit [{}]", deposit.deposit_id);
                return Ok(Some(deposit));
            }
        }
        Ok(None)
    }

    async fn apply_failure(
        &self,
        deposit: Deposit,
        callback: &CregisCallback,
        gateway_status: &str,
    ) -> Result<CallbackResolution, CallbackError> {
        match deposit.status {
            DepositStatus::Pending => match self.db.reject_deposit(&deposit.deposit_id, &callback.evidence()).await? {
                TransitionOutcome::Applied(d) => {
                    info!("🔄️❌️ Deposit [{}] rejected (gateway status '{gateway_status}').", d.deposit_id);
                    Ok(CallbackResolution::Applied { deposit_id: d.deposit_id, status: d.status })
                },
                TransitionOutcome::Unchanged(d) => Ok(self.classify_noop(d, DepositStatus::Rejected)),
            },
            _ => Ok(self.classify_noop(deposit, DepositStatus::Rejected)),
        }
    }

    async fn apply_success(
        &self,
        deposit: Deposit,
        callback: &CregisCallback,
    ) -> Result<CallbackResolution, CallbackError> {
        match deposit.status {
            DepositStatus::Pending => match self.db.approve_deposit(&deposit.deposit_id, &callback.evidence()).await? {
                TransitionOutcome::Applied(d) => {
                    info!("🔄️💰️ Deposit [{}] approved. Proceeding to credit the account balance.", d.deposit_id);
                    self.run_crediting(d).await
                },
                // A concurrent delivery won the approval race. Crediting stays safe behind the
                // ledger marker, so join the crediting step rather than dropping the callback.
                TransitionOutcome::Unchanged(d) if d.status == DepositStatus::Approved => self.run_crediting(d).await,
                TransitionOutcome::Unchanged(d) => Ok(self.classify_noop(d, DepositStatus::Completed)),
            },
            // A follow-up success callback while the credit is unconfirmed: retry the credit.
            DepositStatus::Approved => self.run_crediting(deposit).await,
            _ => Ok(self.classify_noop(deposit, DepositStatus::Completed)),
        }
    }

    /// Invoke the balance-crediting client for an `Approved` deposit, gated on the ledger's
    /// crediting marker, and complete the deposit once the credit is confirmed.
    async fn run_crediting(&self, deposit: Deposit) -> Result<CallbackResolution, CallbackError> {
        let deposit_id = deposit.deposit_id.clone();
        let entry = self
            .db
            .fetch_ledger_for_deposit(&deposit_id)
            .await?
            .ok_or_else(|| CallbackError::Database(DepositGatewayError::LedgerMissing(deposit_id.clone())))?;
        if entry.crediting == CreditingStatus::Done {
            // The credit was confirmed but the completion never got recorded (a crash squeezed in
            // between the two). Do not call the client again; just finish the bookkeeping.
            debug!("🔄️💰️ Deposit [{deposit_id}] has already been credited. Completing the record.");
            return self.finish_completion(deposit).await;
        }
        trace!(
            "🔄️💰️ Crediting {} {} to account {} for deposit [{deposit_id}]",
            entry.amount,
            entry.currency,
            entry.account_id
        );
        match self.crediting.credit(&entry.account_id, entry.amount, &entry.currency, deposit_id.as_str()).await {
            Ok(()) => self.finish_completion(deposit).await,
            Err(CreditingError::Unavailable(msg)) => {
                error!(
                    "🔄️💰️ Balance crediting for deposit [{deposit_id}] is unavailable. The deposit stays Approved \
                     with the crediting marker InFlight; a later callback or an operator retry will pick it up. {msg}"
                );
                self.raise_crediting_alert(&deposit, &entry, AlertSeverity::Warning, &msg).await;
                Ok(CallbackResolution::Applied { deposit_id, status: DepositStatus::Approved })
            },
            Err(CreditingError::Rejected(msg)) => {
                error!(
                    "🔄️💰️ Balance crediting for deposit [{deposit_id}] was rejected downstream. The deposit will \
                     NOT be marked Completed; operator action is required. {msg}"
                );
                self.raise_crediting_alert(&deposit, &entry, AlertSeverity::Critical, &msg).await;
                Ok(CallbackResolution::Applied { deposit_id, status: DepositStatus::Approved })
            },
        }
    }

    async fn finish_completion(&self, deposit: Deposit) -> Result<CallbackResolution, CallbackError> {
        let deposit_id = deposit.deposit_id.clone();
        match self.db.complete_deposit(&deposit_id).await? {
            TransitionOutcome::Applied(d) => {
                info!("🔄️✅️ Deposit [{deposit_id}] is complete.");
                self.call_deposit_completed_hook(&d).await;
                Ok(CallbackResolution::Applied { deposit_id: d.deposit_id.clone(), status: d.status })
            },
            TransitionOutcome::Unchanged(d) => {
                debug!("🔄️✅️ Deposit [{deposit_id}] was already {}. No action taken.", d.status);
                Ok(CallbackResolution::Duplicate { deposit_id: d.deposit_id.clone(), status: d.status })
            },
        }
    }

    fn classify_noop(&self, deposit: Deposit, target: DepositStatus) -> CallbackResolution {
        let Deposit { deposit_id, status, .. } = deposit;
        if status == target {
            info!("🔄️📦️ Duplicate callback for deposit [{deposit_id}]; it is already {status}. No action taken.");
            CallbackResolution::Duplicate { deposit_id, status }
        } else {
            warn!(
                "🔄️📦️ Conflicting callback for deposit [{deposit_id}]: it is {status} but the callback implies \
                 {target}. The stored state wins; no action taken."
            );
            CallbackResolution::Conflict { deposit_id, status }
        }
    }

    async fn call_deposit_completed_hook(&self, deposit: &Deposit) {
        for emitter in &self.producers.deposit_completed_producer {
            debug!("🔄️✅️ Notifying deposit completed hook subscribers");
            let event = DepositCompletedEvent::new(deposit.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn raise_crediting_alert(
        &self,
        deposit: &Deposit,
        entry: &LedgerTransaction,
        severity: AlertSeverity,
        message: &str,
    ) {
        for emitter in &self.producers.crediting_alert_producer {
            let event = CreditingAlertEvent {
                deposit_id: deposit.deposit_id.clone(),
                account_id: entry.account_id.clone(),
                amount: entry.amount,
                currency: entry.currency.clone(),
                severity,
                message: message.to_string(),
            };
            emitter.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
