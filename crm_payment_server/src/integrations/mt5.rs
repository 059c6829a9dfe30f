//! The MT5 manager-bridge client.
//!
//! This is the production implementation of [`BalanceCrediting`]: a REST call against the MT5
//! bridge's `AddClientBalance` endpoint. The call is non-idempotent on the MT5 side, so the
//! engine's idempotency key is embedded in the transaction comment — it is the only handle an
//! operator (or a better-behaved future bridge) has for de-duplicating a replayed credit.
use std::sync::Arc;

use crm_common::Money;
use crm_payment_engine::traits::{BalanceCrediting, CreditingError};
use log::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{config::Mt5Config, errors::ServerError};

#[derive(Clone)]
pub struct Mt5Client {
    config: Mt5Config,
    client: Arc<Client>,
}

impl Mt5Client {
    pub fn new(config: Mt5Config) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }
}

#[derive(Debug, Serialize)]
struct AddBalanceRequest {
    balance: f64,
    comment: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Mt5Response {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

impl BalanceCrediting for Mt5Client {
    /// `POST {api_url}/api/Users/{login}/AddClientBalance`
    ///
    /// Network failures, timeouts and 5xx responses are transient ([`CreditingError::Unavailable`]
    /// — safe to retry); anything the bridge itself refuses is permanent
    /// ([`CreditingError::Rejected`] — operator territory).
    async fn credit(
        &self,
        account_id: &str,
        amount: Money,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<(), CreditingError> {
        let login = account_id.trim();
        if login.is_empty() {
            return Err(CreditingError::Rejected("Invalid MT5 login".to_string()));
        }
        if self.config.api_url.is_empty() {
            return Err(CreditingError::Unavailable("MT5 API URL not configured".to_string()));
        }
        let url = format!("{}/api/Users/{login}/AddClientBalance", self.config.api_url);
        let body = AddBalanceRequest {
            balance: amount.to_f64(),
            comment: format!("Deposit {idempotency_key} ({amount} {currency})"),
        };
        trace!("🏦️ Crediting {amount} {currency} to MT5 account {login}");
        let mut request = self.client.post(&url).json(&body);
        let token = self.config.api_token.reveal();
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| CreditingError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(CreditingError::Unavailable(format!("MT5 API request failed with status {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CreditingError::Rejected(format!("MT5 API request failed with status {status}: {text}")));
        }
        let result: Mt5Response = response
            .json()
            .await
            .map_err(|e| CreditingError::Unavailable(format!("MT5 API returned invalid JSON: {e}")))?;
        if result.success {
            debug!("🏦️ MT5 account {login} credited with {amount} {currency}");
            Ok(())
        } else {
            Err(CreditingError::Rejected(result.message.unwrap_or_else(|| "No reason given".to_string())))
        }
    }
}
