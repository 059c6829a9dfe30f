use std::fmt::Display;

use crm_payment_engine::db_types::{DepositId, DepositStatus};
use serde::{Deserialize, Serialize};

/// The acknowledgement body returned to the payment gateway for every handled callback. The
/// resolved deposit id and resulting state are included for observability; the gateway only cares
/// about the HTTP status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_id: Option<DepositId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DepositStatus>,
    pub message: String,
}

impl CallbackAck {
    pub fn resolved<S: Display>(deposit_id: DepositId, status: DepositStatus, message: S) -> Self {
        Self { success: true, deposit_id: Some(deposit_id), status: Some(status), message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, deposit_id: None, status: None, message: message.to_string() }
    }
}
