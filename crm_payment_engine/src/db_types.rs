use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use crm_common::Money;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

/// The actor recorded on ledger rows written by the webhook reconciliation path.
pub const WEBHOOK_ACTOR: &str = "cregis-webhook";

//--------------------------------------     DepositId       ---------------------------------------------------------
/// The opaque public identifier of a deposit. Generated once at creation and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct DepositId(pub String);

impl DepositId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A fresh, collision-resistant deposit id.
    pub fn random() -> Self {
        Self(format!("dep-{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>()))
    }
}

impl FromStr for DepositId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for DepositId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for DepositId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------      OrderId        ---------------------------------------------------------
/// The merchant-assigned correlation id handed to the gateway when the deposit was created.
/// The gateway echoes it back as `third_party_id` in callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   DepositStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DepositStatus {
    /// The deposit has been created and no conclusive callback has arrived.
    Pending,
    /// The gateway reported a successful payment; the balance credit has not been confirmed yet.
    Approved,
    /// The balance credit has been confirmed. Terminal.
    Completed,
    /// The gateway reported a failed, cancelled or expired payment. Terminal.
    Rejected,
}

impl DepositStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DepositStatus::Completed | DepositStatus::Rejected)
    }
}

impl Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepositStatus::Pending => write!(f, "Pending"),
            DepositStatus::Approved => write!(f, "Approved"),
            DepositStatus::Completed => write!(f, "Completed"),
            DepositStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

impl From<String> for DepositStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid deposit status: {value}. But this conversion cannot fail. Defaulting to Pending");
            DepositStatus::Pending
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(pub String);

impl FromStr for DepositStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Completed" => Ok(Self::Completed),
            "Rejected" => Ok(Self::Rejected),
            s => Err(ConversionError(format!("Invalid deposit status: {s}"))),
        }
    }
}

//--------------------------------------    LedgerStatus     ---------------------------------------------------------
/// Mirror of the deposit lifecycle on the ledger side. There is no `Rejected` mirror; failed
/// deposits never produce a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum LedgerStatus {
    Pending,
    Approved,
    Completed,
}

impl Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerStatus::Pending => write!(f, "Pending"),
            LedgerStatus::Approved => write!(f, "Approved"),
            LedgerStatus::Completed => write!(f, "Completed"),
        }
    }
}

impl From<String> for LedgerStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => Self::Pending,
            "Approved" => Self::Approved,
            "Completed" => Self::Completed,
            _ => {
                error!("Invalid ledger status: {value}. But this conversion cannot fail. Defaulting to Pending");
                Self::Pending
            },
        }
    }
}

//--------------------------------------  CreditingStatus    ---------------------------------------------------------
/// The at-most-once guard for the external balance-crediting call.
///
/// `InFlight` means a credit may or may not have been delivered; retrying is safe because the
/// downstream call carries a stable idempotency key. `Done` means the credit is confirmed and the
/// external client must never be invoked again for this deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum CreditingStatus {
    InFlight,
    Done,
}

impl Display for CreditingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreditingStatus::InFlight => write!(f, "InFlight"),
            CreditingStatus::Done => write!(f, "Done"),
        }
    }
}

impl From<String> for CreditingStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "InFlight" => Self::InFlight,
            "Done" => Self::Done,
            _ => {
                error!("Invalid crediting status: {value}. But this conversion cannot fail. Defaulting to InFlight");
                Self::InFlight
            },
        }
    }
}

//--------------------------------------      Deposit        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Deposit {
    pub id: i64,
    pub deposit_id: DepositId,
    /// The MT5 trading account that will be credited when the deposit completes.
    pub account_id: String,
    pub order_id: OrderId,
    /// The gateway-assigned correlation id, if the creation path recorded one.
    pub cregis_id: Option<String>,
    pub requested_amount: Money,
    pub currency: String,
    /// The blockchain address the payer was told to send funds to.
    pub deposit_address: Option<String>,
    pub status: DepositStatus,
    pub received_amount: Option<Money>,
    pub tx_hash: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     NewDeposit      ---------------------------------------------------------
/// A deposit intent as handed over by the creation path. The creation path must have obtained the
/// gateway correlation ids and deposit address before any callback can resolve; the reconciliation
/// engine only ever consumes them.
#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub deposit_id: DepositId,
    pub account_id: String,
    pub order_id: OrderId,
    pub cregis_id: Option<String>,
    pub requested_amount: Money,
    pub currency: String,
    pub deposit_address: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewDeposit {
    pub fn new(account_id: String, order_id: OrderId, requested_amount: Money, currency: String) -> Self {
        Self {
            deposit_id: DepositId::random(),
            account_id,
            order_id,
            cregis_id: None,
            requested_amount,
            currency,
            deposit_address: None,
            expires_at: None,
        }
    }

    pub fn with_cregis_id(mut self, cregis_id: String) -> Self {
        self.cregis_id = Some(cregis_id);
        self
    }

    pub fn with_deposit_address(mut self, address: String) -> Self {
        self.deposit_address = Some(address);
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

//--------------------------------------  CallbackEvidence   ---------------------------------------------------------
/// The callback-derived fields that get persisted alongside a forward transition.
#[derive(Debug, Clone, Default)]
pub struct CallbackEvidence {
    pub received_amount: Option<Money>,
    pub tx_hash: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
}

//-------------------------------------- LedgerTransaction   ---------------------------------------------------------
/// The record of the balance-affecting side effect tied to a deposit. At most one exists per
/// deposit; it is created inside the same transaction as the first successful forward transition
/// and is never deleted by the reconciliation engine.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerTransaction {
    pub id: i64,
    pub deposit_id: DepositId,
    pub account_id: String,
    pub amount: Money,
    pub currency: String,
    pub status: LedgerStatus,
    pub tx_hash: Option<String>,
    pub credited_by: String,
    pub crediting: CreditingStatus,
    pub credited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
