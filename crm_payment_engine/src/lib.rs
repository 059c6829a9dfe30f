//! CRM Payment Engine
//!
//! The payment engine contains the core logic for reconciling crypto deposit callbacks from the
//! Cregis payment gateway against the CRM's deposit records, and for driving the MT5
//! balance-crediting side effect at most once per deposit. It is provider-agnostic at its seams.
//!
//! The library is divided into three main sections:
//! 1. Database management and control (the `sqlite` module). You should never need to access the
//!    database directly; use the public API instead. The exception is the data types used in the
//!    database, which are defined in the [`db_types`] module and are public.
//! 2. The engine public API ([`DepositFlowApi`]). This is the reconciliation engine proper:
//!    signature verification, status mapping, idempotent state transitions and the gated crediting
//!    call. Specific backends need to implement the traits in the [`traits`] module in order to
//!    act as a storage backend, and crediting providers implement
//!    [`traits::BalanceCrediting`].
//! 3. A set of events that can be subscribed to ([`events`]). These are emitted when a deposit
//!    completes or when the crediting side effect needs operator attention. A simple actor
//!    framework lets you hook into these events and perform custom actions.
mod cpe_api;
#[cfg(feature = "sqlite")]
mod sqlite;

pub mod cregis_types;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use cpe_api::{
    deposit_flow_api::DepositFlowApi,
    deposit_objects::CallbackResolution,
    errors::CallbackError,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
