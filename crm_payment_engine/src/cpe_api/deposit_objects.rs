use serde::{Deserialize, Serialize};

use crate::db_types::{DepositId, DepositStatus};

/// The outcome of handling a gateway callback. Every variant is acknowledged to the gateway with
/// a success response; only a signature failure (which is an error, not a resolution) is not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackResolution {
    /// A forward transition (or a crediting retry) took effect.
    Applied { deposit_id: DepositId, status: DepositStatus },
    /// The callback replayed a transition that had already happened. No-op.
    Duplicate { deposit_id: DepositId, status: DepositStatus },
    /// The callback contradicts a terminal state. No-op; the stored state wins.
    Conflict { deposit_id: DepositId, status: DepositStatus },
    /// No deposit matches the callback's external ids. No-op.
    NotFound { reference: String },
    /// The gateway status is not in the mapped vocabulary. No-op.
    Unrecognized { status: String },
}

impl CallbackResolution {
    pub fn deposit_id(&self) -> Option<&DepositId> {
        match self {
            CallbackResolution::Applied { deposit_id, .. }
            | CallbackResolution::Duplicate { deposit_id, .. }
            | CallbackResolution::Conflict { deposit_id, .. } => Some(deposit_id),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<DepositStatus> {
        match self {
            CallbackResolution::Applied { status, .. }
            | CallbackResolution::Duplicate { status, .. }
            | CallbackResolution::Conflict { status, .. } => Some(*status),
            _ => None,
        }
    }
}
