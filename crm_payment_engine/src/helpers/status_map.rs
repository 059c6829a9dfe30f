//! Mapping from the gateway's status vocabulary onto the internal deposit lifecycle.

/// The internal outcome implied by a gateway status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The payment settled; the deposit should move towards `Completed`.
    Success,
    /// The payment conclusively failed; the deposit should move to `Rejected`.
    Failure,
    /// Unknown vocabulary. The callback is acknowledged but must not change any state.
    Indeterminate,
}

/// Translate a gateway status into a [`CallbackOutcome`].
///
/// Matching is case-sensitive against a fixed allow-list. Anything the list does not name maps to
/// [`CallbackOutcome::Indeterminate`] so that new gateway vocabulary can never corrupt a deposit;
/// callers are expected to log the unmapped value.
pub fn map_gateway_status(status: &str) -> CallbackOutcome {
    match status {
        "paid" | "complete" | "success" | "confirmed" => CallbackOutcome::Success,
        "rejected" | "failed" | "cancelled" | "expired" => CallbackOutcome::Failure,
        _ => CallbackOutcome::Indeterminate,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn success_vocabulary() {
        for s in ["paid", "complete", "success", "confirmed"] {
            assert_eq!(map_gateway_status(s), CallbackOutcome::Success, "{s}");
        }
    }

    #[test]
    fn failure_vocabulary() {
        for s in ["rejected", "failed", "cancelled", "expired"] {
            assert_eq!(map_gateway_status(s), CallbackOutcome::Failure, "{s}");
        }
    }

    #[test]
    fn everything_else_is_indeterminate() {
        for s in ["", "Paid", "PAID", "on_hold", "pending", "paid ", "complete!"] {
            assert_eq!(map_gateway_status(s), CallbackOutcome::Indeterminate, "{s:?}");
        }
    }
}
