//! Wire types for Cregis payment-gateway callbacks.
//!
//! The gateway posts a flat JSON object. All fields are modelled as named optionals and unknown
//! fields are ignored (the gateway is free to add vocabulary without breaking us). The signature
//! field is verified against the *raw* payload before this type is ever decoded, so nothing here
//! participates in authentication.

use crm_common::Money;
use log::error;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::db_types::CallbackEvidence;

/// The name of the signature field in the callback payload. It is excluded from the canonical
/// signing string.
pub const SIGNATURE_FIELD: &str = "sign";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CregisCallback {
    /// The gateway-assigned id for the payment order.
    #[serde(default, deserialize_with = "de_string_or_number")]
    pub cregis_id: Option<String>,
    /// The merchant order id we supplied at checkout time, echoed back.
    #[serde(default, deserialize_with = "de_string_or_number")]
    pub third_party_id: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "de_string_or_number")]
    pub order_amount: Option<String>,
    pub order_currency: Option<String>,
    #[serde(default, deserialize_with = "de_string_or_number")]
    pub received_amount: Option<String>,
    pub tx_hash: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub sign: Option<String>,
}

/// The gateway renders ids and amounts as strings or bare numbers depending on the field and the
/// API version; accept both.
fn de_string_or_number<'de, D>(de: D) -> Result<Option<String>, D::Error>
where D: Deserializer<'de> {
    let value = Option::<Value>::deserialize(de)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("expected a string or number, got {other}"))),
    }
}

impl CregisCallback {
    /// The candidate lookup references, gateway-assigned id first.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.cregis_id.iter().chain(self.third_party_id.iter()).map(String::as_str)
    }

    /// A human-readable reference for logging, even when the payload carried none.
    pub fn reference_label(&self) -> String {
        self.references().next().unwrap_or("<no reference>").to_string()
    }

    /// Extract the fields that get persisted with a forward transition. A malformed amount is
    /// dropped (and logged); the requested amount is used for crediting in that case.
    pub fn evidence(&self) -> CallbackEvidence {
        let received_amount = self.received_amount.as_deref().and_then(|s| {
            s.parse::<Money>()
                .map_err(|e| error!("Gateway callback carried an unparseable received_amount. {e}"))
                .ok()
        });
        CallbackEvidence {
            received_amount,
            tx_hash: self.tx_hash.clone(),
            from_address: self.from_address.clone(),
            to_address: self.to_address.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_fields_are_ignored() {
        let json = serde_json::json!({
            "cregis_id": "CR-1001",
            "third_party_id": "ord-1",
            "status": "paid",
            "received_amount": "10.00",
            "some_future_field": {"nested": true},
            "sign": "abc"
        });
        let cb: CregisCallback = serde_json::from_value(json).unwrap();
        assert_eq!(cb.status.as_deref(), Some("paid"));
        assert_eq!(cb.references().collect::<Vec<_>>(), vec!["CR-1001", "ord-1"]);
    }

    #[test]
    fn ids_and_amounts_may_be_bare_numbers() {
        let json = serde_json::json!({"cregis_id": 900144, "third_party_id": "ord-1", "received_amount": 10.5});
        let cb: CregisCallback = serde_json::from_value(json).unwrap();
        assert_eq!(cb.cregis_id.as_deref(), Some("900144"));
        assert_eq!(cb.evidence().received_amount, Some("10.5".parse().unwrap()));
    }

    #[test]
    fn evidence_drops_malformed_amounts() {
        let cb = CregisCallback {
            received_amount: Some("not-a-number".to_string()),
            tx_hash: Some("abc".to_string()),
            ..CregisCallback::default()
        };
        let ev = cb.evidence();
        assert!(ev.received_amount.is_none());
        assert_eq!(ev.tx_hash.as_deref(), Some("abc"));
    }
}
