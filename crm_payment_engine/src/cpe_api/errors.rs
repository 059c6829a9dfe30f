use thiserror::Error;

use crate::traits::DepositGatewayError;

#[derive(Debug, Error)]
pub enum CallbackError {
    /// The only error that maps to a non-success response: the gateway (or an impostor) sent a
    /// payload whose signature does not verify. Nothing was looked up and nothing was mutated.
    #[error("The callback signature is missing or invalid.")]
    InvalidSignature,
    /// The payload passed signature verification but could not be decoded into the expected
    /// shape. Acknowledged; redelivery of the same bytes cannot succeed either.
    #[error("Could not decode the callback payload. {0}")]
    MalformedPayload(String),
    #[error("{0}")]
    Database(#[from] DepositGatewayError),
}
