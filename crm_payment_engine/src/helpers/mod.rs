mod callback_signature;
mod status_map;

pub use callback_signature::{callback_signature, signing_params, verify_callback_signature};
pub use status_map::{map_gateway_status, CallbackOutcome};
