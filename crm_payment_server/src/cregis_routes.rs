//----------------------------------------------   Gateway callbacks  ----------------------------------------------

use actix_web::{web, HttpRequest, HttpResponse};
use crm_payment_engine::{
    traits::{BalanceCrediting, DepositGatewayDatabase},
    CallbackError,
    CallbackResolution,
    DepositFlowApi,
};
use log::{info, trace, warn};
use serde_json::Value;

use crate::{config::ProxyOptions, data_objects::CallbackAck, errors::ServerError, helpers::get_remote_ip, route};

route!(cregis_callback => Post "callback" impl DepositGatewayDatabase, BalanceCrediting);
pub async fn cregis_callback<BPay, CBal>(
    req: HttpRequest,
    body: web::Json<Value>,
    api: web::Data<DepositFlowApi<BPay, CBal>>,
    options: web::Data<ProxyOptions>,
) -> Result<HttpResponse, ServerError>
where
    BPay: DepositGatewayDatabase,
    CBal: BalanceCrediting,
{
    let peer = get_remote_ip(&req, options.use_x_forwarded_for, options.use_forwarded)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    trace!("🪙️ Received gateway callback from {peer}: {}", req.uri());
    // Callback responses must be in the 200 range for every handled outcome, otherwise the
    // gateway will redeliver. Only a failed signature check is allowed to escape as an error.
    let ack = match api.handle_callback(body.into_inner()).await {
        Ok(resolution) => ack_for(resolution),
        Err(CallbackError::InvalidSignature) => {
            warn!("🪙️ Rejecting callback from {peer}: invalid signature.");
            return Err(ServerError::InvalidCallbackSignature);
        },
        Err(CallbackError::MalformedPayload(e)) => {
            warn!("🪙️ Callback from {peer} passed signature checks but could not be decoded. {e}");
            CallbackAck::failure(e)
        },
        Err(CallbackError::Database(e)) => {
            warn!("🪙️ Could not process gateway callback. {e}");
            CallbackAck::failure("Unexpected error handling callback.")
        },
    };
    Ok(HttpResponse::Ok().json(ack))
}

fn ack_for(resolution: CallbackResolution) -> CallbackAck {
    match resolution {
        CallbackResolution::Applied { deposit_id, status } => {
            info!("🪙️ Deposit {deposit_id} is now {status}.");
            CallbackAck::resolved(deposit_id, status, "Callback processed successfully.")
        },
        CallbackResolution::Duplicate { deposit_id, status } => {
            info!("🪙️ Duplicate callback for deposit {deposit_id} (already {status}).");
            CallbackAck::resolved(deposit_id, status, "Callback already processed.")
        },
        CallbackResolution::Conflict { deposit_id, status } => {
            warn!("🪙️ Conflicting callback for deposit {deposit_id}; keeping terminal state {status}.");
            CallbackAck::resolved(deposit_id, status, "Callback conflicts with the recorded state.")
        },
        CallbackResolution::NotFound { reference } => {
            warn!("🪙️ Callback for unknown deposit reference '{reference}'.");
            CallbackAck::failure(format!("No deposit found for reference {reference}"))
        },
        CallbackResolution::Unrecognized { status } => {
            info!("🪙️ Ignoring callback with unmapped gateway status '{status}'.");
            CallbackAck::failure(format!("Unrecognized gateway status: {status}"))
        },
    }
}
