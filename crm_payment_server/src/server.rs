use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use crm_payment_engine::{
    events::{AlertSeverity, EventHandlers, EventHooks, EventProducers},
    DepositFlowApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    config::{ProxyOptions, ServerConfig},
    cregis_routes::CregisCallbackRoute,
    errors::ServerError,
    integrations::mt5::Mt5Client,
    routes::health,
};

const ALERT_EVENT_BUFFER_SIZE: usize = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    config.validate()?;
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = create_logging_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let mt5 = Mt5Client::new(config.mt5.clone())?;
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let deposits_api = DepositFlowApi::new(
            db.clone(),
            mt5.clone(),
            config.cregis.callback_secret.clone(),
            producers.clone(),
        );
        let options = ProxyOptions::from_config(&config);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("cps::access_log"))
            .app_data(web::Data::new(deposits_api))
            .app_data(web::Data::new(options));
        let cregis_scope =
            web::scope("/cregis").service(CregisCallbackRoute::<SqliteDatabase, Mt5Client>::new());
        app.service(health).service(cregis_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// The default operational hooks: completed deposits get an info line, crediting alerts get a
/// warn/error line that log-based alerting can latch onto. Heavier delivery channels (pager,
/// email) belong to the deployment, not this binary.
fn create_logging_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_deposit_completed(|ev| {
        Box::pin(async move {
            let d = ev.deposit;
            info!(
                "✅️ Deposit {} for account {} completed. {} {} credited.",
                d.deposit_id,
                d.account_id,
                d.received_amount.unwrap_or(d.requested_amount),
                d.currency
            );
        })
    });
    hooks.on_crediting_alert(|ev| {
        Box::pin(async move {
            match ev.severity {
                AlertSeverity::Warning => warn!(
                    "🚨️ [{}] Crediting {} {} to account {} for deposit {} could not be confirmed; it will be \
                     retried. {}",
                    ev.severity, ev.amount, ev.currency, ev.account_id, ev.deposit_id, ev.message
                ),
                AlertSeverity::Critical => error!(
                    "🚨️ [{}] Crediting {} {} to account {} for deposit {} was refused downstream. Manual \
                     intervention required. {}",
                    ev.severity, ev.amount, ev.currency, ev.account_id, ev.deposit_id, ev.message
                ),
            }
        })
    });
    EventHandlers::new(ALERT_EVENT_BUFFER_SIZE, hooks)
}
