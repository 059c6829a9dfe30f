use actix_web::{
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    App,
    Error,
};
use crm_common::{Money, Secret};
use crm_payment_engine::{
    db_types::{Deposit, DepositStatus, NewDeposit, OrderId},
    events::EventProducers,
    helpers::{callback_signature, signing_params},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        RecordingCrediting,
    },
    traits::DepositGatewayDatabase,
    DepositFlowApi,
    SqliteDatabase,
};
use log::debug;
use serde_json::{json, Value};

use crate::{config::ProxyOptions, cregis_routes::CregisCallbackRoute, data_objects::CallbackAck, routes::health};

const SECRET: &str = "endpoint-secret";

struct TestHarness {
    db: SqliteDatabase,
    crediting: RecordingCrediting,
}

impl TestHarness {
    async fn new() -> Self {
        let _ = env_logger::try_init();
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let crediting = RecordingCrediting::new();
        Self { db, crediting }
    }

    fn api(&self) -> DepositFlowApi<SqliteDatabase, RecordingCrediting> {
        DepositFlowApi::new(
            self.db.clone(),
            self.crediting.clone(),
            Secret::new(SECRET.to_string()),
            EventProducers::default(),
        )
    }

    async fn seed_deposit(&self, account: &str, order: &str) -> Deposit {
        let deposit = NewDeposit::new(
            account.to_string(),
            OrderId::from(order.to_string()),
            "10.00".parse::<Money>().unwrap(),
            "USDT".to_string(),
        );
        let (deposit, _) = self.db.insert_deposit(deposit).await.expect("Error inserting deposit");
        deposit
    }

    async fn service(
        &self,
    ) -> impl Service<actix_http::Request, Response = ServiceResponse, Error = Error> {
        let app = App::new()
            .app_data(web::Data::new(self.api()))
            .app_data(web::Data::new(ProxyOptions::default()))
            .service(health)
            .service(
                web::scope("/cregis")
                    .service(CregisCallbackRoute::<SqliteDatabase, RecordingCrediting>::new()),
            );
        test::init_service(app).await
    }
}

fn signed(mut payload: Value) -> Value {
    let sign = callback_signature(&signing_params(&payload), SECRET);
    payload["sign"] = Value::String(sign);
    payload
}

fn paid_callback(order: &str) -> Value {
    signed(json!({
        "third_party_id": order,
        "status": "paid",
        "received_amount": "10.00",
        "tx_hash": "abc",
    }))
}

async fn post_callback<S>(service: &S, payload: &Value) -> ServiceResponse
where S: Service<actix_http::Request, Response = ServiceResponse, Error = Error> {
    let req = TestRequest::post().uri("/cregis/callback").set_json(payload).to_request();
    debug!("Posting callback");
    test::call_service(service, req).await
}

#[actix_web::test]
async fn valid_callback_is_acknowledged_with_the_resulting_state() {
    let harness = TestHarness::new().await;
    let deposit = harness.seed_deposit("700200", "ord-ep-1").await;
    let service = harness.service().await;

    let res = post_callback(&service, &paid_callback("ord-ep-1")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let ack: CallbackAck = test::read_body_json(res).await;
    assert!(ack.success);
    assert_eq!(ack.deposit_id, Some(deposit.deposit_id));
    assert_eq!(ack.status, Some(DepositStatus::Completed));
    assert_eq!(harness.crediting.call_count(), 1);
}

#[actix_web::test]
async fn invalid_signature_is_the_only_non_success_response() {
    let harness = TestHarness::new().await;
    let deposit = harness.seed_deposit("700201", "ord-ep-2").await;
    let service = harness.service().await;

    let mut payload = paid_callback("ord-ep-2");
    payload["sign"] = Value::String("ffffffffffffffffffffffffffffffff".to_string());
    let res = post_callback(&service, &payload).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = String::from_utf8_lossy(&test::read_body(res).await).into_owned();
    assert!(body.contains("signature"), "unexpected body: {body}");

    let stored = harness.db.fetch_deposit(&deposit.deposit_id).await.unwrap().unwrap();
    assert_eq!(stored.status, DepositStatus::Pending);
    assert_eq!(harness.crediting.call_count(), 0);
}

#[actix_web::test]
async fn replayed_callbacks_are_still_acknowledged() {
    let harness = TestHarness::new().await;
    harness.seed_deposit("700202", "ord-ep-3").await;
    let service = harness.service().await;

    let res = post_callback(&service, &paid_callback("ord-ep-3")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = post_callback(&service, &paid_callback("ord-ep-3")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let ack: CallbackAck = test::read_body_json(res).await;
    assert!(ack.success);
    assert_eq!(ack.status, Some(DepositStatus::Completed));
    assert_eq!(harness.crediting.call_count(), 1);
}

#[actix_web::test]
async fn unknown_references_are_acknowledged_with_success_status() {
    let harness = TestHarness::new().await;
    let service = harness.service().await;

    let res = post_callback(&service, &signed(json!({"third_party_id": "ghost-99", "status": "paid"}))).await;
    assert_eq!(res.status(), StatusCode::OK);
    let ack: CallbackAck = test::read_body_json(res).await;
    assert!(!ack.success);
    assert!(ack.message.contains("ghost-99"));
    assert_eq!(harness.crediting.call_count(), 0);
}

#[actix_web::test]
async fn health_endpoint_is_alive() {
    let harness = TestHarness::new().await;
    let service = harness.service().await;
    let req = TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
}
