//! End-to-end reconciliation tests against a real (throwaway) SQLite database, with a recording
//! crediting double standing in for the MT5 bridge.
use crm_common::{Money, Secret};
use crm_payment_engine::{
    db_types::{CreditingStatus, Deposit, DepositStatus, LedgerStatus, NewDeposit, OrderId, WEBHOOK_ACTOR},
    events::EventProducers,
    helpers::{callback_signature, signing_params},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        CreditCall,
        RecordingCrediting,
    },
    traits::{CreditingError, DepositGatewayDatabase},
    CallbackError,
    CallbackResolution,
    DepositFlowApi,
    SqliteDatabase,
};
use serde_json::{json, Value};

const SECRET: &str = "test-secret";

type TestApi = DepositFlowApi<SqliteDatabase, RecordingCrediting>;

async fn new_api() -> (TestApi, RecordingCrediting) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let crediting = RecordingCrediting::new();
    let api = DepositFlowApi::new(db, crediting.clone(), Secret::new(SECRET.to_string()), EventProducers::default());
    (api, crediting)
}

fn signed(mut payload: Value, secret: &str) -> Value {
    let sign = callback_signature(&signing_params(&payload), secret);
    payload["sign"] = Value::String(sign);
    payload
}

async fn seed_deposit(api: &TestApi, account: &str, order: &str, cregis: Option<&str>, amount: &str) -> Deposit {
    let mut deposit = NewDeposit::new(
        account.to_string(),
        OrderId::from(order.to_string()),
        amount.parse::<Money>().expect("valid amount"),
        "USDT".to_string(),
    )
    .with_deposit_address("TDepositAddr111".to_string());
    if let Some(cregis_id) = cregis {
        deposit = deposit.with_cregis_id(cregis_id.to_string());
    }
    let (deposit, inserted) = api.register_deposit(deposit).await.expect("Error registering deposit");
    assert!(inserted);
    deposit
}

fn paid_callback(order: &str) -> Value {
    signed(
        json!({
            "third_party_id": order,
            "status": "paid",
            "received_amount": "10.00",
            "tx_hash": "abc",
            "from_address": "TSenderAddr222",
            "to_address": "TDepositAddr111",
        }),
        SECRET,
    )
}

#[tokio::test]
async fn paid_callback_completes_deposit_and_credits_once() {
    let (api, crediting) = new_api().await;
    let dep = seed_deposit(&api, "700123", "ord-1", None, "10.00").await;

    let res = api.handle_callback(paid_callback("ord-1")).await.expect("Error handling callback");
    assert_eq!(res, CallbackResolution::Applied {
        deposit_id: dep.deposit_id.clone(),
        status: DepositStatus::Completed
    });

    let stored = api.fetch_deposit(&dep.deposit_id).await.unwrap().expect("deposit exists");
    assert_eq!(stored.status, DepositStatus::Completed);
    assert_eq!(stored.received_amount, Some("10.00".parse().unwrap()));
    assert_eq!(stored.tx_hash.as_deref(), Some("abc"));
    assert_eq!(stored.from_address.as_deref(), Some("TSenderAddr222"));
    assert!(stored.approved_at.is_some());
    assert!(stored.processed_at.is_some());
    assert!(stored.rejected_at.is_none());

    let ledger = api.db().fetch_ledger_for_deposit(&dep.deposit_id).await.unwrap().expect("ledger exists");
    assert_eq!(ledger.crediting, CreditingStatus::Done);
    assert_eq!(ledger.status, LedgerStatus::Completed);
    assert_eq!(ledger.credited_by, WEBHOOK_ACTOR);
    assert!(ledger.credited_at.is_some());

    assert_eq!(crediting.calls(), vec![CreditCall {
        account_id: "700123".to_string(),
        amount: "10.00".parse().unwrap(),
        currency: "USDT".to_string(),
        idempotency_key: dep.deposit_id.as_str().to_string(),
    }]);
}

#[tokio::test]
async fn replaying_a_paid_callback_is_a_noop() {
    let (api, crediting) = new_api().await;
    let dep = seed_deposit(&api, "700123", "ord-1", None, "10.00").await;

    let first = api.handle_callback(paid_callback("ord-1")).await.unwrap();
    assert!(matches!(first, CallbackResolution::Applied { .. }));
    let replay = api.handle_callback(paid_callback("ord-1")).await.expect("Replay must still be acknowledged");
    assert_eq!(replay, CallbackResolution::Duplicate {
        deposit_id: dep.deposit_id.clone(),
        status: DepositStatus::Completed
    });
    assert_eq!(crediting.call_count(), 1, "the crediting client must not be invoked again for a replay");
}

#[tokio::test]
async fn expired_callback_rejects_without_a_ledger_entry() {
    let (api, crediting) = new_api().await;
    let dep = seed_deposit(&api, "700124", "ord-2", Some("CR-2002"), "25.50").await;

    let payload = signed(json!({"cregis_id": "CR-2002", "status": "expired"}), SECRET);
    let res = api.handle_callback(payload).await.unwrap();
    assert_eq!(res, CallbackResolution::Applied {
        deposit_id: dep.deposit_id.clone(),
        status: DepositStatus::Rejected
    });

    let stored = api.fetch_deposit(&dep.deposit_id).await.unwrap().unwrap();
    assert_eq!(stored.status, DepositStatus::Rejected);
    assert!(stored.rejected_at.is_some());
    assert!(stored.approved_at.is_none());
    assert!(stored.processed_at.is_none());
    assert!(api.db().fetch_ledger_for_deposit(&dep.deposit_id).await.unwrap().is_none());
    assert_eq!(crediting.call_count(), 0);
}

#[tokio::test]
async fn unknown_references_are_acknowledged_but_change_nothing() {
    let (api, crediting) = new_api().await;
    let payload = signed(json!({"third_party_id": "ghost-1", "status": "paid"}), SECRET);
    let res = api.handle_callback(payload).await.unwrap();
    assert_eq!(res, CallbackResolution::NotFound { reference: "ghost-1".to_string() });
    assert_eq!(crediting.call_count(), 0);
}

#[tokio::test]
async fn invalid_signatures_are_rejected_without_any_mutation() {
    let (api, crediting) = new_api().await;
    let dep = seed_deposit(&api, "700125", "ord-3", None, "10.00").await;

    let mut payload = paid_callback("ord-3");
    payload["sign"] = Value::String("00000000000000000000000000000000".to_string());
    let err = api.handle_callback(payload).await.expect_err("a tampered signature must be rejected");
    assert!(matches!(err, CallbackError::InvalidSignature));

    let missing = json!({"third_party_id": "ord-3", "status": "paid"});
    let err = api.handle_callback(missing).await.expect_err("a missing signature must be rejected");
    assert!(matches!(err, CallbackError::InvalidSignature));

    let stored = api.fetch_deposit(&dep.deposit_id).await.unwrap().unwrap();
    assert_eq!(stored.status, DepositStatus::Pending);
    assert_eq!(crediting.call_count(), 0);
}

#[tokio::test]
async fn crediting_outage_leaves_the_deposit_approved_and_retryable() {
    let (api, crediting) = new_api().await;
    let dep = seed_deposit(&api, "700126", "ord-4", None, "10.00").await;
    crediting.fail_with(CreditingError::Unavailable("the MT5 bridge timed out".to_string()));

    let res = api.handle_callback(paid_callback("ord-4")).await.expect("the gateway still gets a success ack");
    assert_eq!(res, CallbackResolution::Applied {
        deposit_id: dep.deposit_id.clone(),
        status: DepositStatus::Approved
    });

    let stored = api.fetch_deposit(&dep.deposit_id).await.unwrap().unwrap();
    assert_eq!(stored.status, DepositStatus::Approved);
    assert!(stored.approved_at.is_some());
    assert!(stored.processed_at.is_none());
    let ledger = api.db().fetch_ledger_for_deposit(&dep.deposit_id).await.unwrap().unwrap();
    assert_eq!(ledger.crediting, CreditingStatus::InFlight);
    assert!(ledger.credited_at.is_none());
    assert_eq!(crediting.call_count(), 1);

    // A redelivered callback retries the credit once the downstream recovers.
    crediting.succeed();
    let res = api.handle_callback(paid_callback("ord-4")).await.unwrap();
    assert_eq!(res, CallbackResolution::Applied {
        deposit_id: dep.deposit_id.clone(),
        status: DepositStatus::Completed
    });
    assert_eq!(crediting.call_count(), 2);
    let ledger = api.db().fetch_ledger_for_deposit(&dep.deposit_id).await.unwrap().unwrap();
    assert_eq!(ledger.crediting, CreditingStatus::Done);
}

#[tokio::test]
async fn crediting_rejection_is_never_auto_completed() {
    let (api, crediting) = new_api().await;
    let dep = seed_deposit(&api, "700127", "ord-5", None, "10.00").await;
    crediting.fail_with(CreditingError::Rejected("account is archived".to_string()));

    let res = api.handle_callback(paid_callback("ord-5")).await.unwrap();
    assert_eq!(res.status(), Some(DepositStatus::Approved));

    // The operator retries while the downstream still refuses: no state change.
    let res = api.retry_crediting(&dep.deposit_id).await.unwrap();
    assert_eq!(res.status(), Some(DepositStatus::Approved));
    assert_eq!(api.fetch_deposit(&dep.deposit_id).await.unwrap().unwrap().status, DepositStatus::Approved);

    // Once the downstream accepts, the operator retry completes the deposit.
    crediting.succeed();
    let res = api.retry_crediting(&dep.deposit_id).await.unwrap();
    assert_eq!(res, CallbackResolution::Applied {
        deposit_id: dep.deposit_id.clone(),
        status: DepositStatus::Completed
    });
    assert_eq!(crediting.call_count(), 3);
}

#[tokio::test]
async fn late_success_never_overrides_a_rejection() {
    let (api, crediting) = new_api().await;
    let dep = seed_deposit(&api, "700128", "ord-6", None, "10.00").await;

    let payload = signed(json!({"third_party_id": "ord-6", "status": "expired"}), SECRET);
    api.handle_callback(payload).await.unwrap();

    let res = api.handle_callback(paid_callback("ord-6")).await.expect("conflicts are still acknowledged");
    assert_eq!(res, CallbackResolution::Conflict {
        deposit_id: dep.deposit_id.clone(),
        status: DepositStatus::Rejected
    });
    assert_eq!(api.fetch_deposit(&dep.deposit_id).await.unwrap().unwrap().status, DepositStatus::Rejected);
    assert_eq!(crediting.call_count(), 0);
}

#[tokio::test]
async fn late_failure_never_overrides_a_completion() {
    let (api, crediting) = new_api().await;
    let dep = seed_deposit(&api, "700129", "ord-7", None, "10.00").await;
    api.handle_callback(paid_callback("ord-7")).await.unwrap();

    let payload = signed(json!({"third_party_id": "ord-7", "status": "cancelled"}), SECRET);
    let res = api.handle_callback(payload).await.unwrap();
    assert_eq!(res, CallbackResolution::Conflict {
        deposit_id: dep.deposit_id.clone(),
        status: DepositStatus::Completed
    });
    assert_eq!(crediting.call_count(), 1);
}

#[tokio::test]
async fn unmapped_statuses_are_acknowledged_without_mutation() {
    let (api, crediting) = new_api().await;
    let dep = seed_deposit(&api, "700130", "ord-8", None, "10.00").await;

    for status in ["on_hold", "Paid", "PAID", ""] {
        let payload = signed(json!({"third_party_id": "ord-8", "status": status}), SECRET);
        let res = api.handle_callback(payload).await.unwrap();
        assert_eq!(res, CallbackResolution::Unrecognized { status: status.to_string() });
    }
    assert_eq!(api.fetch_deposit(&dep.deposit_id).await.unwrap().unwrap().status, DepositStatus::Pending);
    assert!(api.db().fetch_ledger_for_deposit(&dep.deposit_id).await.unwrap().is_none());
    assert_eq!(crediting.call_count(), 0);
}

#[tokio::test]
async fn gateway_assigned_id_takes_precedence_over_the_merchant_id() {
    let (api, _crediting) = new_api().await;
    // d2's merchant order id collides with d1's gateway id; the gateway id match must win.
    let d1 = seed_deposit(&api, "700131", "ord-9", Some("CR-9009"), "10.00").await;
    let d2 = seed_deposit(&api, "700132", "CR-9009", None, "10.00").await;

    let payload = signed(json!({"cregis_id": "CR-9009", "status": "paid", "received_amount": "10.00"}), SECRET);
    let res = api.handle_callback(payload).await.unwrap();
    assert_eq!(res.deposit_id(), Some(&d1.deposit_id));
    assert_eq!(api.fetch_deposit(&d2.deposit_id).await.unwrap().unwrap().status, DepositStatus::Pending);

    // An unknown gateway id falls back to the merchant order id.
    let payload = signed(
        json!({"cregis_id": "CR-other", "third_party_id": "CR-9009", "status": "paid", "received_amount": "10.00"}),
        SECRET,
    );
    let res = api.handle_callback(payload).await.unwrap();
    assert_eq!(res.deposit_id(), Some(&d2.deposit_id));
}

#[tokio::test]
async fn deposit_registration_is_idempotent_on_the_order_id() {
    let (api, _crediting) = new_api().await;
    let first = NewDeposit::new("700133".to_string(), OrderId::from("ord-10".to_string()), Money::from_major_units(5), "USDT".to_string());
    let (d1, inserted) = api.register_deposit(first.clone()).await.unwrap();
    assert!(inserted);
    let (d2, inserted) = api.register_deposit(first).await.unwrap();
    assert!(!inserted);
    assert_eq!(d1.deposit_id, d2.deposit_id);
}
