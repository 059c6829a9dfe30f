//! Concurrency test: callbacks for different deposits must be processed fully in parallel with no
//! cross-deposit interference, while every per-deposit outcome stays exactly-once.
use std::sync::Arc;

use crm_common::{Money, Secret};
use crm_payment_engine::{
    db_types::{DepositStatus, NewDeposit, OrderId},
    events::EventProducers,
    helpers::{callback_signature, signing_params},
    test_utils::{prepare_env::prepare_test_env, RecordingCrediting},
    CallbackResolution,
    DepositFlowApi,
    SqliteDatabase,
};
use log::*;
use serde_json::{json, Value};
use tokio::runtime::Runtime;

const NUM_DEPOSITS: u64 = 20;
const SECRET: &str = "test-secret";

fn signed(mut payload: Value) -> Value {
    let sign = callback_signature(&signing_params(&payload), SECRET);
    payload["sign"] = Value::String(sign);
    payload
}

#[test]
fn burst_callbacks() {
    info!("🚀️ Starting callback burst test");

    let sys = Runtime::new().unwrap();

    sys.block_on(async move {
        let url = "sqlite://../data/test_burst_callbacks.db";
        prepare_test_env(url).await;
        let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating database");
        let crediting = RecordingCrediting::new();
        let api = Arc::new(DepositFlowApi::new(
            db,
            crediting.clone(),
            Secret::new(SECRET.to_string()),
            EventProducers::default(),
        ));

        info!("🚀️ Seeding {NUM_DEPOSITS} deposits");
        for i in 0..NUM_DEPOSITS {
            let deposit = NewDeposit::new(
                format!("70{i:04}"),
                OrderId::from(format!("burst-ord-{i}")),
                Money::from_major_units(5),
                "USDT".to_string(),
            );
            api.register_deposit(deposit).await.expect("Error registering deposit");
        }

        info!("🚀️ Injecting {NUM_DEPOSITS} concurrent callbacks");
        let mut handles = Vec::with_capacity(NUM_DEPOSITS as usize);
        for i in 0..NUM_DEPOSITS {
            let api = Arc::clone(&api);
            handles.push(tokio::spawn(async move {
                let payload = signed(json!({
                    "third_party_id": format!("burst-ord-{i}"),
                    "status": "paid",
                    "received_amount": "5.00",
                    "tx_hash": format!("tx-{i}"),
                }));
                api.handle_callback(payload).await
            }));
        }
        for handle in handles {
            let res = handle.await.expect("task panicked").expect("Error handling callback");
            assert!(
                matches!(res, CallbackResolution::Applied { status: DepositStatus::Completed, .. }),
                "unexpected resolution: {res:?}"
            );
        }
        assert_eq!(crediting.call_count(), NUM_DEPOSITS as usize);

        // every deposit was credited exactly once, under its own idempotency key
        let mut keys = crediting.calls().into_iter().map(|c| c.idempotency_key).collect::<Vec<_>>();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), NUM_DEPOSITS as usize);
    });
    info!("🚀️ test complete");
}
