use lib_pvcore::configs::{build_connection, CsWebConfig};
use lib_pvcore::{DType, Store};
use project_tests::wait_until;
use tokio_util::sync::CancellationToken;

fn simulator_store() -> Store {
    let config = CsWebConfig::defaults();
    let connection = build_connection(&config).expect("build transports");
    Store::new(connection, config.throttle())
}

#[tokio::test]
async fn test_local_pv_write_then_read() {
    let store = simulator_store();
    let sender = store.sender();
    let mut reader = store.reader();
    let shutdown = CancellationToken::new();
    let store_task = tokio::spawn(store.run(shutdown.clone()));

    sender.subscribe("gauge", "loc://setpoint(5)", None);
    sender.subscribe("slider", "loc://setpoint", None);

    assert!(
        wait_until(&mut reader, |r| {
            r.select_pv_state("loc://setpoint(5)").0.is_some_and(|s| {
                s.connected && !s.readonly && s.value.as_ref().and_then(DType::get_double_value) == Some(5.0)
            })
        })
        .await
    );
    let (_, effective) = reader.select_pv_state("loc://setpoint(5)");
    assert_eq!(effective, "loc://setpoint");

    sender.write_pv("loc://setpoint", DType::from_double(9.0));
    assert!(
        wait_until(&mut reader, |r| {
            let states = r.select_pv_states(&["loc://setpoint(5)", "loc://setpoint"]);
            states.values().all(|(state, _)| {
                state.as_ref().and_then(|s| s.value.as_ref()).and_then(DType::get_double_value)
                    == Some(9.0)
            })
        })
        .await
    );

    shutdown.cancel();
    let store = store_task.await.expect("store task");
    let state = store.reader().snapshot();
    assert_eq!(state.subscriber_count("loc://setpoint"), 2);
}

#[tokio::test]
async fn test_local_enum_accepts_labels() {
    let store = simulator_store();
    let sender = store.sender();
    let mut reader = store.reader();
    let shutdown = CancellationToken::new();
    let store_task = tokio::spawn(store.run(shutdown.clone()));

    let pv = r#"loc://mode<VEnum>(2, "Off", "On", "Auto")"#;
    sender.subscribe("selector", pv, None);
    assert!(
        wait_until(&mut reader, |r| {
            r.select_pv_state(pv).0.and_then(|s| s.value).and_then(|v| v.get_string_value()).as_deref()
                == Some("On")
        })
        .await
    );

    sender.write_pv(pv, DType::from_string("Auto"));
    assert!(
        wait_until(&mut reader, |r| {
            r.select_pv_state("loc://mode").0.and_then(|s| s.value).and_then(|v| v.get_double_value())
                == Some(2.0)
        })
        .await
    );

    shutdown.cancel();
    let _ = store_task.await;
}

#[tokio::test]
async fn test_sine_generator_is_readonly_and_ticks() {
    let store = simulator_store();
    let sender = store.sender();
    let mut reader = store.reader();
    let shutdown = CancellationToken::new();
    let store_task = tokio::spawn(store.run(shutdown.clone()));

    sender.subscribe("plot", "sim://sine", None);
    assert!(
        wait_until(&mut reader, |r| {
            r.select_pv_state("sim://sine").0.is_some_and(|s| {
                s.connected && s.readonly && s.value.as_ref().and_then(DType::get_double_value).is_some()
            })
        })
        .await
    );

    // The write is rejected. A later subscription marks when it was handled.
    sender.write_pv("sim://sine", DType::from_double(100.0));
    sender.subscribe("plot", "loc://marker(1)", None);
    assert!(wait_until(&mut reader, |r| r.select_pv_state("loc://marker").0.is_some()).await);

    let value = reader
        .select_pv_state("sim://sine")
        .0
        .and_then(|s| s.value)
        .and_then(|v| v.get_double_value())
        .expect("sine value");
    assert!((-1.0..=1.0).contains(&value));

    shutdown.cancel();
    let _ = store_task.await;
}
