use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use twinbridge::registry::mock::{MockAction, MockProperty};
use twinbridge::remote::mock::MockTwin;
use twinbridge::{
    ActionSpec, DeviceId, DeviceModel, DeviceTwin, JsonCodec, ResourceHandle, ResourceRegistry,
    SyncEngine, TwinEvent,
};

async fn make_engine(
    model: DeviceModel,
    registry: Arc<ResourceRegistry>,
    twin: Arc<MockTwin>,
    push_interval: Duration,
) -> Arc<SyncEngine> {
    Arc::new(
        SyncEngine::wire(
            DeviceId::new("dev-42"),
            model,
            registry,
            twin as Arc<dyn DeviceTwin>,
            Arc::new(JsonCodec),
            push_interval,
        )
        .await,
    )
}

fn sensor_model() -> DeviceModel {
    DeviceModel::new("urn:dev:wot:example:sensor", "sensorModel")
}

async fn add_property(registry: &ResourceRegistry, name: &str, value: Value) -> Arc<MockProperty> {
    let prop = Arc::new(MockProperty::new(value));
    assert!(
        registry
            .add(
                name,
                ResourceHandle::Property(
                    Arc::clone(&prop) as Arc<dyn twinbridge::PropertyHandle>
                ),
            )
            .await
    );
    prop
}

async fn add_action(registry: &ResourceRegistry, name: &str) -> Arc<MockAction> {
    let act = Arc::new(MockAction::new());
    assert!(
        registry
            .add(
                name,
                ResourceHandle::Action(Arc::clone(&act) as Arc<dyn twinbridge::ActionHandle>),
            )
            .await
    );
    act
}

// ── Outbound snapshot ────────────────────────────────────────────

#[tokio::test]
async fn snapshot_contains_all_readable_properties() {
    let registry = Arc::new(ResourceRegistry::new());
    add_property(&registry, "temp", json!(21)).await;
    add_property(&registry, "hum", json!(40)).await;
    add_action(&registry, "toggle").await;

    let twin = MockTwin::new();
    let engine = make_engine(sensor_model(), registry, twin, Duration::from_secs(10)).await;

    let batch = engine.collect_snapshot().await;
    assert_eq!(batch.len(), 2);
    assert_eq!(batch["temp"], json!(21));
    assert_eq!(batch["hum"], json!(40));
}

#[tokio::test]
async fn failing_reads_are_skipped_not_fatal() {
    let registry = Arc::new(ResourceRegistry::new());
    add_property(&registry, "a", json!(1)).await;
    let bad = add_property(&registry, "b", json!(2)).await;
    add_property(&registry, "c", json!(3)).await;
    bad.fail_reads(true);

    let twin = MockTwin::new();
    let engine = make_engine(
        sensor_model(),
        registry,
        Arc::clone(&twin),
        Duration::from_secs(10),
    )
    .await;

    // N = 3, K = 1: the batch still goes out with exactly N - K entries.
    engine.push_once().await;

    let updates = twin.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].len(), 2);
    assert_eq!(updates[0]["a"], json!(1));
    assert_eq!(updates[0]["c"], json!(3));
}

#[tokio::test]
async fn all_reads_failing_still_sends_empty_batch() {
    let registry = Arc::new(ResourceRegistry::new());
    let prop = add_property(&registry, "temp", json!(21)).await;
    prop.fail_reads(true);

    let twin = MockTwin::new();
    let engine = make_engine(
        sensor_model(),
        registry,
        Arc::clone(&twin),
        Duration::from_secs(10),
    )
    .await;

    engine.push_once().await;

    let updates = twin.updates();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].is_empty());
}

#[tokio::test]
async fn failed_send_does_not_stop_future_pushes() {
    let registry = Arc::new(ResourceRegistry::new());
    add_property(&registry, "temp", json!(21)).await;

    let twin = MockTwin::new();
    twin.fail_updates(true);
    let engine = make_engine(
        sensor_model(),
        registry,
        Arc::clone(&twin),
        Duration::from_secs(10),
    )
    .await;

    engine.push_once().await;
    twin.fail_updates(false);
    engine.push_once().await;

    // No buffering of the failed batch: each tick takes a fresh snapshot.
    assert_eq!(twin.update_count(), 2);
}

// ── Inbound writes ───────────────────────────────────────────────

#[tokio::test]
async fn inbound_write_applies_to_property() {
    let registry = Arc::new(ResourceRegistry::new());
    let prop = add_property(&registry, "temp", json!(21)).await;

    let twin = MockTwin::new();
    let engine = make_engine(sensor_model(), registry, twin, Duration::from_secs(10)).await;

    engine
        .handle_event(TwinEvent::AttributeChange {
            attribute: "temp".to_string(),
            value: json!(25),
        })
        .await;

    assert_eq!(prop.value(), json!(25));
}

#[tokio::test]
async fn inbound_write_to_unknown_attribute_is_a_noop() {
    let registry = Arc::new(ResourceRegistry::new());
    let prop = add_property(&registry, "temp", json!(21)).await;

    let twin = MockTwin::new();
    let engine = make_engine(sensor_model(), registry, twin, Duration::from_secs(10)).await;

    // Remote model may be a superset of local resources: unknown name is
    // ignored and later notifications still apply.
    engine
        .handle_event(TwinEvent::AttributeChange {
            attribute: "pressure".to_string(),
            value: json!(990),
        })
        .await;
    engine
        .handle_event(TwinEvent::AttributeChange {
            attribute: "temp".to_string(),
            value: json!(22),
        })
        .await;

    assert_eq!(prop.value(), json!(22));
}

#[tokio::test]
async fn inbound_write_to_action_name_is_ignored() {
    let registry = Arc::new(ResourceRegistry::new());
    let act = add_action(&registry, "toggle").await;

    let twin = MockTwin::new();
    let engine = make_engine(sensor_model(), registry, twin, Duration::from_secs(10)).await;

    engine
        .handle_event(TwinEvent::AttributeChange {
            attribute: "toggle".to_string(),
            value: json!(true),
        })
        .await;

    assert_eq!(act.invocation_count(), 0);
}

#[tokio::test]
async fn failing_write_does_not_affect_later_writes() {
    let registry = Arc::new(ResourceRegistry::new());
    let bad = add_property(&registry, "a", json!(1)).await;
    let good = add_property(&registry, "b", json!(2)).await;
    bad.fail_writes(true);

    let twin = MockTwin::new();
    let engine = make_engine(sensor_model(), registry, twin, Duration::from_secs(10)).await;

    engine
        .handle_event(TwinEvent::AttributeChange {
            attribute: "a".to_string(),
            value: json!(10),
        })
        .await;
    engine
        .handle_event(TwinEvent::AttributeChange {
            attribute: "b".to_string(),
            value: json!(20),
        })
        .await;

    assert_eq!(bad.value(), json!(1));
    assert_eq!(good.value(), json!(20));
}

// ── Action dispatch ──────────────────────────────────────────────

#[tokio::test]
async fn wiring_is_the_intersection_of_model_and_registry() {
    let registry = Arc::new(ResourceRegistry::new());
    add_action(&registry, "toggle").await;
    add_action(&registry, "rogue").await; // registry only — never wired

    // "ghost" is model only — skipped at wiring time.
    let model = sensor_model().with_actions(vec![
        ActionSpec::new("toggle", "tog"),
        ActionSpec::new("ghost", "gh"),
    ]);

    let twin = MockTwin::new();
    let engine = make_engine(model, registry, twin, Duration::from_secs(10)).await;

    assert_eq!(engine.wired_aliases(), vec!["tog"]);
}

#[tokio::test]
async fn invoke_dispatches_to_wired_action() {
    let registry = Arc::new(ResourceRegistry::new());
    let toggle = add_action(&registry, "toggle").await;

    let model = sensor_model().with_actions(vec![ActionSpec::new("toggle", "tog")]);
    let twin = MockTwin::new();
    let engine = make_engine(model, registry, twin, Duration::from_secs(10)).await;

    engine
        .handle_event(TwinEvent::ActionInvoke {
            alias: "tog".to_string(),
            params: json!({"speed": 3}),
        })
        .await;

    assert_eq!(toggle.invocations(), vec![json!({"speed": 3})]);
}

#[tokio::test]
async fn registry_only_action_never_receives_invocations() {
    let registry = Arc::new(ResourceRegistry::new());
    let rogue = add_action(&registry, "rogue").await;

    let twin = MockTwin::new();
    let engine = make_engine(sensor_model(), registry, twin, Duration::from_secs(10)).await;

    engine
        .handle_event(TwinEvent::ActionInvoke {
            alias: "rogue".to_string(),
            params: json!(null),
        })
        .await;

    assert_eq!(rogue.invocation_count(), 0);
}

#[tokio::test]
async fn failing_invoke_is_contained() {
    let registry = Arc::new(ResourceRegistry::new());
    let toggle = add_action(&registry, "toggle").await;
    toggle.fail(true);

    let model = sensor_model().with_actions(vec![ActionSpec::new("toggle", "tog")]);
    let twin = MockTwin::new();
    let engine = make_engine(model, registry, twin, Duration::from_secs(10)).await;

    engine
        .handle_event(TwinEvent::ActionInvoke {
            alias: "tog".to_string(),
            params: json!(null),
        })
        .await;

    toggle.fail(false);
    engine
        .handle_event(TwinEvent::ActionInvoke {
            alias: "tog".to_string(),
            params: json!(1),
        })
        .await;

    assert_eq!(toggle.invocations(), vec![json!(1)]);
}

// ── Validation errors ────────────────────────────────────────────

#[tokio::test]
async fn validation_error_is_observability_only() {
    let registry = Arc::new(ResourceRegistry::new());
    let prop = add_property(&registry, "temp", json!(21)).await;

    let twin = MockTwin::new();
    let engine = make_engine(sensor_model(), registry, twin, Duration::from_secs(10)).await;

    let mut attempted = HashMap::new();
    attempted.insert("temp".to_string(), json!(999));
    engine
        .handle_event(TwinEvent::ValidationError {
            attempted,
            message: "out of range".to_string(),
        })
        .await;

    // Local state untouched, engine still functional.
    assert_eq!(prop.value(), json!(21));
    engine
        .handle_event(TwinEvent::AttributeChange {
            attribute: "temp".to_string(),
            value: json!(22),
        })
        .await;
    assert_eq!(prop.value(), json!(22));
}

// ── Loop semantics (paused clock) ────────────────────────────────

#[tokio::test(start_paused = true)]
async fn ticks_never_overlap_under_slow_sends() {
    let registry = Arc::new(ResourceRegistry::new());
    add_property(&registry, "temp", json!(21)).await;

    let twin = MockTwin::new();
    // Each send takes 2.5 intervals: late ticks must be coalesced,
    // never queued behind the in-flight send.
    twin.set_update_delay(Duration::from_secs(25));
    let engine = make_engine(
        sensor_model(),
        registry,
        Arc::clone(&twin),
        Duration::from_secs(10),
    )
    .await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(engine.run(shutdown_rx));

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(twin.max_in_flight(), 1);
    // Sends at t=0..25 and t=30..55; a naive queue would have fired six.
    assert!(twin.update_count() <= 3);

    let _ = shutdown_tx.send(true);
    let _ = handle.await;
}

#[tokio::test(start_paused = true)]
async fn loop_processes_injected_events() {
    let registry = Arc::new(ResourceRegistry::new());
    let prop = add_property(&registry, "temp", json!(21)).await;
    let toggle = add_action(&registry, "toggle").await;

    let model = sensor_model().with_actions(vec![ActionSpec::new("toggle", "tog")]);
    let twin = MockTwin::new();
    let engine = make_engine(
        model,
        registry,
        Arc::clone(&twin),
        Duration::from_secs(10),
    )
    .await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(engine.run(shutdown_rx));

    twin.inject(TwinEvent::AttributeChange {
        attribute: "temp".to_string(),
        value: json!(30),
    })
    .await;
    twin.inject(TwinEvent::ActionInvoke {
        alias: "tog".to_string(),
        params: json!({"on": true}),
    })
    .await;

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(prop.value(), json!(30));
    assert_eq!(toggle.invocations(), vec![json!({"on": true})]);

    let _ = shutdown_tx.send(true);
    let _ = handle.await;
}

#[tokio::test(start_paused = true)]
async fn loop_exits_when_shutdown_sender_drops() {
    let registry = Arc::new(ResourceRegistry::new());
    add_property(&registry, "temp", json!(21)).await;

    let twin = MockTwin::new();
    let engine = make_engine(sensor_model(), registry, twin, Duration::from_secs(10)).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(engine.run(shutdown_rx));

    drop(shutdown_tx);
    // The loop must end rather than tick forever.
    handle.await.unwrap();
}
