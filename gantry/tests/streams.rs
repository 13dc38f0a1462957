//! End-to-end scenarios for the stream tick loop.

mod common;

use common::{request, return_value, Harness};

use gantry::protocol::{ResponseBody, Value};
use gantry::timing::Micros;
use gantry::{EngineConfig, StreamError};

fn harness() -> Harness {
    Harness::new(
        EngineConfig::default()
            .with_adaptive_rate_control(false)
            .with_max_time_per_update(Micros::new(50_000)),
    )
}

#[test]
fn updates_are_pushed_only_on_change() {
    let mut harness = harness();
    let client = harness.hub.connect("mem:alpha");
    harness.tick_at(0.0);

    harness
        .engine
        .add_stream(client.id(), &request("value", Vec::new()))
        .unwrap();

    harness.state.value.set(42);
    harness.tick_at(1.0);
    harness.tick_at(2.0);
    harness.state.value.set(43);
    harness.tick_at(3.0);

    let messages = client.take_stream_messages();
    assert_eq!(messages.len(), 2, "unchanged tick must be suppressed");

    assert_eq!(return_value(&messages[0].responses[0].response), Value::Int(42));
    assert_eq!(messages[0].responses[0].response.time, 1.0);
    assert_eq!(return_value(&messages[1].responses[0].response), Value::Int(43));
    assert_eq!(messages[1].responses[0].response.time, 3.0);
}

#[test]
fn identical_subscriptions_share_an_id_and_one_evaluation() {
    let mut harness = harness();
    let client = harness.hub.connect("mem:alpha");
    harness.tick_at(0.0);

    let first = harness
        .engine
        .add_stream(client.id(), &request("value", Vec::new()))
        .unwrap();
    let second = harness
        .engine
        .add_stream(client.id(), &request("value", Vec::new()))
        .unwrap();
    assert_eq!(first, second);

    harness.tick_at(1.0);
    assert_eq!(harness.engine.stats().stream_rpcs, 1, "evaluated once");
}

#[test]
fn batches_follow_subscription_order() {
    let mut harness = harness();
    let client = harness.hub.connect("mem:alpha");
    harness.tick_at(0.0);

    let first = harness
        .engine
        .add_stream(client.id(), &request("echo", vec![Value::Int(1)]))
        .unwrap();
    let second = harness
        .engine
        .add_stream(client.id(), &request("echo", vec![Value::Int(2)]))
        .unwrap();
    assert_ne!(first, second);

    harness.tick_at(1.0);
    let messages = client.take_stream_messages();
    assert_eq!(messages.len(), 1, "one batch per client per tick");
    let ids: Vec<_> = messages[0]
        .responses
        .iter()
        .map(|response| response.id)
        .collect();
    assert_eq!(ids, vec![first, second]);
    assert_eq!(return_value(&messages[0].responses[0].response), Value::Int(1));
    assert_eq!(return_value(&messages[0].responses[1].response), Value::Int(2));
}

#[test]
fn removed_streams_stop_updating_and_readd_is_fresh() {
    let mut harness = harness();
    let client = harness.hub.connect("mem:alpha");
    harness.tick_at(0.0);

    let id = harness
        .engine
        .add_stream(client.id(), &request("value", Vec::new()))
        .unwrap();
    harness.state.value.set(10);
    harness.tick_at(1.0);
    assert_eq!(client.take_stream_messages().len(), 1);

    harness.engine.remove_stream(client.id(), id);
    harness.state.value.set(11);
    harness.tick_at(2.0);
    assert!(client.take_stream_messages().is_empty());
    assert_eq!(harness.engine.stats().stream_rpcs, 0);

    // Re-adding the same request allocates a new id with a cleared cache,
    // so the current value is sent again even if it never changed.
    let fresh = harness
        .engine
        .add_stream(client.id(), &request("value", Vec::new()))
        .unwrap();
    assert_ne!(fresh, id);
    harness.tick_at(3.0);
    let messages = client.take_stream_messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(return_value(&messages[0].responses[0].response), Value::Int(11));
}

#[test]
fn clients_without_a_stream_peer_are_rejected() {
    let mut harness = harness();
    let client = harness.hub.connect_rpc_only("mem:alpha");
    harness.tick_at(0.0);

    let result = harness
        .engine
        .add_stream(client.id(), &request("value", Vec::new()));
    assert!(matches!(result, Err(StreamError::NoStreamChannel)));
}

#[test]
fn setup_errors_surface_synchronously() {
    let mut harness = harness();
    let client = harness.hub.connect("mem:alpha");
    harness.tick_at(0.0);

    let result = harness
        .engine
        .add_stream(client.id(), &request("nope", Vec::new()));
    assert!(matches!(result, Err(StreamError::Call(_))));

    // The failed setup left nothing behind.
    harness.tick_at(1.0);
    assert!(client.take_stream_messages().is_empty());
    assert_eq!(harness.engine.stats().stream_rpcs, 0);
}

#[test]
fn failing_procedures_report_errors_every_tick() {
    let mut harness = harness();
    let client = harness.hub.connect("mem:alpha");
    harness.tick_at(0.0);

    harness
        .engine
        .add_stream(client.id(), &request("fail", Vec::new()))
        .unwrap();
    harness.tick_at(1.0);
    harness.tick_at(2.0);

    let messages = client.take_stream_messages();
    assert_eq!(messages.len(), 2, "errors are not diffed away");
    for message in &messages {
        let ResponseBody::Error(text) = &message.responses[0].response.body else {
            panic!("expected error response");
        };
        assert_eq!(text, "stale vessel handle");
    }
}

#[test]
fn every_invocation_counts_even_when_suppressed() {
    let mut harness = harness();
    let client = harness.hub.connect("mem:alpha");
    harness.tick_at(0.0);

    harness
        .engine
        .add_stream(client.id(), &request("value", Vec::new()))
        .unwrap();
    harness.state.value.set(5);
    harness.tick_at(1.0);
    harness.tick_at(2.0);

    assert_eq!(client.take_stream_messages().len(), 1);
    let stats = harness.engine.stats();
    assert_eq!(stats.stream_rpcs, 1, "most recent tick");
    assert_eq!(stats.stream_rpcs_executed, 2, "suppressed sends still count");
}

#[test]
fn stream_disconnect_drops_subscriptions() {
    let mut harness = harness();
    let client = harness.hub.connect("mem:alpha");
    harness.tick_at(0.0);

    harness
        .engine
        .add_stream(client.id(), &request("value", Vec::new()))
        .unwrap();
    client.disconnect();
    harness.tick_at(1.0);

    assert_eq!(harness.observer.stream_disconnected.get(), 1);
    assert_eq!(harness.engine.stats().stream_rpcs, 0);
    assert!(client.take_stream_messages().is_empty());
}
