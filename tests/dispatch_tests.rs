//! End-to-end dispatch tests
//!
//! Drives the registry, codec, and dispatcher through the mock transport the
//! same way the MQTT event loop does: raw frames in, concurrent handler
//! invocations out, failures isolated into the error-handler channel.


use bytes::Bytes;
use devgrid::dispatch::{Dispatcher, EventFilter, HandlerRegistry, WorkerPool};
use devgrid::error::SdkError;
use devgrid::protocol::{DownlinkMessage, AMQP_SCHEME, MQTT_SCHEME};
use devgrid::testing::MockTransport;
use devgrid::transport::{ShutdownMode, Transport, TransportError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DRAIN: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_end_to_end_uplink_activation_and_error_isolation() {
    let uplink_ok = Arc::new(AtomicUsize::new(0));
    let activations = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));

    let mut registry = HandlerRegistry::new();
    let uplink_counter = Arc::clone(&uplink_ok);
    registry
        .on_uplink(EventFilter::any(), move |event| {
            let uplink_counter = Arc::clone(&uplink_counter);
            async move {
                if event.payload.as_ref() == b"fail" {
                    return Err("payload decode failed".into());
                }
                uplink_counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();
    let activation_counter = Arc::clone(&activations);
    registry
        .on_activation(EventFilter::any(), move |_| {
            activation_counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .unwrap();
    let error_counter = Arc::clone(&errors);
    registry
        .on_error(move |error| {
            let error_counter = Arc::clone(&error_counter);
            async move {
                assert!(matches!(*error, SdkError::Handler(_)));
                assert!(error.to_string().contains("payload decode failed"));
                error_counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    let dispatcher = build_dispatcher(&mut registry);
    let transport = MockTransport::new(MQTT_SCHEME, dispatcher);

    // One well-formed uplink, one malformed two-segment frame, one frame
    // whose handler fails
    transport.inject_frame("app1/devices/dev1/up", Bytes::from_static(b"{\"led\":1}"));
    transport.inject_frame("app1/up", Bytes::from_static(b"junk"));
    transport.inject_frame("app1/devices/dev1/up", Bytes::from_static(b"fail"));

    assert!(transport.dispatcher().pool().drain(DRAIN).await);
    assert_eq!(uplink_ok.load(Ordering::SeqCst), 1);
    assert_eq!(activations.load(Ordering::SeqCst), 0);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_field_filtered_handler_receives_exact_channel() {
    let hits = Arc::new(AtomicUsize::new(0));

    let mut registry = HandlerRegistry::new();
    let counter = Arc::clone(&hits);
    registry
        .on_uplink(EventFilter::device("dev1").sub_path("led"), move |event| {
            let counter = Arc::clone(&counter);
            async move {
                assert_eq!(event.device_id, "dev1");
                assert_eq!(event.sub_path.as_deref(), Some("led"));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

    let dispatcher = build_dispatcher(&mut registry);
    let transport = MockTransport::new(MQTT_SCHEME, dispatcher);

    transport.inject_frame("app1/devices/dev1/up/led", Bytes::from_static(b"1"));
    // Wrong device, wrong field, bare channel: all filtered out
    transport.inject_frame("app1/devices/dev2/up/led", Bytes::from_static(b"1"));
    transport.inject_frame("app1/devices/dev1/up/temp", Bytes::from_static(b"1"));
    transport.inject_frame("app1/devices/dev1/up", Bytes::from_static(b"1"));

    assert!(transport.dispatcher().pool().drain(DRAIN).await);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_amqp_routing_keys_drive_the_same_engine() {
    let uplinks = Arc::new(AtomicUsize::new(0));
    let events = Arc::new(AtomicUsize::new(0));

    let mut registry = HandlerRegistry::new();
    let uplink_counter = Arc::clone(&uplinks);
    registry
        .on_uplink(EventFilter::device("dev1"), move |_| {
            uplink_counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .unwrap();
    let event_counter = Arc::clone(&events);
    registry
        .on_device_event(EventFilter::any().sub_path("down/acked"), move |_| {
            event_counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .unwrap();

    let dispatcher = build_dispatcher(&mut registry);
    let transport = MockTransport::new(AMQP_SCHEME, dispatcher);

    transport.inject_frame("app1.gw.dev1.up", Bytes::from_static(b"{}"));
    // Scheme mismatch: an MQTT-shaped topic is one dot-segment, dropped
    transport.inject_frame("app1/devices/dev1/up", Bytes::from_static(b"{}"));

    assert!(transport.dispatcher().pool().drain(DRAIN).await);
    assert_eq!(uplinks.load(Ordering::SeqCst), 1);
    assert_eq!(events.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connection_loss_is_observable_not_thrown() {
    let losses = Arc::new(AtomicUsize::new(0));

    let mut registry = HandlerRegistry::new();
    let loss_counter = Arc::clone(&losses);
    registry
        .on_error(move |error| {
            let loss_counter = Arc::clone(&loss_counter);
            async move {
                if matches!(
                    *error,
                    SdkError::Transport(TransportError::ConnectionLost(_))
                ) {
                    loss_counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
        .unwrap();

    let dispatcher = build_dispatcher(&mut registry);
    let mut transport = MockTransport::new(MQTT_SCHEME, dispatcher);

    transport.connect().await.unwrap();
    assert!(transport.is_connected());
    transport.inject_connection_loss("broker went away");

    assert!(transport.dispatcher().pool().drain(DRAIN).await);
    assert!(!transport.is_connected());
    assert_eq!(losses.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connect_handlers_fire_and_registration_seals() {
    let connects = Arc::new(AtomicUsize::new(0));

    let mut registry = HandlerRegistry::new();
    let connect_counter = Arc::clone(&connects);
    registry
        .on_connect(move || {
            connect_counter.fetch_add(1, Ordering::SeqCst);
            async {}
        })
        .unwrap();

    let dispatcher = build_dispatcher(&mut registry);
    let mut transport = MockTransport::new(MQTT_SCHEME, dispatcher);
    transport.connect().await.unwrap();

    assert!(transport.dispatcher().pool().drain(DRAIN).await);
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    // The registry sealed when the dispatcher was built
    let err = registry.on_connect(|| async {}).unwrap_err();
    assert!(matches!(
        err,
        devgrid::dispatch::DispatchError::AlreadyConnected
    ));
}

#[tokio::test]
async fn test_downlink_publishing_records_wire_form() {
    let mut registry = HandlerRegistry::new();
    let dispatcher = build_dispatcher(&mut registry);
    let transport = MockTransport::new(MQTT_SCHEME, dispatcher);

    transport
        .publish_downlink("dev1", &DownlinkMessage::from_raw([0x01, 0x02], 0))
        .await
        .unwrap();

    let published = transport.published_downlinks().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "dev1");
    // Port 0 normalized to 1 on construction
    assert_eq!(published[0].1.port, 1);
}

#[tokio::test]
async fn test_graceful_disconnect_drains_in_flight_handlers() {
    let finished = Arc::new(AtomicUsize::new(0));

    let mut registry = HandlerRegistry::new();
    let finish_counter = Arc::clone(&finished);
    registry
        .on_uplink(EventFilter::any(), move |_| {
            let finish_counter = Arc::clone(&finish_counter);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                finish_counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

    let dispatcher = build_dispatcher(&mut registry);
    let mut transport = MockTransport::new(MQTT_SCHEME, dispatcher);
    transport.connect().await.unwrap();

    for _ in 0..4 {
        transport.inject_frame("app1/devices/dev1/up", Bytes::from_static(b"{}"));
    }
    transport
        .disconnect(ShutdownMode::Graceful(DRAIN))
        .await
        .unwrap();

    assert_eq!(finished.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_no_ordering_guarantee_but_all_handlers_run() {
    let total = Arc::new(AtomicUsize::new(0));

    let mut registry = HandlerRegistry::new();
    for _ in 0..3 {
        let counter = Arc::clone(&total);
        registry
            .on_uplink(EventFilter::any(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .unwrap();
    }

    let dispatcher = build_dispatcher(&mut registry);
    let transport = MockTransport::new(MQTT_SCHEME, dispatcher);
    for _ in 0..5 {
        transport.inject_frame("app1/devices/dev1/up", Bytes::from_static(b"{}"));
    }

    assert!(transport.dispatcher().pool().drain(DRAIN).await);
    assert_eq!(total.load(Ordering::SeqCst), 15);
}

fn build_dispatcher(registry: &mut HandlerRegistry) -> Dispatcher {
    Dispatcher::new(registry.seal(), WorkerPool::new(8))
}

#[test]
fn test_helpers_config_parses() {
    let config = test_helpers::test_config();
    assert_eq!(config.app.id, "test-app");
    assert_eq!(config.dispatch.max_concurrency, 8);
}
