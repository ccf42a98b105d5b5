mod support;

use embassy_futures::block_on;
use embassy_time::Duration;
use myrtio_link::runtime::{MessageChannel, PublishRequestChannel, PublisherHandle, SessionRuntime};
use support::*;

#[test]
fn forwarding_stops_at_channel_capacity() {
    let h = Harness::new();
    let mut store = store();
    let messages: MessageChannel<2> = MessageChannel::new();
    let requests: PublishRequestChannel<4> = PublishRequestChannel::new();

    let mut runtime = SessionRuntime::new(
        h.session(options(), &mut store),
        messages.sender(),
        requests.receiver(),
        Duration::from_millis(100),
    );
    block_on(runtime.session_mut().begin()).unwrap();

    for i in 0..4 {
        h.mqtt.deliver(PING_TOPIC, format!(r#"{{"c":"CMD{i}"}}"#).as_bytes());
    }
    block_on(runtime.session_mut().tick()).unwrap();

    assert_eq!(runtime.forward_pending(), 2);
    assert_eq!(runtime.session().pending(), 2);
    assert_eq!(runtime.forward_pending(), 0);

    assert_eq!(messages.try_receive().unwrap().code(), "cmd0");
    assert_eq!(messages.try_receive().unwrap().code(), "cmd1");

    assert_eq!(runtime.forward_pending(), 2);
    assert_eq!(runtime.session().pending(), 0);
    assert_eq!(messages.try_receive().unwrap().code(), "cmd2");
    assert_eq!(messages.try_receive().unwrap().code(), "cmd3");
}

#[test]
fn publish_requests_are_sent_while_connected() {
    let h = Harness::new();
    let mut store = store();
    let messages: MessageChannel<2> = MessageChannel::new();
    let requests: PublishRequestChannel<4> = PublishRequestChannel::new();
    let publisher = PublisherHandle::new(requests.sender());

    let mut runtime = SessionRuntime::new(
        h.session(options(), &mut store),
        messages.sender(),
        requests.receiver(),
        Duration::from_millis(100),
    );
    block_on(runtime.session_mut().begin()).unwrap();

    assert!(publisher.try_publish_reading("humidity", 40.0));
    assert!(publisher.try_publish("device/0b6f8c2e/state", b"on", false));
    assert_eq!(block_on(runtime.drain_requests()), 2);

    let published = h.mqtt.published();
    assert_eq!(published.len(), 3);
    assert_eq!(published[1].topic, "device/sensors/humidity");
    assert_eq!(published[1].payload, b"40.00");
    assert!(published[1].retain);
    assert_eq!(published[2].payload, b"on");
    assert!(!published[2].retain);
}

#[test]
fn requests_taken_while_disconnected_are_dropped() {
    let h = Harness::new();
    let mut store = store();
    let messages: MessageChannel<2> = MessageChannel::new();
    let requests: PublishRequestChannel<4> = PublishRequestChannel::new();
    let publisher = PublisherHandle::new(requests.sender());

    let mut runtime = SessionRuntime::new(
        h.session(options(), &mut store),
        messages.sender(),
        requests.receiver(),
        Duration::from_millis(100),
    );

    assert!(publisher.try_publish_reading("humidity", 40.0));
    assert_eq!(block_on(runtime.drain_requests()), 1);
    assert!(h.mqtt.published().is_empty());
}
