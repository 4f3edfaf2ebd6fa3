//! Delivery window and lifecycle scenarios against a scripted server.

use ccs_core::{
    AckResult, ConnectionState, Delivered, DeliveryError, Notification, SessionConfig,
};
use ccs_harness::{InvariantRegistry, SimDriver, SimServer};
use ccs_proto::{ACK_WINDOW, Envelope, MessageId, RawInbound};
use serde_json::json;
use tokio::sync::oneshot;

type Driver = SimDriver<oneshot::Sender<AckResult>>;

struct Sent {
    id: MessageId,
    rx: oneshot::Receiver<AckResult>,
}

fn online(config: SessionConfig) -> Driver {
    let mut driver = Driver::new(42, config);
    driver.go_online();
    driver
}

fn send(driver: &mut Driver, n: usize) -> Vec<Sent> {
    (0..n)
        .map(|i| {
            let (tx, rx) = oneshot::channel();
            let id = driver.send("device-token", Some(json!({"seq": i})), tx);
            Sent { id, rx }
        })
        .collect()
}

fn check(driver: &Driver, context: &str) {
    InvariantRegistry::standard().assert_all(&driver.snapshot(), context);
}

#[test]
fn window_admits_exactly_capacity() {
    let mut driver = online(SessionConfig::default());

    let sent = send(&mut driver, ACK_WINDOW);
    let snapshot = driver.snapshot();
    assert_eq!(snapshot.occupied, ACK_WINDOW);
    assert_eq!(snapshot.backlog, 0);
    assert!(driver.session.is_saturated());

    let extra = send(&mut driver, 1);
    let snapshot = driver.snapshot();
    assert_eq!(snapshot.occupied, ACK_WINDOW);
    assert_eq!(snapshot.backlog, 1);

    let expected: Vec<_> = sent.iter().chain(&extra).map(|s| s.id.clone()).collect();
    assert_eq!(snapshot.outstanding, expected);
    assert_eq!(driver.server.downstream().count(), ACK_WINDOW);
    check(&driver, "after overflow");
}

#[test]
fn hundred_fifty_messages_flush_through_window() {
    let mut driver = online(SessionConfig::default());
    let mut sent = send(&mut driver, 150);

    assert_eq!(driver.server.downstream().count(), 100);
    assert_eq!(driver.snapshot().backlog, 50);

    // Acking the first hundred releases the backlog.
    assert_eq!(driver.ack_all(false), 100);
    check(&driver, "after first batch");
    assert_eq!(driver.server.downstream().count(), 150);
    assert_eq!(driver.snapshot().occupied, 50);
    assert_eq!(driver.snapshot().backlog, 0);

    assert_eq!(driver.ack_all(false), 50);
    let snapshot = driver.snapshot();
    assert_eq!(snapshot.occupied, 0);
    assert_eq!(snapshot.backlog, 0);

    for s in &mut sent {
        let delivered = s.rx.try_recv().unwrap().unwrap();
        assert_eq!(delivered.message_id, s.id);
        assert_eq!(delivered.from.as_deref(), Some("device-token"));
    }
}

#[test]
fn released_slots_admit_oldest_held_first() {
    let mut driver = online(SessionConfig::default().with_capacity(2));
    let sent = send(&mut driver, 5);

    // Out-of-order ack still admits held messages in send order.
    driver.ack(&sent[1].id);
    driver.nack(&sent[0].id, "BAD_REGISTRATION");

    let order: Vec<_> = driver.server.downstream().map(|m| m.message_id.clone()).collect();
    assert_eq!(order, vec![
        sent[0].id.clone(),
        sent[1].id.clone(),
        sent[2].id.clone(),
        sent[3].id.clone()
    ]);
    assert_eq!(driver.snapshot().backlog, 1);
    check(&driver, "after partial release");
}

#[test]
fn nack_fails_only_its_own_message() {
    let mut driver = online(SessionConfig::default());
    let mut sent = send(&mut driver, 2);

    driver.nack(&sent[0].id, "DEVICE_UNREGISTERED");

    match sent[0].rx.try_recv().unwrap() {
        Err(DeliveryError::Nack { code, message_id, from, .. }) => {
            assert_eq!(code, "DEVICE_UNREGISTERED");
            assert_eq!(message_id, sent[0].id);
            assert_eq!(from.as_deref(), Some("device-token"));
        },
        other => panic!("expected nack, got {other:?}"),
    }
    assert!(sent[1].rx.try_recv().is_err());
    assert_eq!(driver.snapshot().occupied, 1);
}

#[test]
fn unknown_and_repeated_acks_are_noops() {
    let mut driver = online(SessionConfig::default());
    let mut sent = send(&mut driver, 1);

    driver.deliver(&SimServer::ack_message(&MessageId::new("never-sent"), None));
    assert_eq!(driver.snapshot().occupied, 1);

    driver.ack(&sent[0].id);
    driver.deliver(&SimServer::ack_message(&sent[0].id, None));
    driver.deliver(&SimServer::nack_message(&sent[0].id, None, "LATE"));

    assert_eq!(driver.snapshot().occupied, 0);
    assert!(sent[0].rx.try_recv().unwrap().is_ok());
    assert!(driver.notifications().iter().all(|n| !matches!(n, Notification::Error { .. })));
}

#[test]
fn sends_before_online_wait_for_connection() {
    let mut driver = Driver::new(1, SessionConfig::default());
    let sent = send(&mut driver, 3);

    assert_eq!(driver.server.received().len(), 0);
    assert_eq!(driver.snapshot().backlog, 3);

    driver.session.connect().unwrap();
    assert_eq!(driver.server.received().len(), 0);

    driver.online();
    let order: Vec<_> = driver.server.downstream().map(|m| m.message_id.clone()).collect();
    assert_eq!(order, sent.iter().map(|s| s.id.clone()).collect::<Vec<_>>());
    assert_eq!(driver.notifications(), [Notification::Connected]);
}

#[test]
fn draining_stops_admission_but_resolves_pending() {
    let mut driver = online(SessionConfig::default().with_capacity(2));
    let mut sent = send(&mut driver, 2);

    driver.deliver(&SimServer::draining());
    assert_eq!(driver.session.state(), ConnectionState::Draining);

    let held = send(&mut driver, 1);
    driver.ack(&sent[0].id);

    assert!(sent[0].rx.try_recv().unwrap().is_ok());
    assert_eq!(driver.server.downstream().count(), 2);
    assert_eq!(driver.snapshot().occupied, 1);
    assert_eq!(driver.snapshot().backlog, 1);
    assert_eq!(driver.server.times_received(&held[0].id), 0);
}

#[test]
fn reconnect_retransmits_each_pending_message_once() {
    let mut driver = online(SessionConfig::default().with_capacity(3));
    let sent = send(&mut driver, 5);
    driver.ack(&sent[0].id);

    driver.drain_and_reconnect();
    check(&driver, "after reconnect");

    assert_eq!(driver.connect_requests(), 2);
    // Pending before the drain: 1, 2, 3. Held: 4.
    for s in &sent[1..4] {
        assert_eq!(driver.server.times_received(&s.id), 2, "{} retransmitted once", s.id);
    }
    assert_eq!(driver.server.times_received(&sent[0].id), 1);
    assert_eq!(driver.server.times_received(&sent[4].id), 0);

    // A later ack for a retransmitted id still resolves it.
    driver.ack(&sent[1].id);
    assert_eq!(driver.server.times_received(&sent[4].id), 1);
}

#[test]
fn unexpected_close_disconnects_without_reconnect() {
    let mut driver = online(SessionConfig::default());
    let _sent = send(&mut driver, 1);

    driver.closed();

    assert_eq!(driver.session.state(), ConnectionState::Disconnected);
    assert_eq!(driver.connect_requests(), 1);
    assert_eq!(driver.notifications().last(), Some(&Notification::Disconnected));

    // Caller may reconnect; pending is retransmitted.
    driver.go_online();
    assert_eq!(driver.server.downstream().count(), 2);
}

#[test]
fn upstream_message_is_acked_once_and_published() {
    let mut driver = online(SessionConfig::default());
    driver.take_notifications();

    driver.deliver(&SimServer::upstream("up-1", "device-a", "com.example", Some(json!({"k": 1}))));

    let acks: Vec<_> = driver.server.upstream_acks().collect();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].to, "device-a");
    assert_eq!(acks[0].message_id, MessageId::new("up-1"));
    assert_eq!(driver.notifications(), [Notification::Message {
        message_id: MessageId::new("up-1"),
        from: "device-a".into(),
        category: Some("com.example".into()),
        data: json!({"k": 1}),
    }]);
}

#[test]
fn upstream_without_data_is_acked_silently() {
    let mut driver = online(SessionConfig::default());
    driver.take_notifications();

    driver.deliver(&SimServer::upstream("up-2", "device-b", "com.example", None));

    assert_eq!(driver.server.upstream_acks().count(), 1);
    assert!(driver.notifications().is_empty());
}

#[test]
fn upstream_without_sender_is_dropped() {
    let mut driver = online(SessionConfig::default());
    driver.take_notifications();

    driver.deliver(&RawInbound::Message(json!({"message_id": "x", "data": {}}).to_string()));
    driver.deliver(&RawInbound::Message("{not json".into()));

    assert_eq!(driver.server.received().len(), 0);
    assert!(driver.notifications().is_empty());
}

#[test]
fn receipt_is_published_without_touching_window() {
    let mut driver = online(SessionConfig::default());
    let sent = send(&mut driver, 1);
    driver.take_notifications();

    driver.deliver(&SimServer::receipt("dr2:1", &sent[0].id, "device-token"));

    assert_eq!(driver.snapshot().occupied, 1);
    assert!(matches!(
        driver.notifications(),
        [Notification::Receipt { message_id, .. }] if message_id.as_str() == "dr2:1"
    ));
}

#[test]
fn destroy_rejects_everything_and_stops_sending() {
    let mut driver = online(SessionConfig::default().with_capacity(2));
    let mut sent = send(&mut driver, 4);

    driver.destroy();
    check(&driver, "after destroy");

    for s in &mut sent {
        assert!(matches!(s.rx.try_recv().unwrap(), Err(DeliveryError::Shutdown { .. })));
    }
    assert_eq!(driver.disconnect_requests(), 1);

    let mut late = send(&mut driver, 1);
    assert!(matches!(late[0].rx.try_recv().unwrap(), Err(DeliveryError::Shutdown { .. })));
    assert_eq!(driver.server.downstream().count(), 2);

    // Acks after destroy resolve nothing.
    driver.ack(&sent[0].id);
    assert_eq!(driver.snapshot().occupied, 0);
}

#[test]
fn end_waits_for_pending_then_closes_once() {
    let mut driver = online(SessionConfig::default());
    let mut sent = send(&mut driver, 3);

    driver.end();
    assert_eq!(driver.disconnect_requests(), 0);

    driver.ack(&sent[2].id);
    driver.ack(&sent[0].id);
    assert_eq!(driver.disconnect_requests(), 0);

    driver.nack(&sent[1].id, "INVALID_JSON");
    assert_eq!(driver.disconnect_requests(), 1);
    assert_eq!(driver.session.state(), ConnectionState::Shutdown);

    driver.closed();
    driver.end();
    assert_eq!(driver.disconnect_requests(), 1);
    assert_eq!(driver.notifications().last(), Some(&Notification::Disconnected));
    check(&driver, "after end");

    assert!(sent[0].rx.try_recv().unwrap().is_ok());
    assert!(sent[1].rx.try_recv().unwrap().is_err());
}

#[test]
fn end_keeps_flushing_backlog_while_online() {
    let mut driver = online(SessionConfig::default().with_capacity(1));
    let mut sent = send(&mut driver, 2);

    driver.end();
    driver.ack(&sent[0].id);
    assert_eq!(driver.disconnect_requests(), 0);
    assert_eq!(driver.server.times_received(&sent[1].id), 1);

    driver.ack(&sent[1].id);
    assert_eq!(driver.disconnect_requests(), 1);
    assert_eq!(
        sent[1].rx.try_recv().unwrap(),
        Ok(Delivered { message_id: sent[1].id.clone(), from: Some("device-token".into()) })
    );
}

#[test]
fn end_without_connection_rejects_held_messages() {
    let mut driver = Driver::new(3, SessionConfig::default());
    let mut sent = send(&mut driver, 2);

    driver.end();

    assert_eq!(driver.session.state(), ConnectionState::Shutdown);
    assert_eq!(driver.disconnect_requests(), 0);
    for s in &mut sent {
        assert!(matches!(s.rx.try_recv().unwrap(), Err(DeliveryError::Shutdown { .. })));
    }
}

#[test]
fn error_before_first_online_ends_attempt() {
    let mut driver = Driver::new(4, SessionConfig::default());
    driver.session.connect().unwrap();
    driver.error("SASL authentication failed");

    assert_eq!(driver.session.state(), ConnectionState::Disconnected);
    assert_eq!(driver.notifications(), [
        Notification::Error { reason: "SASL authentication failed".into() },
        Notification::Disconnected,
    ]);

    // Close arriving after the failure is not reported twice.
    driver.closed();
    assert_eq!(driver.notifications().len(), 2);
}

#[test]
fn error_stanza_is_published_as_message_error() {
    let mut driver = online(SessionConfig::default());
    driver.take_notifications();

    driver.deliver(&RawInbound::ErrorStanza { text: Some("InvalidJson".into()) });

    assert_eq!(driver.notifications(), [Notification::MessageError {
        text: Some("InvalidJson".into())
    }]);
}

#[test]
fn acks_are_written_as_ack_envelopes() {
    let mut driver = online(SessionConfig::default());
    driver.deliver(&SimServer::upstream("up-3", "device-c", "com.example", Some(json!({}))));

    assert!(matches!(driver.server.received(), [Envelope::Ack(ack)] if ack.to == "device-c"));
}
