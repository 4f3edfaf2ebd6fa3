//! Property tests through the async facade.
//!
//! Whatever the window size, messages reach the server in the order they
//! were sent and carry the recipient and extra options the caller gave.

use ccs_client::{Client, ClientConfig, ClientEvent, SendOptions, SessionConfig};
use ccs_harness::{SimEnv, SimTransport};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

type Sent = (String, String, Map<String, Value>);

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

async fn deliver_all(
    capacity: usize,
    sends: &[(String, Option<String>)],
) -> (Vec<Sent>, Vec<Sent>) {
    let session = SessionConfig::default().with_capacity(capacity);
    let config = ClientConfig::new("123456789", "server-key").with_session(session);
    let (client, handle, mut events) = Client::start(config, SimEnv::new());
    let (server, _task) = SimTransport::new(handle).spawn();

    client.connect().unwrap();
    assert_eq!(events.next().await, Some(ClientEvent::Connected));

    let mut expected = Vec::new();
    let mut pending = Vec::new();
    for (to, key) in sends {
        // Reserved keys are refused; the message goes out without extras.
        let options = key
            .as_ref()
            .and_then(|key| SendOptions::new().with_extra(key.clone(), json!(to)).ok())
            .unwrap_or_default();
        let delivery = client.send(to.clone(), None, options.clone()).unwrap();
        expected.push((delivery.message_id().to_string(), to.clone(), options.extra().clone()));
        pending.push(delivery);
    }

    for delivery in pending {
        let id = delivery.message_id().clone();
        assert_eq!(delivery.await.unwrap().message_id, id);
    }

    let server = server.lock().unwrap();
    let received = server
        .downstream()
        .map(|m| (m.message_id.to_string(), m.to.clone(), m.options.extra().clone()))
        .collect();
    (expected, received)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_sends_arrive_in_order_with_options(
        capacity in 1usize..=10,
        sends in prop::collection::vec(
            ("[a-z0-9]{1,12}", prop::option::of("[a-z_]{1,12}")),
            1..40,
        ),
    ) {
        let (expected, received) = runtime().block_on(deliver_all(capacity, &sends));
        prop_assert_eq!(received, expected);
    }
}
