//! Fuzz target for the session state machine
//!
//! # Strategy
//!
//! - Random interleavings of sends, acks, nacks, junk inbound bodies,
//!   draining, transport errors, closes and deadline ticks
//! - Capacity from 1 up to the protocol window
//!
//! # Invariants
//!
//! - Standard session invariants hold after every operation
//! - Every completion fires exactly once by the end of `destroy`

#![no_main]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use arbitrary::Arbitrary;
use ccs_core::{AckResult, Callback, SessionConfig};
use ccs_harness::{InvariantRegistry, SimDriver, SimServer};
use ccs_proto::{MessageId, RawInbound};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum SessionOp {
    Send,
    Ack(u8),
    Nack(u8),
    Junk(String),
    Drain,
    Error,
    Close,
    Reconnect,
    Advance(u8),
    End,
}

#[derive(Debug, Arbitrary)]
struct Input {
    seed: u64,
    capacity: u8,
    ops: Vec<SessionOp>,
}

fuzz_target!(|input: Input| {
    let registry = InvariantRegistry::standard();
    let outcomes: Arc<Mutex<Vec<AckResult>>> = Arc::default();
    let config = SessionConfig::default()
        .with_capacity(usize::from(input.capacity))
        .with_ack_timeout(Duration::from_secs(30));

    let mut driver = SimDriver::new(input.seed, config);
    driver.go_online();

    let mut sent = Vec::new();

    for op in input.ops {
        let context = format!("after {op:?}");
        match op {
            SessionOp::Send => {
                let outcomes = Arc::clone(&outcomes);
                let completion = Callback(move |r| outcomes.lock().unwrap().push(r));
                let id = driver.send("token", None, completion);
                sent.push(id);
            },
            SessionOp::Ack(i) => {
                let unanswered = driver.server.unanswered();
                if !unanswered.is_empty() {
                    let id = unanswered[usize::from(i) % unanswered.len()].clone();
                    driver.ack(&id);
                }
            },
            SessionOp::Nack(i) => {
                let unanswered = driver.server.unanswered();
                if !unanswered.is_empty() {
                    let id = unanswered[usize::from(i) % unanswered.len()].clone();
                    driver.nack(&id, "INTERNAL_SERVER_ERROR");
                }
            },
            SessionOp::Junk(body) => driver.deliver(&RawInbound::Message(body)),
            SessionOp::Drain => driver.deliver(&SimServer::draining()),
            SessionOp::Error => driver.error("fuzz"),
            SessionOp::Close => driver.closed(),
            SessionOp::Reconnect => {
                if let Ok(actions) = driver.session.connect() {
                    driver.execute(actions);
                }
                driver.online();
            },
            SessionOp::Advance(secs) => {
                driver.env.advance(Duration::from_secs(u64::from(secs)));
                driver.tick();
            },
            SessionOp::End => driver.end(),
        }
        registry.assert_all(&driver.snapshot(), &context);
    }

    driver.destroy();
    registry.assert_all(&driver.snapshot(), "after destroy");

    let mut per_id: HashMap<MessageId, usize> = HashMap::new();
    for result in outcomes.lock().unwrap().iter() {
        let id = match result {
            Ok(delivered) => delivered.message_id.clone(),
            Err(e) => e.message_id().clone(),
        };
        *per_id.entry(id).or_default() += 1;
    }
    for id in &sent {
        assert_eq!(per_id.get(id), Some(&1), "{id} must complete exactly once");
    }
});
