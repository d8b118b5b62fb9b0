//! tests/common/harness.rs
#![allow(dead_code)]

use radiolink::{
    Config, ConnectionManager, ConnectionState, Event, EventStream, PeerIdentity,
    transport::{MemoryAdapter, MemoryRadio},
};
use std::{sync::{Arc, Once}, time::Duration};

pub const WAIT: Duration = Duration::from_secs(2);

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "radiolink=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

pub fn device(address: &str) -> PeerIdentity {
    PeerIdentity::new(address, format!("device {address}"))
}

pub async fn next_event(events: &mut EventStream) -> Event {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream closed")
}

/// Skips events until one matches `wanted`, returning it.
pub async fn wait_for_event(events: &mut EventStream, wanted: impl Fn(&Event) -> bool) -> Event {
    loop {
        let event = next_event(events).await;
        if wanted(&event) {
            return event;
        }
    }
}

pub async fn wait_for_state(events: &mut EventStream, state: ConnectionState) {
    wait_for_event(events, |event| *event == Event::StateChanged(state)).await;
}

/// One simulated device: its adapter on the shared radio plus a manager.
pub struct Device {
    pub identity: PeerIdentity,
    pub adapter: MemoryAdapter,
    pub manager: ConnectionManager,
    pub events: EventStream,
}

impl Device {
    pub fn on(radio: &MemoryRadio, address: &str, config: Config) -> Self {
        init_tracing();
        let identity = device(address);
        let adapter = radio.adapter(identity.clone());
        let (manager, events) = ConnectionManager::new(Arc::new(adapter.clone()), config)
            .expect("tests run inside a Tokio runtime");
        Self {
            identity,
            adapter,
            manager,
            events,
        }
    }

    pub async fn next_event(&mut self) -> Event {
        next_event(&mut self.events).await
    }

    pub async fn wait_for_state(&mut self, state: ConnectionState) {
        wait_for_state(&mut self.events, state).await;
    }
}
