//! End-to-end sessions between simulated devices on an in-memory radio.

pub mod common;

use bytes::Bytes;
use common::harness::{Device, device};
use radiolink::{
    Config, ConnectionState, Event,
    config::ServiceRecord,
    event::{NOTICE_CONNECT_FAILED, NOTICE_CONNECTION_LOST, NOTICE_LISTEN_FAILED},
    transport::MemoryRadio,
};
use std::{num::NonZeroUsize, time::Duration};

async fn expect_quiet(device: &mut Device) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(device.events.try_recv(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_chat_between_two_devices() {
    let radio = MemoryRadio::new();
    let mut alice = Device::on(&radio, "aa:aa", Config::continuous());
    let mut bob = Device::on(&radio, "bb:bb", Config::continuous());

    alice.manager.start();
    bob.manager.start();
    alice.wait_for_state(ConnectionState::Listening).await;
    bob.wait_for_state(ConnectionState::Listening).await;
    assert!(radio.is_listening("bb:bb", &ServiceRecord::default()));

    // 1. Alice dials Bob; Bob's listening manager takes the inbound session.
    alice.manager.connect_to_peer(bob.identity.clone());
    assert_eq!(alice.next_event().await, Event::StateChanged(ConnectionState::Connecting));
    assert_eq!(alice.next_event().await, Event::StateChanged(ConnectionState::Connected));
    assert_eq!(alice.next_event().await, Event::PeerIdentified(bob.identity.clone()));
    assert_eq!(bob.next_event().await, Event::StateChanged(ConnectionState::Connected));
    assert_eq!(bob.next_event().await, Event::PeerIdentified(device("aa:aa")));

    // 2. Messages flow both ways, repeatedly.
    for round in 0..3 {
        let ping = Bytes::from(format!("ping {round}"));
        alice.manager.send(ping.clone()).await;
        assert_eq!(alice.next_event().await, Event::DataSent(ping.clone()));
        assert_eq!(bob.next_event().await, Event::DataReceived(ping));

        let pong = Bytes::from(format!("pong {round}"));
        bob.manager.send(pong.clone()).await;
        assert_eq!(bob.next_event().await, Event::DataSent(pong.clone()));
        assert_eq!(alice.next_event().await, Event::DataReceived(pong));
    }

    // 3. Bob leaves; Alice notices and goes back to listening.
    bob.manager.stop();
    assert_eq!(bob.next_event().await, Event::StateChanged(ConnectionState::Idle));
    assert_eq!(
        alice.next_event().await,
        Event::Notice(NOTICE_CONNECTION_LOST.to_string())
    );
    assert_eq!(alice.next_event().await, Event::StateChanged(ConnectionState::Listening));
    assert!(radio.is_listening("aa:aa", &ServiceRecord::default()));
}

#[tokio::test]
async fn test_default_listener_discards_inbound_sessions() {
    let radio = MemoryRadio::new();
    let mut alice = Device::on(&radio, "aa:aa", Config::default());
    let mut bob = Device::on(&radio, "bb:bb", Config::default());

    bob.manager.start();
    bob.wait_for_state(ConnectionState::Listening).await;
    alice.manager.start();
    alice.manager.connect_to_peer(bob.identity.clone());

    // The link is accepted, then dropped by Bob, so Alice loses it right away.
    let expected = [
        Event::StateChanged(ConnectionState::Listening),
        Event::StateChanged(ConnectionState::Connecting),
        Event::StateChanged(ConnectionState::Connected),
        Event::PeerIdentified(bob.identity.clone()),
        Event::Notice(NOTICE_CONNECTION_LOST.to_string()),
        Event::StateChanged(ConnectionState::Listening),
    ];
    for want in expected {
        assert_eq!(alice.next_event().await, want);
    }

    expect_quiet(&mut bob).await;
    let snapshot = bob.manager.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Listening);
    assert!(snapshot.listener.is_none());
    assert!(!radio.is_listening("bb:bb", &ServiceRecord::default()));
}

#[tokio::test]
async fn test_connect_to_absent_device_falls_back_to_listening() {
    let radio = MemoryRadio::new();
    let mut alice = Device::on(&radio, "aa:aa", Config::default());

    alice.manager.start();
    alice.manager.connect_to_peer(device("zz:zz"));
    let expected = [
        Event::StateChanged(ConnectionState::Listening),
        Event::StateChanged(ConnectionState::Connecting),
        Event::Notice(NOTICE_CONNECT_FAILED.to_string()),
        Event::StateChanged(ConnectionState::Listening),
    ];
    for want in expected {
        assert_eq!(alice.next_event().await, want);
    }
    assert!(alice.manager.snapshot().listener.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connected_device_rejects_a_third_party() {
    let radio = MemoryRadio::new();
    let mut alice = Device::on(&radio, "aa:aa", Config::continuous());
    let mut bob = Device::on(&radio, "bb:bb", Config::continuous());
    let mut carol = Device::on(&radio, "cc:cc", Config::default());

    bob.manager.start();
    bob.wait_for_state(ConnectionState::Listening).await;
    alice.manager.start();
    alice.manager.connect_to_peer(bob.identity.clone());
    alice.wait_for_state(ConnectionState::Connected).await;
    bob.wait_for_state(ConnectionState::Connected).await;
    let _ = bob.next_event().await; // PeerIdentified

    // Bob re-armed his listener, accepts Carol's link and closes it at once.
    tokio::time::timeout(common::harness::WAIT, async {
        while !radio.is_listening("bb:bb", &ServiceRecord::default()) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("bob never re-armed his listener");
    carol.manager.start();
    carol.manager.connect_to_peer(bob.identity.clone());
    carol.wait_for_state(ConnectionState::Connected).await;
    assert_eq!(carol.next_event().await, Event::PeerIdentified(bob.identity.clone()));
    assert_eq!(
        carol.next_event().await,
        Event::Notice(NOTICE_CONNECTION_LOST.to_string())
    );
    assert_eq!(carol.next_event().await, Event::StateChanged(ConnectionState::Listening));

    expect_quiet(&mut bob).await;
    assert_eq!(bob.manager.current_state(), ConnectionState::Connected);

    // Alice and Bob still talk.
    alice.manager.send("still here").await;
    let received = common::harness::wait_for_event(&mut bob.events, |event| {
        matches!(event, Event::DataReceived(_))
    })
    .await;
    assert_eq!(received, Event::DataReceived(Bytes::from_static(b"still here")));
}

#[tokio::test]
async fn test_second_listener_on_one_adapter_is_unavailable() {
    let radio = MemoryRadio::new();
    let mut first = Device::on(&radio, "aa:aa", Config::default());
    let mut second = Device::on(&radio, "aa:aa", Config::default());

    first.manager.start();
    first.wait_for_state(ConnectionState::Listening).await;
    second.manager.start();
    assert_eq!(
        second.next_event().await,
        Event::Notice(NOTICE_LISTEN_FAILED.to_string())
    );
    assert_eq!(second.next_event().await, Event::StateChanged(ConnectionState::Listening));
    assert!(second.manager.snapshot().listener.is_none());

    // Once the first one lets go, a retry succeeds.
    first.manager.stop();
    second.manager.start();
    assert!(second.manager.snapshot().listener.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_smallest_read_buffer_delivers_one_byte_per_read() {
    let radio = MemoryRadio::new();
    let mut config = Config::continuous();
    config.session.read_buffer_size = NonZeroUsize::MIN;
    let mut alice = Device::on(&radio, "aa:aa", Config::continuous());
    let mut bob = Device::on(&radio, "bb:bb", config);
    assert_eq!(bob.adapter.local_identity(), &bob.identity);

    bob.manager.start();
    bob.wait_for_state(ConnectionState::Listening).await;
    alice.manager.start();
    alice.manager.connect_to_peer(bob.adapter.local_identity().clone());
    alice.wait_for_state(ConnectionState::Connected).await;
    bob.wait_for_state(ConnectionState::Connected).await;
    assert_eq!(bob.next_event().await, Event::PeerIdentified(alice.identity.clone()));

    alice.manager.send("hey").await;
    for byte in [&b"h"[..], b"e", b"y"] {
        assert_eq!(bob.next_event().await, Event::DataReceived(Bytes::copy_from_slice(byte)));
    }
    expect_quiet(&mut bob).await;
    assert_eq!(bob.manager.current_state(), ConnectionState::Connected);
}
