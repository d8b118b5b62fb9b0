//! Sessions over real loopback TCP sockets.

pub mod common;

use bytes::Bytes;
use common::harness::{init_tracing, next_event, wait_for_event, wait_for_state};
use radiolink::{
    Config, ConnectionManager, ConnectionState, Event, EventStream, PeerIdentity,
    event::{NOTICE_CONNECT_FAILED, NOTICE_CONNECTION_LOST},
    transport::TcpTransport,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};

/// Asks the OS for a free loopback port.
fn free_addr() -> SocketAddr {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap()
}

fn tcp_manager(config: Config) -> (ConnectionManager, EventStream, SocketAddr) {
    init_tracing();
    let transport = TcpTransport::new(free_addr());
    let addr = transport.bind_addr();
    let (manager, events) = ConnectionManager::new(Arc::new(transport), config).unwrap();
    (manager, events, addr)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tcp_session_round_trip() {
    let (server, mut server_events, server_addr) = tcp_manager(Config::continuous());
    let (client, mut client_events, _) = tcp_manager(Config::continuous());

    server.start();
    wait_for_state(&mut server_events, ConnectionState::Listening).await;
    client.start();
    wait_for_state(&mut client_events, ConnectionState::Listening).await;

    let target = PeerIdentity::new(server_addr.to_string(), "server");
    client.connect_to_peer(target.clone());
    wait_for_state(&mut client_events, ConnectionState::Connected).await;
    assert_eq!(next_event(&mut client_events).await, Event::PeerIdentified(target));

    wait_for_state(&mut server_events, ConnectionState::Connected).await;
    let Event::PeerIdentified(inbound) = next_event(&mut server_events).await else {
        panic!("server did not identify its peer");
    };
    assert!(inbound.address().starts_with("127.0.0.1:"));

    client.send("hello over tcp").await;
    assert_eq!(
        next_event(&mut client_events).await,
        Event::DataSent(Bytes::from_static(b"hello over tcp"))
    );
    assert_eq!(
        next_event(&mut server_events).await,
        Event::DataReceived(Bytes::from_static(b"hello over tcp"))
    );

    server.send(Bytes::from_static(b"\x01\x02\x03")).await;
    let received = wait_for_event(&mut client_events, |event| {
        matches!(event, Event::DataReceived(_))
    })
    .await;
    assert_eq!(received, Event::DataReceived(Bytes::from_static(b"\x01\x02\x03")));

    // Closing one side is seen as end of stream by the other.
    client.stop();
    assert_eq!(
        wait_for_event(&mut server_events, |event| matches!(event, Event::Notice(_))).await,
        Event::Notice(NOTICE_CONNECTION_LOST.to_string())
    );
    assert_eq!(
        next_event(&mut server_events).await,
        Event::StateChanged(ConnectionState::Listening)
    );
}

#[tokio::test]
async fn test_tcp_connect_refused() {
    let (client, mut events, _) = tcp_manager(Config::default());
    let nobody = free_addr();

    client.start();
    client.connect_to_peer(PeerIdentity::anonymous(nobody.to_string()));
    let expected = [
        Event::StateChanged(ConnectionState::Listening),
        Event::StateChanged(ConnectionState::Connecting),
        Event::Notice(NOTICE_CONNECT_FAILED.to_string()),
        Event::StateChanged(ConnectionState::Listening),
    ];
    for want in expected {
        assert_eq!(next_event(&mut events).await, want);
    }
}

#[tokio::test]
async fn test_tcp_unparseable_peer_address() {
    let (client, mut events, _) = tcp_manager(Config::default());

    client.start();
    client.connect_to_peer(PeerIdentity::anonymous("not-an-address"));
    let expected = [
        Event::StateChanged(ConnectionState::Listening),
        Event::StateChanged(ConnectionState::Connecting),
        Event::Notice(NOTICE_CONNECT_FAILED.to_string()),
        Event::StateChanged(ConnectionState::Listening),
    ];
    for want in expected {
        assert_eq!(next_event(&mut events).await, want);
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(events.try_recv(), None);
    assert_eq!(client.current_state(), ConnectionState::Listening);
}

#[tokio::test]
async fn test_tcp_listener_rebinds_after_stop() {
    let (server, mut events, addr) = tcp_manager(Config::default());

    for _ in 0..3 {
        server.start();
        assert_eq!(
            next_event(&mut events).await,
            Event::StateChanged(ConnectionState::Listening)
        );
        assert!(server.snapshot().listener.is_some());
        assert!(tokio::net::TcpStream::connect(addr).await.is_ok());
        server.stop();
        assert_eq!(next_event(&mut events).await, Event::StateChanged(ConnectionState::Idle));
    }
}
