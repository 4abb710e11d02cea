//! End-to-end tunnel tests
//!
//! These run the real listener, forwards and relay against an in-process
//! jump host and local destination servers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use common::{closed_port, closed_without_data, echo_server, reply_server, RecordingSink, SimulatedJumpHost};
use jump_tunnel::tunnel::ForwardStage;
use jump_tunnel::{Credential, Result, Tunnel, TunnelDescriptor, TunnelError, TunnelEvent, TunnelState};

const DESTINATION: &str = "10.0.0.5:3306";

fn build(jump: SimulatedJumpHost, jump_address: &str, sink: Arc<RecordingSink>) -> Tunnel<SimulatedJumpHost> {
    let descriptor = TunnelDescriptor::new(jump_address, Credential::password("secret"), DESTINATION).unwrap();
    Tunnel::with_dialer(descriptor, jump)
        .with_event_sink(sink)
        .with_shutdown_timeout(Duration::from_secs(2))
}

async fn run(tunnel: &Tunnel<SimulatedJumpHost>, cancel: &CancellationToken) -> (JoinHandle<Result<()>>, u16) {
    let runner = tunnel.clone();
    let token = cancel.clone();
    let handle = tokio::spawn(async move { runner.start(token).await });
    let port = tunnel.wait_ready_timeout(Duration::from_secs(5)).await.unwrap();
    (handle, port)
}

async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(("127.0.0.1", port)).await.unwrap()
}

#[tokio::test]
async fn test_forward_through_jump_host() {
    let server = reply_server().await;
    let jump = SimulatedJumpHost::new("alice", &[(DESTINATION, server)]);
    let sink = Arc::new(RecordingSink::default());
    let tunnel = build(jump.clone(), "alice@jump.example:2222", sink.clone());

    let cancel = CancellationToken::new();
    let (handle, port) = run(&tunnel, &cancel).await;
    assert_ne!(port, 0);
    assert_eq!(tunnel.state(), TunnelState::Accepting);
    assert_eq!(tunnel.local_endpoint().to_string(), format!("127.0.0.1:{}", port));

    let mut client = connect(port).await;
    client.write_all(b"SELECT 1").await.unwrap();
    client.shutdown().await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"reply:SELECT 1");

    // The jump host saw the declared user and port, and the destination
    // was requested by name on behalf of the local peer
    let dials = jump.dials();
    assert_eq!(dials.len(), 1);
    assert_eq!(dials[0].user(), "alice");
    assert_eq!(dials[0].host(), "jump.example");
    assert_eq!(dials[0].port(), 2222);
    let opens = jump.opens();
    assert_eq!(opens.len(), 1);
    assert_eq!(opens[0].0, DESTINATION);
    assert_eq!(opens[0].1, client.local_addr().unwrap());

    let closed = sink.wait_for(|e| matches!(e, TunnelEvent::ForwardClosed { .. })).await;
    match closed {
        TunnelEvent::ForwardClosed { id, stats } => {
            assert_eq!(id, 1);
            assert_eq!(stats.bytes_up, 8);
            assert_eq!(stats.bytes_down, 14);
        }
        _ => unreachable!(),
    }

    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(tunnel.state(), TunnelState::Stopped);
}

#[tokio::test]
async fn test_remote_failure_is_isolated() {
    let dead = closed_port().await;
    let jump = SimulatedJumpHost::new("alice", &[(DESTINATION, dead)]);
    let sink = Arc::new(RecordingSink::default());
    let tunnel = build(jump, "alice@jump.example", sink.clone());

    let cancel = CancellationToken::new();
    let (handle, port) = run(&tunnel, &cancel).await;

    let mut first = connect(port).await;
    assert!(closed_without_data(&mut first).await);
    sink.wait_for(|e| {
        matches!(e, TunnelEvent::ForwardFailed { id: 1, stage: ForwardStage::RemoteDial, .. })
    })
    .await;

    // The listener keeps going
    assert_eq!(tunnel.state(), TunnelState::Accepting);
    let mut second = connect(port).await;
    assert!(closed_without_data(&mut second).await);
    sink.wait_for(|e| matches!(e, TunnelEvent::ForwardFailed { id: 2, .. })).await;

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_jump_rejection_is_isolated() {
    let server = echo_server().await;
    let jump = SimulatedJumpHost::new("alice", &[(DESTINATION, server)]);
    let sink = Arc::new(RecordingSink::default());
    let tunnel = build(jump, "mallory@jump.example", sink.clone());

    let cancel = CancellationToken::new();
    let (handle, port) = run(&tunnel, &cancel).await;

    let mut client = connect(port).await;
    assert!(closed_without_data(&mut client).await);
    let failed = sink
        .wait_for(|e| matches!(e, TunnelEvent::ForwardFailed { stage: ForwardStage::JumpDial, .. }))
        .await;
    if let TunnelEvent::ForwardFailed { error, .. } = failed {
        assert!(error.contains("mallory"), "unexpected error: {}", error);
    }
    assert_eq!(tunnel.state(), TunnelState::Accepting);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_forwards_are_independent() {
    let server = echo_server().await;
    let jump = SimulatedJumpHost::new("alice", &[(DESTINATION, server)]);
    let sink = Arc::new(RecordingSink::default());
    let tunnel = build(jump.clone(), "alice@jump.example", sink);

    let cancel = CancellationToken::new();
    let (handle, port) = run(&tunnel, &cancel).await;

    let mut a = connect(port).await;
    let mut b = connect(port).await;

    a.write_all(b"marker-A").await.unwrap();
    b.write_all(b"marker-B").await.unwrap();

    let mut buf_a = [0u8; 8];
    let mut buf_b = [0u8; 8];
    b.read_exact(&mut buf_b).await.unwrap();
    a.read_exact(&mut buf_a).await.unwrap();
    assert_eq!(&buf_a, b"marker-A");
    assert_eq!(&buf_b, b"marker-B");

    // One jump session per forward
    assert_eq!(jump.dials().len(), 2);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_cancel_stops_accepting_and_drains() {
    let server = echo_server().await;
    let jump = SimulatedJumpHost::new("alice", &[(DESTINATION, server)]);
    let sink = Arc::new(RecordingSink::default());
    let tunnel = build(jump, "alice@jump.example", sink.clone());

    let cancel = CancellationToken::new();
    let (handle, port) = run(&tunnel, &cancel).await;

    // Hold one forward open across the cancellation
    let mut client = connect(port).await;
    client.write_all(b"hold").await.unwrap();
    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("shutdown should finish")
        .unwrap()
        .unwrap();

    assert_eq!(tunnel.state(), TunnelState::Stopped);
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());

    let events = sink.events();
    assert!(events.contains(&TunnelEvent::Draining { in_flight: 1 }));
    assert_eq!(events.last(), Some(&TunnelEvent::Stopped));

    // The in-flight forward was torn down
    let mut rest = Vec::new();
    let torn_down = tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
        .await
        .expect("the local connection should be closed");
    assert!(matches!(torn_down, Ok(0) | Err(_)), "unexpected read: {:?}", torn_down);
}

#[tokio::test]
async fn test_connection_limit_rejects_extra_connections() {
    let server = echo_server().await;
    let jump = SimulatedJumpHost::new("alice", &[(DESTINATION, server)]);
    let sink = Arc::new(RecordingSink::default());
    let tunnel = build(jump, "alice@jump.example", sink.clone()).with_max_connections(Some(1));

    let cancel = CancellationToken::new();
    let (handle, port) = run(&tunnel, &cancel).await;

    let mut first = connect(port).await;
    first.write_all(b"one").await.unwrap();
    let mut buf = [0u8; 3];
    first.read_exact(&mut buf).await.unwrap();

    let mut second = connect(port).await;
    assert!(closed_without_data(&mut second).await);
    sink.wait_for(|e| matches!(e, TunnelEvent::Rejected { id: 2, limit: 1, .. })).await;

    // The admitted forward is unaffected
    first.write_all(b"two").await.unwrap();
    first.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"two");

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_wait_ready_before_start() {
    let jump = SimulatedJumpHost::new("alice", &[]);
    let tunnel = build(jump, "alice@jump.example", Arc::new(RecordingSink::default()));

    let waiter = {
        let tunnel = tunnel.clone();
        tokio::spawn(async move { tunnel.wait_ready(&CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    let cancel = CancellationToken::new();
    let (handle, port) = run(&tunnel, &cancel).await;
    assert_eq!(waiter.await.unwrap().unwrap(), port);

    // Later waiters return straight away
    assert_eq!(tunnel.wait_ready(&CancellationToken::new()).await.unwrap(), port);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_wait_ready_cancelled_before_bind() {
    let jump = SimulatedJumpHost::new("alice", &[]);
    let tunnel = build(jump, "alice@jump.example", Arc::new(RecordingSink::default()));

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(tunnel.wait_ready(&cancel).await, Err(TunnelError::Cancelled)));
    assert!(matches!(
        tunnel.wait_ready_timeout(Duration::from_millis(20)).await,
        Err(TunnelError::ReadyTimeout(_))
    ));
    assert_eq!(tunnel.descriptor().bound_port(), None);
}
