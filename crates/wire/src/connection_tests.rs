// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::server::{endpoint_name, EndpointServer};
use dfm_core::command;
use tokio::net::UnixStream;

async fn expect_connected(events: &mut ConnectionEvents) {
    assert_eq!(events.recv().await, Some(ConnectionEvent::Connected));
}

#[tokio::test]
async fn frames_arrive_fifo_across_command_codes() {
    let (left, right) = UnixStream::pair().unwrap();
    let (sender, mut sender_events) = Connection::spawn(left);
    let (_receiver, mut events) = Connection::spawn(right);
    expect_connected(&mut sender_events).await;
    expect_connected(&mut events).await;

    assert!(sender.send(command::PROGRESS, vec![0, 0, 0, 10]));
    assert!(sender.send(command::DATA, b"chunk".to_vec()));
    assert!(sender.send(command::RESULT, b"OK".to_vec()));

    let mut seen = Vec::new();
    for _ in 0..3 {
        match events.recv().await {
            Some(ConnectionEvent::Command { cmd, .. }) => seen.push(cmd),
            other => panic!("expected command, got {:?}", other),
        }
    }
    assert_eq!(seen, vec![command::PROGRESS, command::DATA, command::RESULT]);
}

#[tokio::test]
async fn zero_payload_frame_is_delivered() {
    let (left, right) = UnixStream::pair().unwrap();
    let (sender, _) = Connection::spawn(left);
    let (_receiver, mut events) = Connection::spawn(right);
    expect_connected(&mut events).await;

    assert!(sender.send(command::CONNECTED, Vec::new()));
    assert_eq!(
        events.recv().await,
        Some(ConnectionEvent::Command { cmd: command::CONNECTED, payload: Vec::new() })
    );
}

#[tokio::test]
async fn peer_close_emits_single_disconnected() {
    let (left, right) = UnixStream::pair().unwrap();
    let (peer, _peer_events) = Connection::spawn(left);
    let (local, mut events) = Connection::spawn(right);
    expect_connected(&mut events).await;

    peer.close();

    assert_eq!(events.recv().await, Some(ConnectionEvent::Disconnected));
    assert!(!local.is_connected());
    // Once the handle is gone the event stream terminates cleanly.
    drop(local);
    assert_eq!(events.recv().await, None);
}

#[tokio::test]
async fn send_after_close_returns_false() {
    let (left, _right) = UnixStream::pair().unwrap();
    let (connection, mut events) = Connection::spawn(left);
    expect_connected(&mut events).await;

    connection.close();
    assert!(!connection.send(command::DATA, vec![1]));
}

#[tokio::test]
async fn dial_reaches_endpoint_server() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(endpoint_name("file"));
    let (server, mut incoming) = EndpointServer::listen(&path).unwrap();
    assert_eq!(server.local_path(), path);

    let (client, mut client_events) =
        Connection::dial(&path, std::time::Duration::from_secs(5)).await.unwrap();
    expect_connected(&mut client_events).await;

    let accepted = incoming.recv().await.unwrap();
    let mut server_events = accepted.events;
    expect_connected(&mut server_events).await;

    assert!(client.send(command::CONNECTED, Vec::new()));
    assert_eq!(
        server_events.recv().await,
        Some(ConnectionEvent::Command { cmd: command::CONNECTED, payload: Vec::new() })
    );
}

#[tokio::test]
async fn stale_socket_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dfm-worker-file-stale");
    std::fs::write(&path, b"").unwrap();

    let (_server, _incoming) = EndpointServer::listen(&path).unwrap();
    let result = Connection::dial(&path, std::time::Duration::from_secs(5)).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn dial_missing_endpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nonexistent");
    let result = Connection::dial(&path, std::time::Duration::from_millis(200)).await;
    assert!(result.is_err());
}
