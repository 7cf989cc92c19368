// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::master::bind_listen_socket;
use serial_test::serial;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use yare::parameterized;

#[parameterized(
    task_low = { 100 },
    task_mid = { 150 },
    task_high = { 199 },
)]
fn task_frames_are_echoed_as_result(cmd: i32) {
    let frame = Frame::new(cmd, vec![1, 2, 3]);
    assert_eq!(
        dispatch_frame(&frame),
        Dispatch::Reply(Frame::new(command::RESULT, vec![1, 2, 3]))
    );
}

#[test]
fn disconnect_and_quit_close() {
    assert_eq!(dispatch_frame(&Frame::empty(command::DISCONNECT)), Dispatch::Close);
    assert_eq!(dispatch_frame(&Frame::empty(command::QUIT)), Dispatch::Close);
}

#[parameterized(
    connected = { command::CONNECTED },
    none = { command::NONE },
    result = { command::RESULT },
    progress = { command::PROGRESS },
    unknown = { 4242 },
)]
fn non_task_frames_are_ignored(cmd: i32) {
    assert_eq!(dispatch_frame(&Frame::empty(cmd)), Dispatch::Ignore);
}

fn read_frame_blocking(stream: &mut TcpStream) -> Frame {
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 1024];
    loop {
        if let Some(frame) = decoder.next().unwrap() {
            return frame;
        }
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "peer closed before frame");
        decoder.feed(&buf[..n]);
    }
}

#[test]
#[serial]
fn child_loop_echoes_task_frames_over_tcp() {
    let listener = bind_listen_socket(0).unwrap();
    let port = listener.local_addr().unwrap().port();
    let mutex = AcceptMutex::new().unwrap();
    let stop = AtomicBool::new(false);

    std::thread::scope(|scope| {
        let worker = scope.spawn(|| run(&listener, &mutex, 0, 16, &stop));

        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let request = Frame::new(150, b"ping".to_vec());
        client.write_all(&encode(&request).unwrap()).unwrap();

        let reply = read_frame_blocking(&mut client);
        assert_eq!(reply, Frame::new(command::RESULT, b"ping".to_vec()));

        // A second request on the same connection still works.
        let request = Frame::new(101, b"again".to_vec());
        client.write_all(&encode(&request).unwrap()).unwrap();
        let reply = read_frame_blocking(&mut client);
        assert_eq!(reply.payload, b"again");

        stop.store(true, Ordering::SeqCst);
        worker.join().unwrap().unwrap();
    });
}

#[test]
#[serial]
fn disconnect_frame_closes_the_connection() {
    let listener = bind_listen_socket(0).unwrap();
    let port = listener.local_addr().unwrap().port();
    let mutex = AcceptMutex::new().unwrap();
    let stop = AtomicBool::new(false);

    std::thread::scope(|scope| {
        let worker = scope.spawn(|| run(&listener, &mutex, 0, 16, &stop));

        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client.write_all(&encode(&Frame::empty(command::DISCONNECT)).unwrap()).unwrap();

        client.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(client.read(&mut buf).unwrap(), 0, "expected EOF after disconnect");

        stop.store(true, Ordering::SeqCst);
        worker.join().unwrap().unwrap();
    });
}

#[test]
#[serial]
fn held_mutex_defers_accepts_until_released() {
    let listener = bind_listen_socket(0).unwrap();
    let port = listener.local_addr().unwrap().port();
    let mutex = AcceptMutex::new().unwrap();
    let stop = AtomicBool::new(false);

    // Simulate a sibling holding the accept mutex.
    assert!(mutex.try_lock());

    std::thread::scope(|scope| {
        let worker = scope.spawn(|| run(&listener, &mutex, 0, 16, &stop));

        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client.write_all(&encode(&Frame::new(150, b"held".to_vec())).unwrap()).unwrap();

        // Nothing answers while the mutex is held elsewhere.
        client.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
        let mut probe = [0u8; 1];
        assert!(client.read(&mut probe).is_err());

        // Release; the child's next listening wakeup wins the accept.
        // The connection is already in the backlog, so poke the
        // listener with a second connection to trigger a wakeup.
        mutex.unlock();
        let _nudge = TcpStream::connect(("127.0.0.1", port)).unwrap();

        let reply = read_frame_blocking(&mut client);
        assert_eq!(reply, Frame::new(command::RESULT, b"held".to_vec()));

        stop.store(true, Ordering::SeqCst);
        worker.join().unwrap().unwrap();
    });
}
