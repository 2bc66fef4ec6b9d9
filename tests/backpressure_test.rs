//! Partial-write backpressure: the writer suspends in the channel monitor
//! and resumes when the selector reports write readiness

mod common;

use common::*;
use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tcp_reactor::{Ops, ReactorConfig, Runtime};

#[test]
fn partial_write_suspends_writer_until_peer_drains() {
    init_tracing();
    let runtime = Runtime::new(ReactorConfig::default()).expect("runtime");
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (socket, _) = listener.accept().unwrap();

    let (factory, _events) = RecordingInterpreter::factory(false);
    let (channel, _coordinator, probe) = establish_probed(socket, &runtime, &factory, None);

    // Larger than the send and receive buffers can absorb together
    let payload = vec![0xA5u8; 16 * 1024 * 1024];
    let total = payload.len();

    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
    let writer_channel = channel.clone();
    let writer = std::thread::spawn(move || {
        let result = writer_channel.write(&payload);
        let _ = done_tx.send(());
        result
    });

    // While the peer is not draining, the writer stays suspended in the
    // monitor and exactly one needs_write(true) has been issued
    assert!(done_rx.recv_timeout(Duration::from_millis(500)).is_err());
    assert_eq!(probe.needs_write_on.load(Ordering::SeqCst), 1);
    assert!(runtime.metrics().snapshot().writer_suspensions >= 1);
    assert!(channel.interest_ops().contains(Ops::WRITE));

    // Drain everything on the client side
    client
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    let mut reader = &client;
    let mut drained = 0usize;
    let mut buf = vec![0u8; 64 * 1024];
    while drained < total {
        let n = reader.read(&mut buf).expect("drain");
        assert!(n > 0, "peer hit EOF before the payload completed");
        drained += n;
    }
    assert_eq!(drained, total);

    done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("writer did not resume after drain");
    writer.join().unwrap().expect("write failed");

    // Every suspension was paired with a wake that cleared WRITE first
    std::thread::sleep(Duration::from_millis(200));
    assert!(!channel.interest_ops().contains(Ops::WRITE));
    assert_eq!(
        probe.needs_write_on.load(Ordering::SeqCst),
        probe.needs_write_off.load(Ordering::SeqCst)
    );
    assert_eq!(runtime.metrics().snapshot().bytes_written, total as u64);

    assert!(runtime.shutdown(Duration::from_secs(5)));
}

#[test]
fn closing_channel_releases_suspended_writer() {
    init_tracing();
    let runtime = Runtime::new(ReactorConfig::default()).expect("runtime");
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let _client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (socket, _) = listener.accept().unwrap();

    let (factory, _events) = RecordingInterpreter::factory(false);
    let (channel, _coordinator, _probe) = establish_probed(socket, &runtime, &factory, None);

    let payload = vec![0u8; 16 * 1024 * 1024];
    let writer_channel = channel.clone();
    let writer = std::thread::spawn(move || writer_channel.write(&payload));

    // Wait for the writer to wedge on backpressure, then close under it
    assert!(wait_until(
        || runtime.metrics().snapshot().writer_suspensions >= 1,
        Duration::from_secs(5)
    ));
    channel.close();

    let result = writer.join().unwrap();
    assert!(matches!(result, Err(tcp_reactor::ReactorError::SocketClosed)));

    assert!(runtime.shutdown(Duration::from_secs(5)));
}
