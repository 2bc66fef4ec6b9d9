//! The zero-byte-read path: spurious readiness must re-arm, not end the
//! stream, and the interest accounting must stay exact

mod common;

use common::*;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[test]
fn zero_byte_read_rearms_then_delivers() {
    init_tracing();
    let runtime = tcp_reactor::Runtime::new(tcp_reactor::ReactorConfig::default()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (socket, _) = listener.accept().unwrap();

    // No re-arm from the interpreter: the interest accounting below must not
    // pick up a fourth call
    let (factory, events) = RecordingInterpreter::factory(false);
    let hook = SkipFirstRead::new();
    let (_channel, _coordinator, probe) = establish_probed(socket, &runtime, &factory, Some(hook));

    client.write_all(b"HELLO").unwrap();

    assert_eq!(
        events.recv_timeout(Duration::from_secs(10)).unwrap(),
        ConnEvent::Read(b"HELLO".to_vec())
    );

    // Let stray callbacks land before counting
    std::thread::sleep(Duration::from_millis(300));

    // The swallowed first read produced no delivery
    assert_eq!(probe.on_reads.load(Ordering::SeqCst), 1);
    // Three needs_read calls: disable when the first readiness dispatched,
    // re-enable after the zero-byte read, disable again when the real read
    // fired
    assert_eq!(probe.needs_read_calls.load(Ordering::SeqCst), 3);
    assert_eq!(runtime.metrics().snapshot().zero_reads, 1);

    assert!(runtime.shutdown(Duration::from_secs(5)));
}
