//! TCP 链路集成测试（本地 TcpListener）

use crossbeam_channel::{Receiver, unbounded};
use isara_link::{InboundMessage, LineSender, LinkConfig, LinkError, LinkEvent, MessageKind, TcpLink};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::time::Duration;

fn fast_config() -> LinkConfig {
    LinkConfig {
        connect_timeout: Duration::from_millis(500),
        read_timeout: Duration::from_millis(20),
        backoff_initial: Duration::from_millis(20),
        backoff_max: Duration::from_millis(100),
        backoff_factor: 2.0,
    }
}

fn expect_event(events: &Receiver<LinkEvent>, expected: LinkEvent) {
    let event = events
        .recv_timeout(Duration::from_secs(5))
        .expect("link event not received");
    assert_eq!(event, expected);
}

#[test]
fn test_link_receives_frames_and_sends_lines() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let (inbox_tx, inbox_rx) = unbounded();
    let (events_tx, events_rx) = unbounded();
    let link = TcpLink::spawn(
        MessageKind::Status,
        "127.0.0.1",
        port,
        fast_config(),
        inbox_tx,
        events_tx,
    )
    .unwrap();

    let (mut server, _) = listener.accept().unwrap();
    expect_event(&events_rx, LinkEvent::Up(MessageKind::Status));
    assert!(link.is_ready());
    assert_eq!(link.kind(), MessageKind::Status);

    // 一帧拆成两段发送
    server.write_all(b"state(1,0,").unwrap();
    server.flush().unwrap();
    std::thread::sleep(Duration::from_millis(80));
    server.write_all(b"0)\0\0").unwrap();

    let msg = inbox_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(msg, InboundMessage::status("state(1,0,0)"));
    let empty = inbox_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(empty, InboundMessage::status(""));

    link.send_line("position").unwrap();
    server.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 9];
    server.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"position\0");
}

#[test]
fn test_link_reconnects_after_peer_close() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let (inbox_tx, _inbox_rx) = unbounded();
    let (events_tx, events_rx) = unbounded();
    let link = TcpLink::spawn(
        MessageKind::Response,
        "127.0.0.1",
        port,
        fast_config(),
        inbox_tx,
        events_tx,
    )
    .unwrap();

    let (first, _) = listener.accept().unwrap();
    expect_event(&events_rx, LinkEvent::Up(MessageKind::Response));
    drop(first);
    expect_event(&events_rx, LinkEvent::Down(MessageKind::Response));

    let (_second, _) = listener.accept().unwrap();
    expect_event(&events_rx, LinkEvent::Up(MessageKind::Response));
    assert_eq!(link.connections(), 2);
    assert!(link.is_ready());
}

#[test]
fn test_send_without_connection_fails() {
    // 绑定后立即释放，得到一个无人监听的端口
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let (inbox_tx, _inbox_rx) = unbounded();
    let (events_tx, _events_rx) = unbounded();
    let link = TcpLink::spawn(
        MessageKind::Response,
        "127.0.0.1",
        port,
        fast_config(),
        inbox_tx,
        events_tx,
    )
    .unwrap();

    assert!(!link.is_ready());
    assert!(matches!(
        link.send_line("reset"),
        Err(LinkError::NotConnected(MessageKind::Response))
    ));
    assert_eq!(link.address(), format!("127.0.0.1:{port}"));
}

#[test]
fn test_drop_stops_connected_link() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let (inbox_tx, _inbox_rx) = unbounded();
    let (events_tx, events_rx) = unbounded();
    let link = TcpLink::spawn(
        MessageKind::Status,
        "127.0.0.1",
        port,
        fast_config(),
        inbox_tx,
        events_tx,
    )
    .unwrap();
    let (_server, _) = listener.accept().unwrap();
    expect_event(&events_rx, LinkEvent::Up(MessageKind::Status));

    drop(link);
    expect_event(&events_rx, LinkEvent::Down(MessageKind::Status));
}
