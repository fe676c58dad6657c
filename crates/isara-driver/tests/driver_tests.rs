//! 驱动端到端测试
//!
//! 一组用 mock 链路注入消息，一组对接本地 TCP 假控制器。

use isara_driver::channels::names::{CONNECTED, LOG, STATE_ON_TOOL as ON_TOOL, WARNING};
use isara_driver::{ChannelBoard, Isara, IsaraBuilder, PollConfig};
use isara_link::{InboundMessage, LinkConfig, LinkEvent, MessageKind, MockLink};
use isara_protocol::{Command, StatusType};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn fast_poll() -> PollConfig {
    PollConfig {
        tick: Duration::from_millis(5),
        ticks_per_request: 4,
    }
}

fn start_mock(board: Arc<ChannelBoard>) -> (Isara, Arc<MockLink>, Arc<MockLink>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let command = Arc::new(MockLink::command());
    let status = Arc::new(MockLink::status());
    let isara = IsaraBuilder::new("mock")
        .poll_config(fast_poll())
        .positions(dir.path(), "test")
        .sink(board)
        .build_with_links(command.clone(), status.clone())
        .unwrap();

    let events = isara.event_sender();
    events.send(LinkEvent::Up(MessageKind::Response)).unwrap();
    events.send(LinkEvent::Up(MessageKind::Status)).unwrap();
    isara.wait_for_ready(Duration::from_secs(2)).unwrap();
    (isara, command, status, dir)
}

#[test]
fn test_status_messages_reach_snapshot() {
    let board = Arc::new(ChannelBoard::new());
    let (isara, _command, status, _dir) = start_mock(board.clone());
    let inbox = isara.inbox_sender();

    assert!(wait_until(Duration::from_secs(2), || !status.sent().is_empty()));
    assert_eq!(status.sent()[0], "state");

    inbox.send(InboundMessage::status("di(001)")).unwrap();
    inbox
        .send(InboundMessage::status(
            "state(1,1,0,DoubleGripper,SOAK,,0,0,1,5,-1,-1,-1,-1,0,0,,1,0,100.0,1,0,0,0,0,0,0)",
        ))
        .unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        isara.snapshot().status == StatusType::Busy
    }));
    let snapshot = isara.snapshot();
    assert_eq!(snapshot.on_tool, "1A5");
    assert!(snapshot.power);
    assert_eq!(board.get(ON_TOOL).unwrap().as_text(), "1A5");
    assert_eq!(board.get(CONNECTED).unwrap().as_int(), Some(1));
}

#[test]
fn test_commands_flow_in_order() {
    let board = Arc::new(ChannelBoard::new());
    let (isara, command, _status, _dir) = start_mock(board);

    for cmd in [
        Command::new("reset"),
        Command::new("cryoON").arg(3),
        Command::trajectory("home").args([3, 0, 0]),
    ] {
        assert!(isara.queue().submit(cmd));
    }

    assert!(wait_until(Duration::from_secs(2), || command.sent().len() == 3));
    assert_eq!(command.sent(), vec!["reset", "cryoON(3)", "traj(home,3,0,0)"]);
    assert_eq!(isara.metrics_snapshot().commands_sent, 3);
}

#[test]
fn test_response_clears_warning() {
    let board = Arc::new(ChannelBoard::new());
    let (isara, _command, _status, _dir) = start_mock(board.clone());
    isara.context().warn("Invalid tool for command!");
    assert!(!board.get(WARNING).unwrap().as_text().is_empty());

    isara.inbox_sender().send(InboundMessage::response("reset")).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        board.get(WARNING).is_some_and(|w| w.as_text().is_empty())
    }));
    assert_eq!(board.get(LOG).unwrap().as_text(), "reset");
}

/// 本地假控制器：状态端口按请求回复固定帧，命令端口记录命令并回显
struct FakeController {
    command_port: u16,
    status_port: u16,
}

fn read_frame(stream: &mut TcpStream) -> Option<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte) {
            Ok(0) | Err(_) => return None,
            Ok(_) if byte[0] == 0 => return Some(String::from_utf8_lossy(&line).into_owned()),
            Ok(_) => line.push(byte[0]),
        }
    }
}

impl FakeController {
    fn start(commands: Arc<parking_lot::Mutex<Vec<String>>>) -> Self {
        let command_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let status_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let command_port = command_listener.local_addr().unwrap().port();
        let status_port = status_listener.local_addr().unwrap().port();

        thread::spawn(move || {
            let Ok((mut stream, _)) = status_listener.accept() else {
                return;
            };
            while let Some(request) = read_frame(&mut stream) {
                let reply = match request.as_str() {
                    "state" => "state(1,1,0,DoubleGripper,SOAK,,0,0,-1,-1,-1,-1,6,11,0,0,,0,0,100.0,1,0,0,0,0,0,0)",
                    "di" => "di(0)",
                    "do" => "do(0)",
                    "position" => "position(1.0,2.0,3.0,0,0,0)",
                    _ => "",
                };
                if stream.write_all(format!("{reply}\0").as_bytes()).is_err() {
                    return;
                }
            }
        });

        thread::spawn(move || {
            let Ok((mut stream, _)) = command_listener.accept() else {
                return;
            };
            while let Some(command) = read_frame(&mut stream) {
                commands.lock().push(command.clone());
                if stream.write_all(format!("{command}\0").as_bytes()).is_err() {
                    return;
                }
            }
        });

        Self {
            command_port,
            status_port,
        }
    }
}

#[test]
fn test_tcp_controller_end_to_end() {
    let commands = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let controller = FakeController::start(commands.clone());
    let dir = tempfile::tempdir().unwrap();
    let board = Arc::new(ChannelBoard::new());

    let isara = IsaraBuilder::new("127.0.0.1")
        .command_port(controller.command_port)
        .status_port(controller.status_port)
        .link_config(LinkConfig {
            connect_timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .poll_config(fast_poll())
        .positions(dir.path(), "test")
        .sink(board.clone())
        .build()
        .unwrap();

    isara.wait_for_ready(Duration::from_secs(5)).unwrap();
    assert!(wait_until(Duration::from_secs(5), || isara.snapshot().mounted == "1B11"));
    assert!(wait_until(Duration::from_secs(5), || isara.snapshot().pose.z == 3.0));
    assert_eq!(isara.snapshot().status, StatusType::Idle);

    assert!(isara.queue().submit(Command::new("reset")));
    assert!(wait_until(Duration::from_secs(5), || {
        commands.lock().iter().any(|c| c == "reset")
    }));
    assert!(wait_until(Duration::from_secs(5), || {
        board.get(LOG).is_some_and(|v| v.as_text() == "reset")
    }));
    assert!(isara.metrics_snapshot().polls_sent >= 4);
}
