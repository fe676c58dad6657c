//! 自动重连的 TCP 行链路
//!
//! 每条链路拥有一个后台连接线程：
//! 1. 解析地址并连接（失败则按 [`Backoff`] 等待后重试）
//! 2. 连接成功后重置退避、发出 [`LinkEvent::Up`]
//! 3. 持续读帧并推入收件箱，直到连接断开
//! 4. 发出 [`LinkEvent::Down`]，回到第 1 步
//!
//! 写操作在调用者线程上直接进行，与读线程共享同一个 socket。

use crate::framing::{FrameReader, encode_frame};
use crate::join::reap;
use crate::{Backoff, InboundMessage, LineSender, LinkError, LinkEvent, MessageKind};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 链路配置
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// 连接超时
    pub connect_timeout: Duration,
    /// 读超时（决定停止信号的响应延迟）
    pub read_timeout: Duration,
    /// 重连初始等待
    pub backoff_initial: Duration,
    /// 重连最大等待
    pub backoff_max: Duration,
    /// 每次失败后的等待倍数
    pub backoff_factor: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_millis(100),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            backoff_factor: std::f64::consts::E,
        }
    }
}

impl LinkConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff_initial, self.backoff_max, self.backoff_factor)
    }
}

/// 连接线程与句柄共享的状态
struct Shared {
    kind: MessageKind,
    writer: Mutex<Option<TcpStream>>,
    ready: AtomicBool,
    is_running: AtomicBool,
    connections: AtomicU64,
}

/// 一条 TCP 链路
pub struct TcpLink {
    shared: Arc<Shared>,
    address: String,
    thread: Option<JoinHandle<()>>,
}

impl TcpLink {
    /// 启动链路的后台连接线程
    ///
    /// # 参数
    /// - `kind`: 链路类型，决定收到的帧如何标记
    /// - `host`, `port`: 控制器地址
    /// - `inbox`: 收件箱发送端
    /// - `events`: 连接事件发送端
    pub fn spawn(
        kind: MessageKind,
        host: &str,
        port: u16,
        config: LinkConfig,
        inbox: Sender<InboundMessage>,
        events: Sender<LinkEvent>,
    ) -> Result<Self, LinkError> {
        let shared = Arc::new(Shared {
            kind,
            writer: Mutex::new(None),
            ready: AtomicBool::new(false),
            is_running: AtomicBool::new(true),
            connections: AtomicU64::new(0),
        });
        let address = format!("{host}:{port}");

        let thread = {
            let shared = shared.clone();
            let host = host.to_string();
            std::thread::Builder::new()
                .name(format!("isara-{}", thread_suffix(kind)))
                .spawn(move || connection_loop(shared, host, port, config, inbox, events))?
        };

        Ok(Self {
            shared,
            address,
            thread: Some(thread),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// 成功建立连接的累计次数
    pub fn connections(&self) -> u64 {
        self.shared.connections.load(Ordering::Relaxed)
    }
}

impl LineSender for TcpLink {
    fn send_line(&self, line: &str) -> Result<(), LinkError> {
        let mut guard = self.shared.writer.lock();
        let stream = guard.as_mut().ok_or(LinkError::NotConnected(self.shared.kind))?;
        stream.write_all(&encode_frame(line))?;
        stream.flush()?;
        trace!("{} >> {}", self.shared.kind, line);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    fn kind(&self) -> MessageKind {
        self.shared.kind
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.shared.is_running.store(false, Ordering::Release);

        // 关闭 socket 让读线程立即退出
        if let Some(stream) = self.shared.writer.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }

        if let Some(handle) = self.thread.take() {
            reap(handle, Duration::from_secs(2));
        }
    }
}

fn thread_suffix(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Response => "cmd",
        MessageKind::Status => "status",
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, LinkError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| LinkError::Resolve(format!("{host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| LinkError::Resolve(format!("{host}:{port}")))
}

fn connect(host: &str, port: u16, config: &LinkConfig) -> Result<TcpStream, LinkError> {
    let addr = resolve(host, port)?;
    let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)?;
    stream.set_read_timeout(Some(config.read_timeout))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// 分片睡眠，期间观察停止信号
fn sleep_while_running(shared: &Shared, total: Duration) {
    let slice = Duration::from_millis(50);
    let mut remaining = total;
    while !remaining.is_zero() && shared.is_running.load(Ordering::Acquire) {
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

fn connection_loop(
    shared: Arc<Shared>,
    host: String,
    port: u16,
    config: LinkConfig,
    inbox: Sender<InboundMessage>,
    events: Sender<LinkEvent>,
) {
    let kind = shared.kind;
    let mut backoff = config.backoff();

    while shared.is_running.load(Ordering::Acquire) {
        let stream = match connect(&host, port, &config) {
            Ok(stream) => stream,
            Err(e) => {
                let delay = backoff.next_delay();
                warn!("{} connection to {}:{} failed: {}; retrying in {:?}", kind, host, port, e, delay);
                sleep_while_running(&shared, delay);
                continue;
            },
        };

        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(e) => {
                error!("{} cannot clone socket: {}", kind, e);
                sleep_while_running(&shared, backoff.next_delay());
                continue;
            },
        };

        backoff.reset();
        *shared.writer.lock() = Some(writer);
        shared.ready.store(true, Ordering::Release);
        shared.connections.fetch_add(1, Ordering::Relaxed);
        info!("{} connected to {}:{}", kind, host, port);
        let _ = events.send(LinkEvent::Up(kind));

        let inbox_open = read_frames(&shared, stream, &inbox);

        shared.ready.store(false, Ordering::Release);
        if let Some(stream) = shared.writer.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        let _ = events.send(LinkEvent::Down(kind));

        if !inbox_open {
            debug!("{} inbox closed, stopping", kind);
            break;
        }
        if shared.is_running.load(Ordering::Acquire) {
            let delay = backoff.next_delay();
            info!("{} disconnected; reconnecting in {:?}", kind, delay);
            sleep_while_running(&shared, delay);
        }
    }

    trace!("{} connection thread exiting", kind);
}

/// 读帧直到断线或停止，返回收件箱是否仍然可用
fn read_frames(shared: &Shared, stream: TcpStream, inbox: &Sender<InboundMessage>) -> bool {
    let kind = shared.kind;
    let mut frames = FrameReader::new(stream);

    while shared.is_running.load(Ordering::Acquire) {
        match frames.read_frame() {
            Ok(Some(line)) => {
                trace!("{} << {}", kind, line);
                if inbox.send(InboundMessage { kind, line }).is_err() {
                    return false;
                }
            },
            Ok(None) => continue,
            Err(LinkError::Closed) => {
                warn!("{} closed by peer", kind);
                break;
            },
            Err(e) => {
                warn!("{} read error: {}", kind, e);
                break;
            },
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.read_timeout, Duration::from_millis(100));
        assert_eq!(config.backoff_initial, Duration::from_secs(1));
        assert_eq!(config.backoff_max, Duration::from_secs(60));
        let mut backoff = config.backoff();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert!(backoff.current() > Duration::from_millis(2700));
    }

    #[test]
    fn test_resolve_failure() {
        assert!(matches!(
            resolve("host.invalid.", 10000),
            Err(LinkError::Resolve(_))
        ));
    }
}
