//! 驱动主对象
//!
//! [`Isara`] 持有两条链路、三条队列和一个监督线程。监督线程监听链路事件：
//! 两条链路都建立后清空队列并启动工作线程，任一链路断开则停止工作线程，
//! 等待下一次两条链路都恢复。

use crate::error::DriverError;
use crate::metrics::{BridgeMetrics, MetricsSnapshot};
use crate::pipeline::{PollConfig, RECV_TIMEOUT, receiver_loop, sender_loop, status_poll_loop};
use crate::processor::{ProcessorConfig, StatusProcessor};
use crate::queue::CommandQueue;
use crate::state::{IsaraContext, RobotState};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use isara_link::{InboundMessage, LineSender, LinkEvent, MessageKind, reap};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 收件箱、发件箱与链路事件三条通道
///
/// 链路在创建时需要收件箱和事件的发送端，所以通道先于链路创建。
pub struct IsaraChannels {
    pub inbox_tx: Sender<InboundMessage>,
    pub inbox_rx: Receiver<InboundMessage>,
    pub outbox_tx: Sender<String>,
    pub outbox_rx: Receiver<String>,
    pub events_tx: Sender<LinkEvent>,
    pub events_rx: Receiver<LinkEvent>,
}

impl IsaraChannels {
    pub fn new() -> Self {
        let (inbox_tx, inbox_rx) = unbounded();
        let (outbox_tx, outbox_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();
        Self {
            inbox_tx,
            inbox_rx,
            outbox_tx,
            outbox_rx,
            events_tx,
            events_rx,
        }
    }
}

impl Default for IsaraChannels {
    fn default() -> Self {
        Self::new()
    }
}

/// 一组运行中的工作线程
struct Workers {
    is_running: Arc<AtomicBool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Workers {
    fn stop(self) {
        self.is_running.store(false, Ordering::Release);
        for (name, handle) in self.handles {
            debug!("Stopping {} thread", name);
            reap(handle, JOIN_TIMEOUT);
        }
    }
}

/// 监督线程状态
struct Supervisor {
    ctx: Arc<IsaraContext>,
    command_link: Arc<dyn LineSender>,
    status_link: Arc<dyn LineSender>,
    inbox_rx: Receiver<InboundMessage>,
    outbox_rx: Receiver<String>,
    events_rx: Receiver<LinkEvent>,
    processor: Arc<Mutex<StatusProcessor>>,
    poll: PollConfig,
    shutdown: Arc<AtomicBool>,
    up: HashSet<MessageKind>,
    workers: Option<Workers>,
}

impl Supervisor {
    fn run(mut self) {
        while !self.shutdown.load(Ordering::Acquire) {
            match self.events_rx.recv_timeout(RECV_TIMEOUT) {
                Ok(LinkEvent::Up(kind)) => {
                    info!("{} connected", kind);
                    self.up.insert(kind);
                    if self.up.len() == 2 && self.workers.is_none() {
                        self.start_workers();
                    }
                },
                Ok(LinkEvent::Down(kind)) => {
                    warn!("{} disconnected", kind);
                    self.up.remove(&kind);
                    self.stop_workers();
                },
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    trace!("Supervisor: event channel disconnected");
                    break;
                },
            }
        }
        self.stop_workers();
        trace!("Supervisor: loop exited");
    }

    fn start_workers(&mut self) {
        // 丢弃上一次连接遗留的消息和命令
        let stale = self.inbox_rx.try_iter().count() + self.outbox_rx.try_iter().count();
        if stale > 0 {
            trace!("Flushed {} stale queue entries", stale);
        }

        let is_running = Arc::new(AtomicBool::new(true));
        let mut handles = Vec::with_capacity(3);
        let spawned = self.spawn_workers(&is_running, &mut handles);

        let workers = Workers {
            is_running,
            handles,
        };
        if let Err(e) = spawned {
            error!("Failed to spawn worker threads: {}", e);
            workers.stop();
            return;
        }

        self.workers = Some(workers);
        self.ctx.set_ready(true);
        self.ctx.set_connected(true);
        self.ctx.metrics.connection_cycles.fetch_add(1, Ordering::Relaxed);
        info!("Controller ready!");
    }

    fn spawn_workers(
        &self,
        is_running: &Arc<AtomicBool>,
        handles: &mut Vec<(&'static str, JoinHandle<()>)>,
    ) -> std::io::Result<()> {
        let (link, outbox, ctx, running) = (
            self.command_link.clone(),
            self.outbox_rx.clone(),
            self.ctx.clone(),
            is_running.clone(),
        );
        handles.push((
            "Sender",
            thread::Builder::new()
                .name("isara-sender".into())
                .spawn(move || sender_loop(link, outbox, ctx, running))?,
        ));

        let (inbox, processor, ctx, running) = (
            self.inbox_rx.clone(),
            self.processor.clone(),
            self.ctx.clone(),
            is_running.clone(),
        );
        handles.push((
            "Receiver",
            thread::Builder::new()
                .name("isara-receiver".into())
                .spawn(move || receiver_loop(inbox, processor, ctx, running))?,
        ));

        let (link, ctx, running, poll) = (
            self.status_link.clone(),
            self.ctx.clone(),
            is_running.clone(),
            self.poll,
        );
        handles.push((
            "Poller",
            thread::Builder::new()
                .name("isara-poller".into())
                .spawn(move || status_poll_loop(link, ctx, poll, running))?,
        ));
        Ok(())
    }

    fn stop_workers(&mut self) {
        if let Some(workers) = self.workers.take() {
            self.ctx.set_ready(false);
            workers.stop();
            self.ctx.set_connected(false);
        }
    }
}

/// 驱动主对象
///
/// # Example
///
/// ```no_run
/// use isara_driver::IsaraBuilder;
/// use isara_protocol::Command;
///
/// let isara = IsaraBuilder::new("192.168.1.20").build().unwrap();
/// isara.queue().submit(Command::new("reset"));
/// ```
pub struct Isara {
    ctx: Arc<IsaraContext>,
    queue: CommandQueue,
    inbox_tx: Sender<InboundMessage>,
    events_tx: Sender<LinkEvent>,
    shutdown: Arc<AtomicBool>,
    supervisor: Option<JoinHandle<()>>,
    // 链路随驱动一起释放
    _links: [Arc<dyn LineSender>; 2],
}

impl Isara {
    /// 启动监督线程
    ///
    /// # 参数
    /// - `command_link` / `status_link`: 两条链路，其收件箱与事件发送端必须来自 `channels`
    /// - `channels`: 队列
    /// - `ctx`: 共享上下文
    /// - `processor_config` / `poll`: 处理器与轮询配置
    pub fn start(
        command_link: Arc<dyn LineSender>,
        status_link: Arc<dyn LineSender>,
        channels: IsaraChannels,
        ctx: Arc<IsaraContext>,
        processor_config: ProcessorConfig,
        poll: PollConfig,
    ) -> Result<Self, DriverError> {
        let queue = CommandQueue::new(channels.outbox_tx.clone(), ctx.clone());
        let processor = StatusProcessor::new(ctx.clone(), queue.clone(), processor_config);
        let shutdown = Arc::new(AtomicBool::new(false));

        let supervisor = Supervisor {
            ctx: ctx.clone(),
            command_link: command_link.clone(),
            status_link: status_link.clone(),
            inbox_rx: channels.inbox_rx,
            outbox_rx: channels.outbox_rx,
            events_rx: channels.events_rx,
            processor: Arc::new(Mutex::new(processor)),
            poll,
            shutdown: shutdown.clone(),
            up: HashSet::new(),
            workers: None,
        };
        let handle = thread::Builder::new()
            .name("isara-supervisor".into())
            .spawn(move || supervisor.run())?;

        Ok(Self {
            ctx,
            queue,
            inbox_tx: channels.inbox_tx,
            events_tx: channels.events_tx,
            shutdown,
            supervisor: Some(handle),
            _links: [command_link, status_link],
        })
    }

    pub fn context(&self) -> &Arc<IsaraContext> {
        &self.ctx
    }

    /// 命令发件箱
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn metrics(&self) -> Arc<BridgeMetrics> {
        self.ctx.metrics.clone()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// 当前状态快照（无锁）
    pub fn snapshot(&self) -> Arc<RobotState> {
        self.ctx.snapshot()
    }

    pub fn is_ready(&self) -> bool {
        self.ctx.is_ready()
    }

    /// 阻塞等待两条链路建立
    pub fn wait_for_ready(&self, timeout: Duration) -> Result<(), DriverError> {
        let start = Instant::now();
        while !self.ctx.is_ready() {
            if start.elapsed() >= timeout {
                return Err(DriverError::Timeout);
            }
            thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }

    /// 收件箱发送端（链路和测试用）
    pub fn inbox_sender(&self) -> Sender<InboundMessage> {
        self.inbox_tx.clone()
    }

    /// 链路事件发送端（链路和测试用）
    pub fn event_sender(&self) -> Sender<LinkEvent> {
        self.events_tx.clone()
    }
}

impl Drop for Isara {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);

        if let Some(handle) = self.supervisor.take() {
            reap(handle, JOIN_TIMEOUT * 2);
        }
        self.ctx.set_ready(false);
    }
}
