//! 工作线程循环
//!
//! 两条链路都就绪后，监督线程启动三个工作线程：
//!
//! - 发送线程：发件箱 → 命令链路
//! - 接收线程：收件箱 → [`StatusProcessor`]
//! - 轮询线程：按 `state → di → do → position → message` 循环向状态链路发请求
//!
//! 所有循环都在 `is_running` 变为 false 后的一个超时周期内退出。

use crate::processor::StatusProcessor;
use crate::state::IsaraContext;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use isara_link::{InboundMessage, LineSender, MessageKind};
use isara_protocol::POLL_CYCLE;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// 队列阻塞等待的超时，决定线程响应停止信号的延迟
pub const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// 状态轮询配置
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// 等待回复时的检查间隔
    pub tick: Duration,
    /// 每个请求最多等待的间隔数
    pub ticks_per_request: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            ticks_per_request: 10,
        }
    }
}

impl PollConfig {
    /// 单个请求的最长等待时间
    pub fn request_timeout(&self) -> Duration {
        self.tick * self.ticks_per_request
    }
}

/// 发送线程循环
///
/// # 参数
/// - `link`: 命令链路
/// - `outbox`: 发件箱接收端
/// - `ctx`: 共享上下文（指标）
/// - `is_running`: 运行标志
///
/// 发送失败的命令被丢弃，不会重新入队。
pub fn sender_loop(
    link: Arc<dyn LineSender>,
    outbox: Receiver<String>,
    ctx: Arc<IsaraContext>,
    is_running: Arc<AtomicBool>,
) {
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Sender: is_running flag is false, exiting");
            break;
        }

        let line = match outbox.recv_timeout(RECV_TIMEOUT) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                trace!("Sender: outbox disconnected");
                break;
            },
        };

        match link.send_line(&line) {
            Ok(()) => {
                ctx.metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => {
                error!("Failed to send command {:?}: {}", line, e);
                ctx.metrics.send_failures.fetch_add(1, Ordering::Relaxed);
            },
        }
    }

    trace!("Sender: loop exited");
}

/// 接收线程循环
///
/// 命令链路上的回复会清除当前警告；所有消息都交给处理器。
pub fn receiver_loop(
    inbox: Receiver<InboundMessage>,
    processor: Arc<Mutex<StatusProcessor>>,
    ctx: Arc<IsaraContext>,
    is_running: Arc<AtomicBool>,
) {
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Receiver: is_running flag is false, exiting");
            break;
        }

        let message = match inbox.recv_timeout(RECV_TIMEOUT) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                trace!("Receiver: inbox disconnected");
                break;
            },
        };

        ctx.metrics.inbound_messages.fetch_add(1, Ordering::Relaxed);
        if message.kind == MessageKind::Response {
            ctx.clear_warning();
            debug!("> {}", message.line);
        }
        processor.lock().process(&message);
    }

    trace!("Receiver: loop exited");
}

/// 状态轮询循环
///
/// 每个请求发出后最多等待 `ticks_per_request` 个 `tick`，收到同一上下文的回复即提前
/// 进入下一个请求；超时只计数，不重发。
pub fn status_poll_loop(
    link: Arc<dyn LineSender>,
    ctx: Arc<IsaraContext>,
    config: PollConfig,
    is_running: Arc<AtomicBool>,
) {
    let mut cycle = POLL_CYCLE.into_iter().cycle();

    'poll: while is_running.load(Ordering::Acquire) {
        let Some(context) = cycle.next() else {
            break;
        };

        ctx.clear_reply();
        if let Err(e) = link.send_line(context.keyword()) {
            warn!("Status poll {} failed: {}", context, e);
            thread::sleep(config.tick);
            continue;
        }
        ctx.metrics.polls_sent.fetch_add(1, Ordering::Relaxed);

        for _ in 0..config.ticks_per_request {
            thread::sleep(config.tick);
            if !is_running.load(Ordering::Acquire) {
                break 'poll;
            }
            if ctx.last_reply() == Some(context) {
                continue 'poll;
            }
        }

        trace!("No reply to {} poll", context);
        ctx.metrics.poll_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    trace!("Poller: loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::NullSink;
    use crate::positions::{PositionBook, PositionStore, PositionTable};
    use crate::processor::ProcessorConfig;
    use crate::queue::CommandQueue;
    use crossbeam_channel::unbounded;
    use isara_link::MockLink;
    use std::time::Instant;

    fn context() -> Arc<IsaraContext> {
        let book = PositionBook::with_table(PositionStore::new(".", "positions"), PositionTable::new());
        let ctx = Arc::new(IsaraContext::new(Arc::new(NullSink), book));
        ctx.set_ready(true);
        ctx.set_connected(true);
        ctx
    }

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

    #[test]
    fn test_sender_loop_preserves_order() {
        let ctx = context();
        let link = Arc::new(MockLink::command());
        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        for line in ["reset", "cryoON(3)", "home(1)"] {
            tx.send(line.to_string()).unwrap();
        }

        let handle = {
            let (link, ctx, running) = (link.clone(), ctx.clone(), running.clone());
            thread::spawn(move || sender_loop(link, rx, ctx, running))
        };

        assert!(wait_until(Duration::from_secs(2), || link.sent().len() == 3));
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        assert_eq!(link.sent(), vec!["reset", "cryoON(3)", "home(1)"]);
        assert_eq!(ctx.metrics.snapshot().commands_sent, 3);
    }

    #[test]
    fn test_sender_loop_drops_failed_commands() {
        let ctx = context();
        let link = Arc::new(MockLink::command());
        link.set_fail(true);
        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        tx.send("reset".to_string()).unwrap();

        let handle = {
            let (link, ctx, running) = (link.clone(), ctx.clone(), running.clone());
            thread::spawn(move || sender_loop(link, rx, ctx, running))
        };

        assert!(wait_until(Duration::from_secs(2), || {
            ctx.metrics.snapshot().send_failures == 1
        }));
        running.store(false, Ordering::Release);
        handle.join().unwrap();
        assert!(link.sent().is_empty());
    }

    #[test]
    fn test_receiver_loop_clears_warning_on_response() {
        let ctx = context();
        let (out_tx, _out_rx) = unbounded();
        let processor = StatusProcessor::new(
            ctx.clone(),
            CommandQueue::new(out_tx, ctx.clone()),
            ProcessorConfig::default(),
        );
        let processor = Arc::new(Mutex::new(processor));
        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        ctx.warn("Invalid tool for command!");
        tx.send(InboundMessage::response("reset")).unwrap();
        tx.send(InboundMessage::status("position(1,2,3,4,5,6)")).unwrap();

        let handle = {
            let (ctx, running, processor) = (ctx.clone(), running.clone(), processor.clone());
            thread::spawn(move || receiver_loop(rx, processor, ctx, running))
        };

        assert!(wait_until(Duration::from_secs(2), || {
            ctx.metrics.snapshot().inbound_messages == 2
        }));
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        assert_eq!(ctx.warning(), "");
        assert_eq!(ctx.snapshot().pose.z, 3.0);
    }

    #[test]
    fn test_poll_loop_cycles_contexts() {
        let ctx = context();
        let link = Arc::new(MockLink::status());
        let running = Arc::new(AtomicBool::new(true));
        let config = PollConfig {
            tick: Duration::from_millis(1),
            ticks_per_request: 2,
        };

        let handle = {
            let (link, ctx, running) = (link.clone(), ctx.clone(), running.clone());
            thread::spawn(move || status_poll_loop(link, ctx, config, running))
        };

        assert!(wait_until(Duration::from_secs(2), || link.sent().len() >= 6));
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        let sent = link.sent();
        assert_eq!(&sent[..6], ["state", "di", "do", "position", "message", "state"]);
        // 没有回复：每个请求都超时
        let metrics = ctx.metrics.snapshot();
        assert!(metrics.poll_timeouts >= 5);
    }

    #[test]
    fn test_poll_request_timeout() {
        assert_eq!(PollConfig::default().request_timeout(), Duration::from_secs(1));
    }
}
