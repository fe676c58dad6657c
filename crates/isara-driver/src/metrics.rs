//! 桥接运行指标
//!
//! 所有计数器都是原子变量，可以在任何线程读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 桥接实时指标
///
/// # Example
///
/// ```
/// use isara_driver::BridgeMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = BridgeMetrics::default();
/// metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().commands_sent, 1);
/// ```
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    /// 成功写入命令链路的命令数
    pub commands_sent: AtomicU64,

    /// 命令发送失败次数（命令不会重新入队）
    pub send_failures: AtomicU64,

    /// 收件箱处理的消息数（两条链路合计）
    pub inbound_messages: AtomicU64,

    /// 状态帧解析错误次数
    pub parse_errors: AtomicU64,

    /// 发出的状态轮询数
    pub polls_sent: AtomicU64,

    /// 轮询在等待窗口内未收到对应回复的次数
    pub poll_timeouts: AtomicU64,

    /// 两条链路全部建立的次数
    pub connection_cycles: AtomicU64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            inbound_messages: self.inbound_messages.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            polls_sent: self.polls_sent.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
            connection_cycles: self.connection_cycles.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.commands_sent.store(0, Ordering::Relaxed);
        self.send_failures.store(0, Ordering::Relaxed);
        self.inbound_messages.store(0, Ordering::Relaxed);
        self.parse_errors.store(0, Ordering::Relaxed);
        self.polls_sent.store(0, Ordering::Relaxed);
        self.poll_timeouts.store(0, Ordering::Relaxed);
        self.connection_cycles.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub commands_sent: u64,
    pub send_failures: u64,
    pub inbound_messages: u64,
    pub parse_errors: u64,
    pub polls_sent: u64,
    pub poll_timeouts: u64,
    pub connection_cycles: u64,
}

impl MetricsSnapshot {
    /// 轮询超时率（百分比），没有轮询时为 0
    pub fn poll_timeout_rate(&self) -> f64 {
        if self.polls_sent == 0 {
            return 0.0;
        }
        (self.poll_timeouts as f64 / self.polls_sent as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = BridgeMetrics::new();
        metrics.polls_sent.fetch_add(4, Ordering::Relaxed);
        metrics.poll_timeouts.fetch_add(1, Ordering::Relaxed);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.polls_sent, 4);
        assert_eq!(snapshot.poll_timeout_rate(), 25.0);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
        assert_eq!(MetricsSnapshot::default().poll_timeout_rate(), 0.0);
    }
}
