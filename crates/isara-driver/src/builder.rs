//! Builder 模式实现
//!
//! 提供链式构造 [`Isara`] 实例的便捷方式。

use crate::channels::{ChannelSink, NullSink};
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::faults::UnmatchedPolicy;
use crate::isara::{Isara, IsaraChannels};
use crate::pipeline::PollConfig;
use crate::positions::{PositionBook, PositionStore};
use crate::state::IsaraContext;
use isara_link::{LineSender, LinkConfig, MessageKind, TcpLink};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Isara Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use isara_driver::IsaraBuilder;
///
/// let isara = IsaraBuilder::new("192.168.1.20")
///     .command_port(10000)
///     .status_port(1000)
///     .positions("/var/lib/isara", "isara")
///     .build()
///     .unwrap();
/// ```
pub struct IsaraBuilder {
    config: DriverConfig,
    sink: Option<Arc<dyn ChannelSink>>,
}

impl IsaraBuilder {
    /// 创建新的 Builder
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            config: DriverConfig {
                host: host.into(),
                ..Default::default()
            },
            sink: None,
        }
    }

    /// 用完整配置替换当前配置
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置命令端口（默认 10000）
    pub fn command_port(mut self, port: u16) -> Self {
        self.config.command_port = port;
        self
    }

    /// 设置状态端口（默认 1000）
    pub fn status_port(mut self, port: u16) -> Self {
        self.config.status_port = port;
        self
    }

    pub fn link_config(mut self, link: LinkConfig) -> Self {
        self.config.link = link;
        self
    }

    pub fn poll_config(mut self, poll: PollConfig) -> Self {
        self.config.poll = poll;
        self
    }

    /// 未匹配故障行的处理方式（默认清空寄存器）
    pub fn unmatched_fault_line(mut self, policy: UnmatchedPolicy) -> Self {
        self.config.processor.unmatched_fault_line = policy;
        self
    }

    /// 位置文件目录与基础名
    pub fn positions(mut self, dir: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        self.config.positions_dir = dir.into();
        self.config.positions_base = base.into();
        self
    }

    /// 视为所有样品盘槽位都有样品盘
    pub fn assume_all_pucks(mut self, assume: bool) -> Self {
        self.config.processor.assume_all_pucks = assume;
        self
    }

    /// 通道发布目标（默认丢弃）
    pub fn sink(mut self, sink: Arc<dyn ChannelSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn context(&self) -> Arc<IsaraContext> {
        let store = PositionStore::new(&self.config.positions_dir, &self.config.positions_base);
        let sink = self.sink.clone().unwrap_or_else(|| Arc::new(NullSink));
        Arc::new(IsaraContext::new(sink, PositionBook::open(store)))
    }

    /// 连接真实控制器
    ///
    /// 链路在后台连接，返回时不保证已就绪；需要时调用
    /// [`Isara::wait_for_ready`]。
    pub fn build(self) -> Result<Isara, DriverError> {
        let channels = IsaraChannels::new();
        let ctx = self.context();
        let config = &self.config;

        info!(
            "Connecting to {} (command port {}, status port {})",
            config.host, config.command_port, config.status_port
        );
        let command = TcpLink::spawn(
            MessageKind::Response,
            &config.host,
            config.command_port,
            config.link.clone(),
            channels.inbox_tx.clone(),
            channels.events_tx.clone(),
        )?;
        let status = TcpLink::spawn(
            MessageKind::Status,
            &config.host,
            config.status_port,
            config.link.clone(),
            channels.inbox_tx.clone(),
            channels.events_tx.clone(),
        )?;

        Isara::start(
            Arc::new(command),
            Arc::new(status),
            channels,
            ctx,
            config.processor,
            config.poll,
        )
    }

    /// 使用外部提供的链路构造（测试与自定义传输）
    ///
    /// 链路事件与入站消息通过 [`Isara::event_sender`] / [`Isara::inbox_sender`] 注入。
    pub fn build_with_links(
        self,
        command: Arc<dyn LineSender>,
        status: Arc<dyn LineSender>,
    ) -> Result<Isara, DriverError> {
        let ctx = self.context();
        Isara::start(
            command,
            status,
            IsaraChannels::new(),
            ctx,
            self.config.processor,
            self.config.poll,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_settings() {
        let builder = IsaraBuilder::new("10.0.0.5")
            .command_port(11000)
            .status_port(1100)
            .assume_all_pucks(true)
            .unmatched_fault_line(UnmatchedPolicy::Retain)
            .positions("/tmp/positions", "cats");
        assert_eq!(builder.config.host, "10.0.0.5");
        assert_eq!(builder.config.command_port, 11000);
        assert_eq!(builder.config.status_port, 1100);
        assert!(builder.config.processor.assume_all_pucks);
        assert_eq!(builder.config.processor.unmatched_fault_line, UnmatchedPolicy::Retain);
        assert_eq!(builder.config.positions_base, "cats");
    }
}
