//! # ISARA Driver
//!
//! 驱动层：把两条链路、三条队列和状态处理组合成一个可用的机器人桥接核心。
//!
//! - 链路监督：两条链路都建立后才启动工作线程并标记就绪
//! - 状态同步：接收线程独占写入 [`RobotState`]，通过 `ArcSwap` 无锁读取
//! - 状态机：`state`/`di`/`do`/`position`/`message` 帧与自由文本故障行
//! - 位置跟踪：命名位置匹配与 JSON 持久化
//! - 样品盘清点：槽位位集的增减比较
//!
//! 操作员意图与命令前置检查在 `isara-client` 中实现。

mod builder;
pub mod channels;
pub mod config;
mod error;
pub mod faults;
pub mod inventory;
mod isara;
pub mod metrics;
pub mod pipeline;
pub mod positions;
pub mod processor;
pub mod queue;
pub mod state;

pub use builder::IsaraBuilder;
pub use channels::{ChannelBoard, ChannelCallback, ChannelSink, ChannelValue, NullSink};
pub use config::{DEFAULT_POSITIONS_BASE, DriverConfig};
pub use error::DriverError;
pub use faults::{ErrorDecoder, FaultDecision, UnmatchedPolicy};
pub use inventory::{PuckDiff, PuckInventory};
pub use isara::{Isara, IsaraChannels};
pub use metrics::{BridgeMetrics, MetricsSnapshot};
pub use pipeline::{PollConfig, receiver_loop, sender_loop, status_poll_loop};
pub use positions::{
    Pose, PositionBook, PositionDefinition, PositionStore, PositionTable, SaveOutcome,
    normalize_position_name,
};
pub use processor::{ProcessorConfig, StatusProcessor, derive_status};
pub use queue::CommandQueue;
pub use state::*;
