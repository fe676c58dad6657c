//! 驱动配置

use crate::pipeline::PollConfig;
use crate::processor::ProcessorConfig;
use isara_link::LinkConfig;
use isara_protocol::{DEFAULT_COMMAND_PORT, DEFAULT_STATUS_PORT};
use std::path::PathBuf;

/// 位置文件的缺省基础名
pub const DEFAULT_POSITIONS_BASE: &str = "isara";

/// 驱动配置
///
/// 由 [`IsaraBuilder`](crate::IsaraBuilder) 逐项设置，也可以整体替换。
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// 控制器主机名或 IP
    pub host: String,
    pub command_port: u16,
    pub status_port: u16,
    pub link: LinkConfig,
    pub poll: PollConfig,
    pub processor: ProcessorConfig,
    /// 位置文件目录
    pub positions_dir: PathBuf,
    /// 位置文件基础名（`<base>-<YYYYMMDD>.dat`）
    pub positions_base: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            command_port: DEFAULT_COMMAND_PORT,
            status_port: DEFAULT_STATUS_PORT,
            link: LinkConfig::default(),
            poll: PollConfig::default(),
            processor: ProcessorConfig::default(),
            positions_dir: PathBuf::from("."),
            positions_base: DEFAULT_POSITIONS_BASE.to_string(),
        }
    }
}
