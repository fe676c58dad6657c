//! # ISARA Protocol
//!
//! ISARA 样品更换机器人的 ASCII 文本协议定义（无 IO 依赖）
//!
//! ## 模块
//!
//! - `constants`: 固定目录（样品盘槽位、轮询关键字、默认端口）
//! - `types`: 带整数编解码的枚举（工具、状态、健康度、液氮液位……）
//! - `bits`: 数字量输入/输出位串、样品盘检测位集
//! - `faults`: 故障消息目录与 32 位故障寄存器
//! - `status`: 状态行语法 `context(payload)` 与 state 帧字段索引表
//! - `command`: 命令格式化（`keyword`、`keyword(a,b)`、`traj(name,a,b)`）
//! - `port`: 端口字符串解析（`"1A16"`、`"P2"`）
//!
//! ## 帧格式
//!
//! 两条 TCP 链路都使用 NUL（`0x00`）作为帧分隔符，帧内容为 ASCII 文本。

pub mod bits;
pub mod command;
pub mod constants;
pub mod faults;
pub mod port;
pub mod status;
pub mod types;

// 重新导出常用类型
pub use bits::*;
pub use command::*;
pub use constants::*;
pub use faults::*;
pub use port::*;
pub use status::*;
pub use types::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// 整数字段无法解析
    #[error("Invalid integer field: {0:?}")]
    InvalidInteger(String),

    /// 浮点字段无法解析
    #[error("Invalid float field: {0:?}")]
    InvalidFloat(String),

    /// 位串中出现 `0`/`1` 以外的字符
    #[error("Invalid bit string: {0:?}")]
    InvalidBits(String),

    /// 位串超过容量
    #[error("Bit string too long: {len} bits (max {max})")]
    BitsTooLong { len: usize, max: usize },

    /// 枚举值超出定义范围
    #[error("Invalid {kind} value: {value}")]
    InvalidEnumValue { kind: &'static str, value: i64 },

    /// 固定宽度数据长度不符
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// 解析整数字段（去除首尾空白）
pub fn parse_int(text: &str) -> Result<i64, ProtocolError> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| ProtocolError::InvalidInteger(text.to_string()))
}

/// 解析浮点字段（去除首尾空白）
pub fn parse_float(text: &str) -> Result<f64, ProtocolError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| ProtocolError::InvalidFloat(text.to_string()))
}

/// 解析整数，失败时返回 0
///
/// 用于样品编号、样品板编号等“0 表示无效”的字段。
pub fn zero_int(text: &str) -> i64 {
    parse_int(text).unwrap_or(0)
}

/// 解析整数，失败时返回 -1
///
/// 用于 state 帧中的槽位字段（设备在空槽时发送空字符串）。
pub fn minus_int(text: &str) -> i64 {
    parse_int(text).unwrap_or(-1)
}
