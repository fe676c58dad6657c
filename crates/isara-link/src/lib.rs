//! # ISARA Link Layer
//!
//! 传输层抽象：两条独立的 TCP 链路（命令链路、状态链路），
//! 以 NUL 字节分帧，断线后指数退避自动重连。
//!
//! 上层只依赖 [`LineSender`] trait 发送，接收到的每一帧都以
//! [`InboundMessage`] 的形式推入共享的收件箱通道，连接状态变化以
//! [`LinkEvent`] 通知。

use std::fmt;
use thiserror::Error;

pub mod backoff;
pub mod framing;
pub mod join;
pub mod tcp;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use backoff::Backoff;
pub use framing::{FrameReader, decode_frame, encode_frame};
pub use join::{JoinError, join_within, reap};
pub use tcp::{LinkConfig, TcpLink};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockLink;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 链路尚未建立（或已断开）
    #[error("{0} not connected")]
    NotConnected(MessageKind),

    /// 对端关闭连接
    #[error("Connection closed by peer")]
    Closed,

    /// 地址解析失败
    #[error("Cannot resolve address: {0}")]
    Resolve(String),

    /// 读超时（无数据，正常现象）
    #[error("Read timeout")]
    Timeout,
}

/// 消息来源
///
/// 命令链路上的回复为 `Response`，状态链路上的回复为 `Status`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Response,
    Status,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Response => f.write_str("Command Link"),
            MessageKind::Status => f.write_str("Status Link"),
        }
    }
}

/// 收件箱元素：一帧原始文本及其来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub line: String,
}

impl InboundMessage {
    pub fn response(line: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Response,
            line: line.into(),
        }
    }

    pub fn status(line: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Status,
            line: line.into(),
        }
    }
}

/// 链路连接状态事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Up(MessageKind),
    Down(MessageKind),
}

/// 发送端抽象
///
/// 由 [`TcpLink`] 实现；测试中使用 `MockLink`。
pub trait LineSender: Send + Sync {
    /// 发送一行（实现负责追加帧分隔符）
    fn send_line(&self, line: &str) -> Result<(), LinkError>;

    /// 链路是否已连接
    fn is_ready(&self) -> bool;

    /// 链路类型
    fn kind(&self) -> MessageKind;
}
