//! 标准输入控制台
//!
//! 每行一条指令：
//!
//! - `NAME=VALUE`: 写入通道
//! - `NAME`: 读取通道
//! - `list`: 列出所有通道
//! - `status`: 打印状态快照与统计
//! - `quit`: 退出

use isara_driver::ChannelValue;

/// 控制台指令
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Put(String, ChannelValue),
    Get(String),
    List,
    Status,
    Quit,
    Empty,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => ConsoleCommand::Empty,
            "list" => ConsoleCommand::List,
            "status" => ConsoleCommand::Status,
            "quit" | "exit" => ConsoleCommand::Quit,
            _ => match line.split_once('=') {
                Some((name, value)) => {
                    ConsoleCommand::Put(name.trim().to_string(), ChannelValue::parse_loose(value))
                },
                None => ConsoleCommand::Get(line.to_string()),
            },
        }
    }
}
