//! 命令构建
//!
//! 命令链路接受三种形式：
//! - 裸关键字：`reset`
//! - 带参数：`cryoON(3)`
//! - 轨迹类：`traj(put,3,1,16,...)`

use crate::types::{DataMatrixScan, SampleType, ToolType};
use std::fmt;

/// 命令类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// 普通命令
    Plain,
    /// 轨迹命令，参数非空时包装为 `traj(name,...)`
    Trajectory,
}

/// 发往命令链路的命令
///
/// # Example
///
/// ```
/// use isara_protocol::Command;
///
/// assert_eq!(Command::new("reset").to_string(), "reset");
/// assert_eq!(Command::new("cryoON").arg(3).to_string(), "cryoON(3)");
/// assert_eq!(
///     Command::trajectory("home").arg(3).to_string(),
///     "traj(home,3)"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<String>,
    kind: CommandKind,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kind: CommandKind::Plain,
        }
    }

    pub fn trajectory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kind: CommandKind::Trajectory,
        }
    }

    /// 追加一个参数
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// 追加多个参数
    pub fn args<I, T>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.args.extend(values.into_iter().map(|v| v.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 无参数时两种命令都以裸关键字发送
        if self.args.is_empty() {
            return f.write_str(&self.name);
        }
        match self.kind {
            CommandKind::Plain => write!(f, "{}({})", self.name, self.args.join(",")),
            CommandKind::Trajectory => write!(f, "traj({},{})", self.name, self.args.join(",")),
        }
    }
}

/// 样品传输轨迹的 13 个位置参数
///
/// 顺序：工具、样品盘、样品、DataMatrix 扫描、下一个样品盘、下一个样品、
/// 样品类型、下一个样品类型、两个保留的 0、X/Y/Z 偏移。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferArgs {
    pub tool: ToolType,
    pub puck: i64,
    pub sample: i64,
    pub datamatrix_scan: DataMatrixScan,
    pub next_puck: i64,
    pub next_sample: i64,
    pub sample_type: SampleType,
    pub next_sample_type: SampleType,
    pub x_offset: i64,
    pub y_offset: i64,
    pub z_offset: i64,
}

impl TransferArgs {
    pub fn to_args(&self) -> [i64; 13] {
        [
            self.tool.code() as i64,
            self.puck,
            self.sample,
            self.datamatrix_scan.code() as i64,
            self.next_puck,
            self.next_sample,
            self.sample_type.code() as i64,
            self.next_sample_type.code() as i64,
            0,
            0,
            self.x_offset,
            self.y_offset,
            self.z_offset,
        ]
    }
}
