//! 状态行语法
//!
//! 状态链路上的每一帧要么是 `context(payload)`，要么是不带括号的自由文本
//! （故障/提示信息）。载荷截止到第一个 `)`。

use num_enum::{IntoPrimitive, TryFromPrimitive};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// 状态上下文（同时也是轮询关键字）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum StatusContext {
    State = 0,
    Di = 1,
    Do = 2,
    Position = 3,
    Message = 4,
}

/// 状态轮询顺序
pub const POLL_CYCLE: [StatusContext; 5] = [
    StatusContext::State,
    StatusContext::Di,
    StatusContext::Do,
    StatusContext::Position,
    StatusContext::Message,
];

impl StatusContext {
    pub fn keyword(self) -> &'static str {
        match self {
            StatusContext::State => "state",
            StatusContext::Di => "di",
            StatusContext::Do => "do",
            StatusContext::Position => "position",
            StatusContext::Message => "message",
        }
    }
}

impl fmt::Display for StatusContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for StatusContext {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "state" => Ok(StatusContext::State),
            "di" => Ok(StatusContext::Di),
            "do" => Ok(StatusContext::Do),
            "position" => Ok(StatusContext::Position),
            "message" => Ok(StatusContext::Message),
            _ => Err(()),
        }
    }
}

/// 解析后的状态行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLine<'a> {
    /// 已知上下文
    Framed {
        context: StatusContext,
        payload: &'a str,
    },
    /// 语法正确但上下文未知
    Unknown { context: &'a str, payload: &'a str },
    /// 不带 `context(...)` 包装的自由文本
    FreeText(&'a str),
}

fn status_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(?P<context>\w+)\((?P<payload>[^)]*)").ok())
        .as_ref()
}

impl<'a> StatusLine<'a> {
    /// 解析一行状态文本（调用方负责去除分隔符）
    pub fn parse(line: &'a str) -> Self {
        let Some(caps) = status_pattern().and_then(|re| re.captures(line)) else {
            return StatusLine::FreeText(line);
        };
        let (Some(context), Some(payload)) = (caps.name("context"), caps.name("payload")) else {
            return StatusLine::FreeText(line);
        };
        let (context, payload) = (context.as_str(), payload.as_str());
        match context.parse::<StatusContext>() {
            Ok(context) => StatusLine::Framed { context, payload },
            Err(()) => StatusLine::Unknown { context, payload },
        }
    }
}

/// state 帧字段的转换方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 整数，失败即解析错误
    Int,
    /// 浮点数
    Float,
    /// 原样字符串
    Text,
    /// 工具名 → `ToolType`
    ToolName,
    /// 槽位整数，失败时为 -1
    Slot,
}

/// state 帧中的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    Power,
    Mode,
    Fault,
    Tool,
    Position,
    Path,
    GripperTool,
    GripperToolB,
    PuckTool,
    SampleTool,
    PuckToolB,
    SampleToolB,
    PuckDiff,
    SampleDiff,
    /// 夹具上的样品板编号
    Plate,
    Barcode,
    Running,
    Speed,
    Autofill,
    SoakCount,
    CurrentLn2,
    HighLn2,
    LowLn2,
    Drying,
}

/// state 帧字段索引表：（位置, 字段, 转换方式）
///
/// 未列出的位置（15、18、25 以及 26 之后）被忽略。
pub const STATE_FIELDS: [(usize, StateField, FieldKind); 24] = [
    (0, StateField::Power, FieldKind::Int),
    (1, StateField::Mode, FieldKind::Int),
    (2, StateField::Fault, FieldKind::Int),
    (3, StateField::Tool, FieldKind::ToolName),
    (4, StateField::Position, FieldKind::Text),
    (5, StateField::Path, FieldKind::Text),
    (6, StateField::GripperTool, FieldKind::Slot),
    (7, StateField::GripperToolB, FieldKind::Slot),
    (8, StateField::PuckTool, FieldKind::Slot),
    (9, StateField::SampleTool, FieldKind::Slot),
    (10, StateField::PuckToolB, FieldKind::Slot),
    (11, StateField::SampleToolB, FieldKind::Slot),
    (12, StateField::PuckDiff, FieldKind::Slot),
    (13, StateField::SampleDiff, FieldKind::Slot),
    (14, StateField::Plate, FieldKind::Slot),
    (16, StateField::Barcode, FieldKind::Text),
    (17, StateField::Running, FieldKind::Int),
    (19, StateField::Speed, FieldKind::Float),
    (20, StateField::Autofill, FieldKind::Int),
    (21, StateField::SoakCount, FieldKind::Int),
    (22, StateField::CurrentLn2, FieldKind::Float),
    (23, StateField::HighLn2, FieldKind::Float),
    (24, StateField::LowLn2, FieldKind::Float),
    (26, StateField::Drying, FieldKind::Int),
];

impl StateField {
    /// 按位置查找字段
    pub fn at(index: usize) -> Option<(StateField, FieldKind)> {
        STATE_FIELDS
            .iter()
            .find(|(i, _, _)| *i == index)
            .map(|(_, field, kind)| (*field, *kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_framed() {
        assert_eq!(
            StatusLine::parse("state(1,0,0,DoubleGripper)"),
            StatusLine::Framed {
                context: StatusContext::State,
                payload: "1,0,0,DoubleGripper"
            }
        );
        assert_eq!(
            StatusLine::parse("position(1.0,2.0,3.0,0,0,0)"),
            StatusLine::Framed {
                context: StatusContext::Position,
                payload: "1.0,2.0,3.0,0,0,0"
            }
        );
    }

    #[test]
    fn test_payload_stops_at_first_paren() {
        assert_eq!(
            StatusLine::parse("message(ok) trailing)"),
            StatusLine::Framed {
                context: StatusContext::Message,
                payload: "ok"
            }
        );
        // 缺少右括号时载荷延伸到行尾
        assert_eq!(
            StatusLine::parse("di(0,1,1"),
            StatusLine::Framed {
                context: StatusContext::Di,
                payload: "0,1,1"
            }
        );
    }

    #[test]
    fn test_parse_unknown_and_free_text() {
        assert_eq!(
            StatusLine::parse("di2(0101)"),
            StatusLine::Unknown {
                context: "di2",
                payload: "0101"
            }
        );
        assert_eq!(
            StatusLine::parse("doors opened"),
            StatusLine::FreeText("doors opened")
        );
        assert_eq!(StatusLine::parse(""), StatusLine::FreeText(""));
    }

    #[test]
    fn test_poll_cycle_keywords() {
        let keywords: Vec<_> = POLL_CYCLE.iter().map(|c| c.keyword()).collect();
        assert_eq!(keywords, vec!["state", "di", "do", "position", "message"]);
        assert_eq!("do".parse::<StatusContext>(), Ok(StatusContext::Do));
        assert!("di2".parse::<StatusContext>().is_err());
    }

    #[test]
    fn test_state_field_table() {
        assert_eq!(StateField::at(0), Some((StateField::Power, FieldKind::Int)));
        assert_eq!(StateField::at(3), Some((StateField::Tool, FieldKind::ToolName)));
        assert_eq!(StateField::at(13), Some((StateField::SampleDiff, FieldKind::Slot)));
        assert_eq!(StateField::at(14), Some((StateField::Plate, FieldKind::Slot)));
        assert_eq!(StateField::at(15), None);
        assert_eq!(StateField::at(19), Some((StateField::Speed, FieldKind::Float)));
        assert_eq!(StateField::at(26), Some((StateField::Drying, FieldKind::Int)));
        assert_eq!(StateField::at(27), None);
    }
}
