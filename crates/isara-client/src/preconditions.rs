//! 命令前置检查
//!
//! 检查失败不产生任何 IO，只返回一条面向操作员的警告（可附带帮助）。

use isara_protocol::ToolType;
use regex::Regex;
use std::fmt;

/// 前置检查失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub warning: String,
    pub help: Option<String>,
}

impl Rejection {
    pub fn new(warning: impl Into<String>) -> Self {
        Self {
            warning: warning.into(),
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.warning)
    }
}

/// 位置标签是否属于某个命名位置
///
/// `SOAK` 同时匹配 `SOAK`、`SOAK_1`、`SOAK_left` 等。
pub fn position_matches(current: &str, allowed: &str) -> bool {
    Regex::new(&format!(r"^{}(?:_\w*)?$", regex::escape(allowed)))
        .map(|re| re.is_match(current))
        .unwrap_or(false)
}

/// 要求机器人位于给定位置之一
///
/// # 参数
/// - `table_empty`: 位置表是否为空
/// - `current`: 当前位置标签
/// - `allowed`: 允许的位置名
pub fn require_position(table_empty: bool, current: &str, allowed: &[&str]) -> Result<(), Rejection> {
    let joined = allowed.join(" | ");
    if table_empty {
        return Err(Rejection::new("No positions have been defined").with_help(format!(
            "Please move the robot manually and save positions named `{joined}`"
        )));
    }
    if allowed.iter().any(|pos| position_matches(current, pos)) {
        return Ok(());
    }
    Err(
        Rejection::new(format!("Command allowed only from ` {joined} ` position")).with_help(
            "Please move the robot into the correct position and the re-issue the command",
        ),
    )
}

/// 要求当前工具为给定工具之一
pub fn require_tool(current: ToolType, allowed: &[ToolType]) -> Result<(), Rejection> {
    if allowed.contains(&current) {
        Ok(())
    } else {
        Err(Rejection::new("Invalid tool for command!"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_suffixes() {
        assert!(position_matches("SOAK", "SOAK"));
        assert!(position_matches("SOAK_2", "SOAK"));
        assert!(position_matches("SOAK_", "SOAK"));
        assert!(!position_matches("SOAKED", "SOAK"));
        assert!(!position_matches("PRESOAK", "SOAK"));
        assert!(!position_matches("SOAK-2", "SOAK"));
    }

    #[test]
    fn test_require_position_messages() {
        let err = require_position(true, "SOAK", &["SOAK", "HOME"]).unwrap_err();
        assert_eq!(err.warning, "No positions have been defined");
        assert_eq!(
            err.help.as_deref(),
            Some("Please move the robot manually and save positions named `SOAK | HOME`")
        );

        let err = require_position(false, "Undefined", &["SOAK"]).unwrap_err();
        assert_eq!(err.warning, "Command allowed only from ` SOAK ` position");
        assert!(err.help.is_some());

        assert!(require_position(false, "Undefined", &["SOAK", "HOME", "Undefined"]).is_ok());
    }

    #[test]
    fn test_require_tool() {
        assert!(require_tool(ToolType::Double, &[ToolType::Unipuck, ToolType::Double]).is_ok());
        let err = require_tool(ToolType::Cryotong, &[ToolType::Laser]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid tool for command!");
        assert_eq!(err.help, None);
    }
}
