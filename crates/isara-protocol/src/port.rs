//! 端口字符串
//!
//! 端口是样品地址的文本形式：
//! - 样品盘：`"<槽位标签><样品号>"`，如 `"1A16"`
//! - 样品板：`"P<板号>"`，如 `"P2"`

use crate::constants::{puck_label, puck_number};
use crate::types::ToolType;
use crate::zero_int;

/// 端口解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortArgs {
    Puck {
        tool: ToolType,
        puck: i64,
        sample: i64,
    },
    Plate {
        tool: ToolType,
        plate: i64,
    },
}

impl PortArgs {
    pub fn tool(&self) -> ToolType {
        match self {
            PortArgs::Puck { tool, .. } | PortArgs::Plate { tool, .. } => *tool,
        }
    }

    /// 所有参数均非零（可用于装载）
    pub fn is_complete(&self) -> bool {
        match self {
            PortArgs::Puck { puck, sample, .. } => *puck != 0 && *sample != 0,
            PortArgs::Plate { plate, .. } => *plate != 0,
        }
    }
}

/// 解析端口字符串
///
/// - `P<n>` → 样品板 n（无法解析时为 0）
/// - 其余长度小于 3 的字符串无效
/// - 前两个字符查槽位表（编号从 1 开始），其余为样品号（无法解析时为 0）
///
/// 无效端口返回 `None`。
pub fn port_to_args(port: &str) -> Option<PortArgs> {
    let port = port.trim();
    if let Some(plate) = port.strip_prefix('P') {
        if plate.is_empty() {
            return None;
        }
        return Some(PortArgs::Plate {
            tool: ToolType::Plate,
            plate: zero_int(plate),
        });
    }
    if port.len() < 3 || !port.is_char_boundary(2) {
        return None;
    }
    let (label, sample) = port.split_at(2);
    let puck = puck_number(label)? as i64;
    Some(PortArgs::Puck {
        tool: ToolType::Double,
        puck,
        sample: zero_int(sample),
    })
}

/// 样品盘编号 + 样品号 → 端口字符串（任一为非正数时为空）
pub fn args_to_port(puck: i64, sample: i64) -> String {
    if sample < 1 {
        return String::new();
    }
    match puck_label(puck) {
        Some(label) => format!("{label}{sample}"),
        None => String::new(),
    }
}

/// 样品板编号 → 端口字符串（非正数时为空）
pub fn plate_to_port(plate: i64) -> String {
    if plate > 0 {
        format!("P{plate}")
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_puck_port() {
        assert_eq!(
            port_to_args("1A16"),
            Some(PortArgs::Puck {
                tool: ToolType::Double,
                puck: 1,
                sample: 16
            })
        );
        assert_eq!(
            port_to_args("2F3"),
            Some(PortArgs::Puck {
                tool: ToolType::Double,
                puck: 29,
                sample: 3
            })
        );
    }

    #[test]
    fn test_plate_port() {
        assert_eq!(
            port_to_args("P3"),
            Some(PortArgs::Plate {
                tool: ToolType::Plate,
                plate: 3
            })
        );
        let args = port_to_args("Px").unwrap();
        assert!(!args.is_complete());
        assert_eq!(args.tool(), ToolType::Plate);
    }

    #[test]
    fn test_invalid_ports() {
        assert_eq!(port_to_args(""), None);
        assert_eq!(port_to_args("1A"), None);
        assert_eq!(port_to_args("P"), None);
        assert_eq!(port_to_args("9Z12"), None);
    }

    #[test]
    fn test_sample_parse_failure_is_incomplete() {
        let args = port_to_args("1Axx").unwrap();
        assert_eq!(
            args,
            PortArgs::Puck {
                tool: ToolType::Double,
                puck: 1,
                sample: 0
            }
        );
        assert!(!args.is_complete());
    }

    #[test]
    fn test_args_to_port() {
        assert_eq!(args_to_port(1, 16), "1A16");
        assert_eq!(args_to_port(22, 1), "6D1");
        assert_eq!(args_to_port(0, 16), "");
        assert_eq!(args_to_port(1, 0), "");
        assert_eq!(args_to_port(-1, -1), "");
        assert_eq!(args_to_port(30, 1), "");
    }

    #[test]
    fn test_plate_to_port() {
        assert_eq!(plate_to_port(2), "P2");
        assert_eq!(plate_to_port(0), "");
    }
}
