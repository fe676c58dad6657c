//! 协议常量定义

/// 帧分隔符（两条链路相同）
pub const FRAME_DELIMITER: u8 = 0x00;

/// 命令链路默认端口
pub const DEFAULT_COMMAND_PORT: u16 = 10000;

/// 状态链路默认端口
pub const DEFAULT_STATUS_PORT: u16 = 1000;

/// 杜瓦罐中的样品盘槽位数量
pub const NUM_PUCKS: usize = 29;

/// 每个样品盘的样品数量
pub const NUM_PUCK_SAMPLES: usize = 16;

/// 样品板数量
pub const NUM_PLATES: usize = 8;

/// 样品盘槽位标签（按协议顺序，编号从 1 开始）
pub const PUCK_LIST: [&str; NUM_PUCKS] = [
    "1A", "2A", "3A", "4A", "5A", //
    "1B", "2B", "3B", "4B", "5B", "6B", //
    "1C", "2C", "3C", "4C", "5C", //
    "1D", "2D", "3D", "4D", "5D", "6D", //
    "1E", "2E", "3E", "4E", "5E", //
    "1F", "2F",
];

/// 未匹配任何命名位置时发布的标签
pub const UNDEFINED_POSITION: &str = "Undefined";

/// 保存位置时的默认容差
pub const DEFAULT_POSITION_TOLERANCE: f64 = 0.1;

/// 根据标签查找样品盘编号（1-based）
pub fn puck_number(label: &str) -> Option<usize> {
    PUCK_LIST.iter().position(|l| *l == label).map(|i| i + 1)
}

/// 根据样品盘编号（1-based）获取标签
pub fn puck_label(number: i64) -> Option<&'static str> {
    if number < 1 {
        return None;
    }
    PUCK_LIST.get((number - 1) as usize).copied()
}
