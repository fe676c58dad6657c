//! 故障消息目录与 32 位故障寄存器
//!
//! 控制器通过 `message` 轮询返回自由文本的故障行。每一行与静态目录逐条匹配，
//! 第一个命中的条目在寄存器中置位。

use crate::types::StatusType;
use regex::Regex;
use std::sync::OnceLock;

/// 故障目录条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultEntry {
    /// 在故障行中搜索的文本
    pub pattern: &'static str,
    /// 面向操作员的描述
    pub description: &'static str,
    /// 处理建议
    pub help: &'static str,
    /// 命中时的状态升级（只有 `Fault` 会触发故障状态）
    pub escalation: Option<StatusType>,
}

impl FaultEntry {
    pub fn is_fault(&self) -> bool {
        self.escalation == Some(StatusType::Fault)
    }
}

const LIMIT_HELP: &str = "Modify the trajectory or adjust the limit";

/// 故障消息目录（下标即寄存器位号）
pub const FAULT_CATALOG: [FaultEntry; 21] = [
    FaultEntry {
        pattern: "doors opened",
        description: "Doors opened",
        help: "Close the door or switch to Manual mode",
        escalation: None,
    },
    FaultEntry {
        pattern: "Manual brake control selected",
        description: "Manual brake button is not on the 0 position",
        help: "Turn the manual brake dial to the 0 position",
        escalation: Some(StatusType::Fault),
    },
    FaultEntry {
        pattern: "emergency stop or air pressure fault",
        description: "Emergency stop pressed or the compressed air pressure too low",
        help: "Inspect the robot, eliminate the risk and turn-off the emergency stop or check air pressure",
        escalation: Some(StatusType::Fault),
    },
    FaultEntry {
        pattern: "collision detection",
        description: "The robot collided with something",
        help: "Abort the current task; safely unlock the brakes and move the robot manually; \
               re-engage the shock detector and run the 'safe' command",
        escalation: Some(StatusType::Fault),
    },
    FaultEntry {
        pattern: "Modbus communication fault",
        description: "Internal communication fault",
        help: "Inspect the ethernet cable connections inside the electro-pneumatic rack, \
               and check the power of the CS8C controller and the PLC",
        escalation: Some(StatusType::Fault),
    },
    FaultEntry {
        pattern: "LOC menu not disabled",
        description: "The current menu on the teach pendant is 'LOC'",
        help: "Quit the 'LOC' menu on the Teach Pendant",
        escalation: Some(StatusType::Fault),
    },
    FaultEntry {
        pattern: "Remote Mode requested",
        description: "Remote mode is not selected",
        help: "Switch to remote mode",
        escalation: None,
    },
    FaultEntry {
        pattern: "Disabled when path is running",
        description: "A command was sent while already processing a task",
        help: "Wait for current task to complete",
        escalation: None,
    },
    FaultEntry {
        pattern: "X- collision",
        description: "X- limit reached",
        help: LIMIT_HELP,
        escalation: Some(StatusType::Fault),
    },
    FaultEntry {
        pattern: "X+ collision",
        description: "X+ limit reached",
        help: LIMIT_HELP,
        escalation: Some(StatusType::Fault),
    },
    FaultEntry {
        pattern: "Y- collision",
        description: "Y- limit reached",
        help: LIMIT_HELP,
        escalation: Some(StatusType::Fault),
    },
    FaultEntry {
        pattern: "Y+ collision",
        description: "Y+ limit reached",
        help: LIMIT_HELP,
        escalation: Some(StatusType::Fault),
    },
    FaultEntry {
        pattern: "Z- collision",
        description: "Z- limit reached",
        help: LIMIT_HELP,
        escalation: Some(StatusType::Fault),
    },
    FaultEntry {
        pattern: "Z+ collision",
        description: "Z+ limit reached",
        help: LIMIT_HELP,
        escalation: Some(StatusType::Fault),
    },
    FaultEntry {
        pattern: "WAIT for RdTrsf condition",
        description: "Waiting for endstation to be ready ...",
        help: "Verify that endstation is going to mount mode",
        escalation: Some(StatusType::Waiting),
    },
    FaultEntry {
        pattern: "WAIT for SplOn condition",
        description: "Waiting for sample on gonio ...",
        help: "Verify that sample on gonio detection is working properly",
        escalation: Some(StatusType::Waiting),
    },
    FaultEntry {
        pattern: "low level alarm",
        description: "LN2 level in the Dewar is too low",
        help: "Check the LN2 supply",
        escalation: None,
    },
    FaultEntry {
        pattern: "high level alarm",
        description: "LN2 level in the Dewar is too high",
        help: "Close the main valve of the LN2 supply",
        escalation: None,
    },
    FaultEntry {
        pattern: "No LN2 available, regulation stopped",
        description: "No LN2 available, autofill stopped",
        help: "Check LN2 main supply, check phase sensor",
        escalation: Some(StatusType::Fault),
    },
    FaultEntry {
        pattern: "FillingUp Timeout",
        description: "Maximum time for filling up was exceeded",
        help: "Check LN2 main supply, check level sensor",
        escalation: None,
    },
    FaultEntry {
        pattern: "collision at the gonio",
        description: "Collision at gonio",
        help: "Abort task and safely return robot home. If pin is in gripper, return it to puck using 'back' command.",
        escalation: Some(StatusType::Fault),
    },
];

/// 编译后的目录匹配器
///
/// 目录文本按字面量匹配（`X+ collision` 中的 `+` 不是量词）。
fn catalog_patterns() -> &'static [Option<Regex>] {
    static PATTERNS: OnceLock<Vec<Option<Regex>>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        FAULT_CATALOG
            .iter()
            .map(|entry| Regex::new(&regex::escape(entry.pattern)).ok())
            .collect()
    })
}

/// 在目录中查找第一个匹配的条目，返回其下标
pub fn match_fault(line: &str) -> Option<usize> {
    catalog_patterns()
        .iter()
        .position(|re| re.as_ref().is_some_and(|re| re.is_match(line)))
}

/// 32 位故障寄存器
///
/// 条目 *i* 存放在整数的第 `31 - i` 位（高位在前），
/// 因此 `raw()` 与控制系统中发布的整数值一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct FaultRegister(u32);

impl FaultRegister {
    pub const WIDTH: usize = 32;

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn mask(index: usize) -> u32 {
        1u32 << (Self::WIDTH - 1 - index)
    }

    /// 置位第 `index` 个条目，越界时忽略
    pub fn set(&mut self, index: usize) {
        if index < Self::WIDTH {
            self.0 |= Self::mask(index);
        }
    }

    pub fn is_set(&self, index: usize) -> bool {
        index < Self::WIDTH && self.0 & Self::mask(index) != 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// 已置位的条目下标（升序）
    pub fn active(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::WIDTH).filter(|i| self.is_set(*i))
    }

    /// 已置位且在目录中有定义的条目
    pub fn entries(&self) -> impl Iterator<Item = &'static FaultEntry> + '_ {
        self.active().filter_map(|i| FAULT_CATALOG.get(i))
    }

    /// 所有已置位条目的描述，以 `"; "` 连接
    pub fn warning_text(&self) -> String {
        self.entries().map(|e| e.description).collect::<Vec<_>>().join("; ")
    }

    /// 所有已置位条目的处理建议，以 `"; "` 连接
    pub fn help_text(&self) -> String {
        self.entries().map(|e| e.help).collect::<Vec<_>>().join("; ")
    }
}
