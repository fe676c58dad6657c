//! 故障行解码
//!
//! 状态链路上不带 `context(...)` 包装的行是故障/提示文本。解码器只做决策，
//! 寄存器的存储和发布由 [`IsaraContext::apply_faults`](crate::IsaraContext::apply_faults) 完成。

use isara_protocol::{FAULT_CATALOG, FaultRegister, Health, match_fault};
use std::fmt;
use std::str::FromStr;

/// 未匹配目录的非空故障行的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmatchedPolicy {
    /// 清空整个寄存器
    #[default]
    Clear,
    /// 保持寄存器不变
    Retain,
}

impl FromStr for UnmatchedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clear" => Ok(UnmatchedPolicy::Clear),
            "retain" => Ok(UnmatchedPolicy::Retain),
            other => Err(format!("unknown unmatched fault line policy: {other:?}")),
        }
    }
}

impl fmt::Display for UnmatchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchedPolicy::Clear => f.write_str("clear"),
            UnmatchedPolicy::Retain => f.write_str("retain"),
        }
    }
}

/// 一行故障文本的解码结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultDecision {
    /// 新的寄存器值
    pub register: FaultRegister,
    /// 命中的目录条目
    pub matched: Option<usize>,
    /// 需要设置的健康度
    pub health: Option<Health>,
    /// 需要设置的故障标志
    pub fault_active: Option<bool>,
}

/// 故障解码器
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorDecoder {
    policy: UnmatchedPolicy,
}

impl ErrorDecoder {
    pub fn new(policy: UnmatchedPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UnmatchedPolicy {
        self.policy
    }

    /// 根据当前寄存器与一行文本计算新状态
    ///
    /// - 空行：清空寄存器，健康度 OK，清除故障标志
    /// - 命中目录：置位对应条目；`FAULT` 升级时健康度 ERROR 并置故障标志
    /// - 未命中：按策略清空或保持
    pub fn decode(&self, current: FaultRegister, line: &str) -> FaultDecision {
        let line = line.trim();
        if line.is_empty() {
            return FaultDecision {
                register: FaultRegister::default(),
                matched: None,
                health: Some(Health::Ok),
                fault_active: Some(false),
            };
        }

        match match_fault(line) {
            Some(index) => {
                let mut register = current;
                register.set(index);
                let is_fault = FAULT_CATALOG.get(index).is_some_and(|e| e.is_fault());
                FaultDecision {
                    register,
                    matched: Some(index),
                    health: is_fault.then_some(Health::Error),
                    fault_active: is_fault.then_some(true),
                }
            },
            None => FaultDecision {
                register: match self.policy {
                    UnmatchedPolicy::Clear => FaultRegister::default(),
                    UnmatchedPolicy::Retain => current,
                },
                matched: None,
                health: None,
                fault_active: None,
            },
        }
    }
}
