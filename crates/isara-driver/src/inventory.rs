//! 杜瓦罐样品盘在位跟踪

use isara_protocol::{NUM_PUCKS, ProtocolError, SlotBits};
use std::collections::BTreeSet;
use tracing::{error, info};

/// 两次检测之间的变化
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PuckDiff {
    pub added: BTreeSet<&'static str>,
    pub removed: BTreeSet<&'static str>,
}

impl PuckDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// 槽位标签是否在本次被移除
    pub fn was_removed(&self, label: &str) -> bool {
        self.removed.contains(label)
    }
}

/// 在位样品盘集合
#[derive(Debug, Clone, Default)]
pub struct PuckInventory {
    occupied: BTreeSet<&'static str>,
}

impl PuckInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn occupied(&self) -> &BTreeSet<&'static str> {
        &self.occupied
    }

    pub fn contains(&self, label: &str) -> bool {
        self.occupied.contains(label)
    }

    /// 以新的检测结果替换当前集合，返回差异
    pub fn update(&mut self, slots: SlotBits) -> PuckDiff {
        let detected: BTreeSet<&'static str> = slots.occupied().collect();
        let diff = PuckDiff {
            added: detected.difference(&self.occupied).copied().collect(),
            removed: self.occupied.difference(&detected).copied().collect(),
        };
        self.occupied = detected;
        if !diff.is_empty() {
            info!("Pucks changed: added={:?}, removed={:?}", diff.added, diff.removed);
        }
        diff
    }

    /// 从 29 个字符的 `0`/`1` 串更新
    ///
    /// 长度不对时记录错误并保持原集合。
    pub fn update_text(&mut self, text: &str) -> Result<PuckDiff, ProtocolError> {
        match SlotBits::parse(text) {
            Ok(slots) => Ok(self.update(slots)),
            Err(e) => {
                error!("Puck Detection does not contain {} values! ({})", NUM_PUCKS, e);
                Err(e)
            },
        }
    }
}
