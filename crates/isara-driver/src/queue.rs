//! 命令发件箱
//!
//! 所有命令都以格式化后的字符串进入发件箱，由发送线程按 FIFO 顺序写入命令链路。

use crate::state::IsaraContext;
use crossbeam_channel::Sender;
use isara_protocol::Command;
use std::sync::Arc;
use tracing::debug;

/// 发件箱句柄（可克隆）
#[derive(Clone)]
pub struct CommandQueue {
    tx: Sender<String>,
    ctx: Arc<IsaraContext>,
}

impl CommandQueue {
    pub fn new(tx: Sender<String>, ctx: Arc<IsaraContext>) -> Self {
        Self { tx, ctx }
    }

    /// 提交一条命令
    ///
    /// 每次提交都会清除待机锁存。控制器未就绪（或被禁用）时命令被丢弃，返回 false。
    pub fn submit(&self, command: Command) -> bool {
        self.ctx.flags.set_standby(false);
        if !self.ctx.ready_for_commands() {
            debug!("Controller not ready, dropping command: {}", command);
            return false;
        }
        let line = command.to_string();
        debug!("< {}", line);
        self.tx.send(line).is_ok()
    }

    /// 排队中的命令数
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    pub fn context(&self) -> &Arc<IsaraContext> {
        &self.ctx
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("pending", &self.pending())
            .finish()
    }
}
