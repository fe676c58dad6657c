//! 状态等待
//!
//! 以 10ms 间隔轮询状态快照，超时返回 false 并记录警告。

use crate::preconditions::position_matches;
use isara_driver::IsaraContext;
use isara_protocol::StatusType;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

/// 缺省等待超时
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn poll_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// 等待机器人到达给定位置之一（`SOAK` 同时匹配 `SOAK_*`）
pub fn wait_for_position(ctx: &IsaraContext, positions: &[&str], timeout: Duration) -> bool {
    let reached = poll_until(timeout, || {
        let current = ctx.snapshot();
        positions.iter().any(|pos| position_matches(&current.position, pos))
    });
    if !reached {
        warn!("Timeout waiting for positions {:?}", positions);
    }
    reached
}

/// 等待状态进入给定状态之一
pub fn wait_for_state(ctx: &IsaraContext, states: &[StatusType], timeout: Duration) -> bool {
    let reached = poll_until(timeout, || states.contains(&ctx.snapshot().status));
    if !reached {
        warn!("Timeout waiting for states {:?}", states);
    }
    reached
}

/// 等待状态离开给定状态
pub fn wait_in_state(ctx: &IsaraContext, state: StatusType, timeout: Duration) -> bool {
    let left = poll_until(timeout, || ctx.snapshot().status != state);
    if !left {
        warn!("Timeout in state {:?}", state);
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;
    use isara_driver::{NullSink, PositionBook, PositionStore, PositionTable, RobotState};
    use std::sync::Arc;

    fn context() -> Arc<IsaraContext> {
        let book = PositionBook::with_table(PositionStore::new(".", "t"), PositionTable::new());
        Arc::new(IsaraContext::new(Arc::new(NullSink), book))
    }

    fn set(ctx: &IsaraContext, f: impl FnOnce(&mut RobotState)) {
        let mut robot = (*ctx.snapshot()).clone();
        f(&mut robot);
        ctx.robot.store(Arc::new(robot));
    }

    #[test]
    fn test_wait_for_position_suffix() {
        let ctx = context();
        set(&ctx, |r| r.position = "SOAK_1".into());
        assert!(wait_for_position(&ctx, &["HOME", "SOAK"], Duration::from_millis(50)));
        assert!(!wait_for_position(&ctx, &["HOME"], Duration::from_millis(30)));
    }

    #[test]
    fn test_wait_for_state_from_other_thread() {
        let ctx = context();
        let writer = ctx.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            set(&writer, |r| r.status = StatusType::Busy);
        });
        assert!(wait_for_state(&ctx, &[StatusType::Busy], Duration::from_secs(2)));
        handle.join().unwrap();

        assert!(!wait_in_state(&ctx, StatusType::Busy, Duration::from_millis(30)));
        assert!(wait_in_state(&ctx, StatusType::Idle, Duration::from_millis(30)));
    }
}
