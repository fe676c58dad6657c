//! 工作线程的限时回收
//!
//! 读线程和工作线程在停止标志置位后，最多再阻塞一个读超时或轮询周期。
//! 回收时等待线程结束直到期限；超过期限的线程被放弃（detach），不阻塞关闭流程。

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, trace};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 线程回收失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("{name} thread did not stop within {timeout:?}")]
    TimedOut { name: String, timeout: Duration },

    #[error("{name} thread panicked")]
    Panicked { name: String },
}

/// 在期限内等待线程结束并回收
pub fn join_within<T>(handle: JoinHandle<T>, timeout: Duration) -> Result<(), JoinError> {
    let name = handle.thread().name().unwrap_or("unnamed").to_string();
    let deadline = Instant::now() + timeout;

    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return Err(JoinError::TimedOut { name, timeout });
        }
        thread::sleep(POLL_INTERVAL);
    }

    match handle.join() {
        Ok(_) => {
            trace!("{} thread stopped", name);
            Ok(())
        },
        Err(_) => Err(JoinError::Panicked { name }),
    }
}

/// 回收线程，失败只记录日志
pub fn reap<T>(handle: JoinHandle<T>, timeout: Duration) {
    if let Err(e) = join_within(handle, timeout) {
        error!("{}", e);
    }
}
