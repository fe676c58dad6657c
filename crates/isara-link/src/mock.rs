//! Mock 链路（仅测试与 `mock` feature）
//!
//! 记录所有发送的行，不进行任何网络 IO。

use crate::{LineSender, LinkError, MessageKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct MockLink {
    kind: MessageKind,
    sent: Mutex<Vec<String>>,
    ready: AtomicBool,
    fail: AtomicBool,
}

impl MockLink {
    /// 创建一个已连接的 mock 链路
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            sent: Mutex::new(Vec::new()),
            ready: AtomicBool::new(true),
            fail: AtomicBool::new(false),
        }
    }

    pub fn command() -> Self {
        Self::new(MessageKind::Response)
    }

    pub fn status() -> Self {
        Self::new(MessageKind::Status)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// 之后的发送全部失败（模拟写错误）
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Release);
    }

    /// 已发送的行（副本）
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// 取出并清空已发送的行
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl LineSender for MockLink {
    fn send_line(&self, line: &str) -> Result<(), LinkError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(LinkError::NotConnected(self.kind));
        }
        if self.fail.load(Ordering::Acquire) {
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        self.sent.lock().push(line.to_string());
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn kind(&self) -> MessageKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_lines() {
        let link = MockLink::command();
        link.send_line("reset").unwrap();
        link.send_line("openlid").unwrap();
        assert_eq!(link.sent(), vec!["reset", "openlid"]);
        assert_eq!(link.take_sent().len(), 2);
        assert!(link.sent().is_empty());
    }

    #[test]
    fn test_mock_not_ready() {
        let link = MockLink::status();
        link.set_ready(false);
        assert!(matches!(
            link.send_line("state"),
            Err(LinkError::NotConnected(MessageKind::Status))
        ));
        link.set_ready(true);
        link.set_fail(true);
        assert!(matches!(link.send_line("state"), Err(LinkError::Io(_))));
        assert!(link.sent().is_empty());
    }
}
