//! 驱动层错误类型定义

use isara_link::LinkError;
use isara_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 链路错误
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 位置文件读写错误
    #[error("Position file error: {0}")]
    Io(#[from] std::io::Error),

    /// 位置文件格式错误
    #[error("Position file format error: {0}")]
    Json(#[from] serde_json::Error),

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use isara_link::{LinkError, MessageKind};
    use isara_protocol::ProtocolError;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::from(LinkError::NotConnected(MessageKind::Response));
        assert_eq!(err.to_string(), "Link error: Command Link not connected");

        let err = DriverError::from(ProtocolError::InvalidLength {
            expected: 29,
            actual: 3,
        });
        assert!(err.to_string().starts_with("Protocol error:"));

        let err = DriverError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(err.to_string().starts_with("Position file error:"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DriverError = json_err.into();
        assert!(matches!(err, DriverError::Json(_)));
    }
}
