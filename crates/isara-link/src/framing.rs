//! NUL 分帧
//!
//! 两条链路都以单个 `0x00` 字节结束每一帧。读端在读超时之间保留未完成的帧，
//! 因此一帧被拆成多个 TCP 分段到达时不会丢失。

use crate::LinkError;
use isara_protocol::FRAME_DELIMITER;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use tracing::warn;

/// 将一行编码为一帧（追加分隔符）
pub fn encode_frame(line: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(line.len() + 1);
    frame.extend_from_slice(line.as_bytes());
    frame.push(FRAME_DELIMITER);
    frame
}

/// 解码一帧
///
/// 去掉结尾的分隔符，按 UTF-8 有损解码，并去除首尾空白。
pub fn decode_frame(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(&[FRAME_DELIMITER]).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// 单帧最大字节数，超过后丢弃该帧
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// 按分隔符读取帧
pub struct FrameReader<R: Read> {
    inner: BufReader<R>,
    partial: Vec<u8>,
    max_len: usize,
    /// 正在跳过超长帧的剩余部分
    discarding: bool,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_len(inner, MAX_FRAME_LEN)
    }

    pub fn with_max_len(inner: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            partial: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    /// 读取下一帧
    ///
    /// # 返回
    /// - `Ok(Some(line))`：完整的一帧（可能为空字符串）
    /// - `Ok(None)`：读超时，尚无完整帧，已收到的字节保留到下一次调用
    /// - `Err(LinkError::Closed)`：对端关闭连接
    ///
    /// 超过长度上限的帧整帧丢弃，直到下一个分隔符为止。
    pub fn read_frame(&mut self) -> Result<Option<String>, LinkError> {
        loop {
            let available = match self.inner.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None);
                },
                Err(e) => return Err(e.into()),
            };

            if available.is_empty() {
                // 连接在帧中间断开时残帧丢弃
                self.partial.clear();
                self.discarding = false;
                return Err(LinkError::Closed);
            }

            match available.iter().position(|&b| b == FRAME_DELIMITER) {
                Some(end) => {
                    if !self.discarding {
                        self.partial.extend_from_slice(&available[..=end]);
                    }
                    self.inner.consume(end + 1);
                    if std::mem::take(&mut self.discarding) {
                        self.partial.clear();
                        continue;
                    }
                    let line = decode_frame(&self.partial);
                    self.partial.clear();
                    return Ok(Some(line));
                },
                None => {
                    let len = available.len();
                    if !self.discarding {
                        self.partial.extend_from_slice(available);
                    }
                    self.inner.consume(len);
                    if self.partial.len() > self.max_len {
                        warn!(
                            "Frame exceeds {} bytes without delimiter, discarding",
                            self.max_len
                        );
                        self.partial.clear();
                        self.discarding = true;
                    }
                },
            }
        }
    }

    /// 当前缓存的未完成字节数
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// 按预设分段返回数据，分段之间插入一次超时
    struct ChunkedReader {
        chunks: VecDeque<Option<Vec<u8>>>,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Some(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                },
                Some(None) => Err(io::Error::new(ErrorKind::WouldBlock, "timeout")),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_encode_frame() {
        assert_eq!(encode_frame("state"), b"state\0".to_vec());
        assert_eq!(encode_frame(""), vec![0u8]);
    }

    #[test]
    fn test_decode_frame_trims() {
        assert_eq!(decode_frame(b"  state(1,0)\r\n\0"), "state(1,0)");
        assert_eq!(decode_frame(b"\0"), "");
        assert_eq!(decode_frame(b"no delimiter"), "no delimiter");
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let reader = ChunkedReader {
            chunks: VecDeque::from(vec![Some(b"di(0101)\0do(1)\0\0".to_vec())]),
        };
        let mut frames = FrameReader::new(reader);
        assert_eq!(frames.read_frame().unwrap(), Some("di(0101)".to_string()));
        assert_eq!(frames.read_frame().unwrap(), Some("do(1)".to_string()));
        // 空帧同样投递
        assert_eq!(frames.read_frame().unwrap(), Some(String::new()));
        assert!(matches!(frames.read_frame(), Err(LinkError::Closed)));
    }

    #[test]
    fn test_partial_frame_survives_timeout() {
        let reader = ChunkedReader {
            chunks: VecDeque::from(vec![
                Some(b"posi".to_vec()),
                None,
                Some(b"tion(1,2,3,0,0,0)\0".to_vec()),
            ]),
        };
        let mut frames = FrameReader::new(reader);
        assert_eq!(frames.read_frame().unwrap(), None);
        assert_eq!(frames.pending(), 4);
        assert_eq!(
            frames.read_frame().unwrap(),
            Some("position(1,2,3,0,0,0)".to_string())
        );
        assert_eq!(frames.pending(), 0);
    }

    #[test]
    fn test_eof_mid_frame_is_closed() {
        let reader = ChunkedReader {
            chunks: VecDeque::from(vec![Some(b"state(1".to_vec())]),
        };
        let mut frames = FrameReader::new(reader);
        assert!(matches!(frames.read_frame(), Err(LinkError::Closed)));
    }

    #[test]
    fn test_oversized_frame_is_dropped() {
        let reader = ChunkedReader {
            chunks: VecDeque::from(vec![
                Some(b"0123456789".to_vec()),
                None,
                Some(b"abc\0ok\0".to_vec()),
            ]),
        };
        let mut frames = FrameReader::with_max_len(reader, 8);
        assert_eq!(frames.read_frame().unwrap(), None);
        assert_eq!(frames.pending(), 0);
        // 超长帧的尾部被跳过，下一帧正常投递
        assert_eq!(frames.read_frame().unwrap(), Some("ok".to_string()));
    }

    #[test]
    fn test_lossy_utf8() {
        let reader = ChunkedReader {
            chunks: VecDeque::from(vec![Some(vec![b'o', 0xFF, b'k', 0])]),
        };
        let mut frames = FrameReader::new(reader);
        assert_eq!(frames.read_frame().unwrap(), Some("o\u{FFFD}k".to_string()));
    }
}
